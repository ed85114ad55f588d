use std::sync::Arc;
use std::time::Duration as StdDuration;

use application::{
    Clock, CoordinatorDeps, DebouncePolicy, MessageValidator, PresenceTracker, RateLimitPolicy,
    SessionRegistry, SystemClock,
};
use config::AppConfig;
use infrastructure::{
    InMemoryMessageRepository, InMemoryPresenceTracker, LocalDiskAttachmentStore, LocalTopicBus,
};
use time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub presence: Arc<dyn PresenceTracker>,
    pub bus: Arc<LocalTopicBus>,
    pub clock: Arc<dyn Clock>,
    pub debounce: DebouncePolicy,
    pub sweep_interval: StdDuration,
}

impl AppState {
    /// 按配置组装整套进程内协作方。
    pub fn from_config(config: &AppConfig) -> Self {
        let bus = Arc::new(LocalTopicBus::new(config.broadcast.capacity));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let presence: Arc<dyn PresenceTracker> =
            Arc::new(InMemoryPresenceTracker::new(bus.clone(), clock.clone()));

        let rate = &config.chat.rate_limit;
        let deps = CoordinatorDeps {
            repository: Arc::new(InMemoryMessageRepository::new()),
            attachments: Arc::new(LocalDiskAttachmentStore::new(&config.attachments.spool_dir)),
            bus: bus.clone(),
            clock: clock.clone(),
            validator: MessageValidator::new(config.chat.validation.max_message_len),
            rate_limit: RateLimitPolicy {
                max_messages: rate.max_messages,
                window: Duration::seconds(rate.window_secs as i64),
                duplicate_window: Duration::seconds(rate.duplicate_window_secs as i64),
                long_message_len: rate.long_message_len,
                max_long_messages: rate.max_long_messages,
                long_window: Duration::seconds(rate.long_window_secs as i64),
            },
        };

        let debounce = &config.chat.debounce;
        Self {
            registry: Arc::new(SessionRegistry::new(deps)),
            presence,
            bus,
            clock,
            debounce: DebouncePolicy {
                join_suppress: Duration::seconds(debounce.join_suppress_secs as i64),
                reconnect: Duration::seconds(debounce.reconnect_secs as i64),
                expiry: Duration::seconds(debounce.expiry_secs as i64),
            },
            sweep_interval: StdDuration::from_secs(debounce.sweep_interval_secs),
        }
    }
}
