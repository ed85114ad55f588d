//! 应用层实现。
//!
//! 这里是会话协调器的核心：消息校验、滑动窗口限流、在线通知防抖、
//! 扁平回复索引、回执追踪，以及把它们串成发送流水线的协调器。
//! 对外部协作方（持久化、附件存储、主题总线、在线注册表）只依赖抽象。

pub mod attachments;
pub mod broadcaster;
pub mod clock;
pub mod coordinator;
pub mod debouncer;
pub mod delivery;
pub mod error;
pub mod presence;
pub mod rate_limiter;
pub mod repository;
pub mod thread_index;
pub mod validator;

pub use attachments::{AttachmentError, AttachmentStore};
pub use broadcaster::{mentions_topic, notifications_topic, order_topic, BroadcastError, TopicBus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{CoordinatorDeps, HistoryItem, SessionCoordinator, SessionRegistry};
pub use debouncer::{DebouncePolicy, NotificationDebouncer};
pub use delivery::DeliveryStatusTracker;
pub use error::{ApplicationError, PresenceError, RateLimitError, SendError, ValidationError};
pub use presence::{PresenceTracker, RoomRoster};
pub use rate_limiter::{MessageRateLimiter, RateLimitPolicy};
pub use repository::{MessageRepository, NewMessageParams};
pub use thread_index::{ReplyPreview, ThreadIndex};
pub use validator::{MessageDraft, MessageValidator};
