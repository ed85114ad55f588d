//! 协调器发送流水线的端到端测试（内存假件实现全部协作方）。

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use application::{
    notifications_topic, order_topic, AttachmentError, AttachmentStore, BroadcastError,
    CoordinatorDeps, ManualClock, MessageDraft, MessageRepository, MessageValidator,
    NewMessageParams, RateLimitError, RateLimitPolicy, SendError, SessionRegistry, TopicBus,
};
use async_trait::async_trait;
use domain::{
    Message, MessageId, MessageStatus, OrderId, ReceiptKind, RepositoryError, SessionEvent,
    Timestamp, UserId,
};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

/// 捕获所有发布事件的总线假件。
#[derive(Default)]
struct RecordingBus {
    events: Mutex<Vec<(String, SessionEvent)>>,
}

impl RecordingBus {
    async fn events(&self) -> Vec<(String, SessionEvent)> {
        self.events.lock().await.clone()
    }

    async fn new_message_count(&self, topic: &str) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|(t, event)| t == topic && matches!(event, SessionEvent::NewMessage { .. }))
            .count()
    }
}

#[async_trait]
impl TopicBus for RecordingBus {
    async fn publish(&self, topic: &str, event: SessionEvent) -> Result<(), BroadcastError> {
        self.events.lock().await.push((topic.to_owned(), event));
        Ok(())
    }
}

/// 内存消息仓库假件，可切换为持久化失败模式。
#[derive(Default)]
struct MemoryRepository {
    messages: Mutex<Vec<Message>>,
    fail_writes: AtomicBool,
    create_calls: AtomicU32,
}

impl MemoryRepository {
    fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageRepository for MemoryRepository {
    async fn create_message(&self, params: NewMessageParams) -> Result<Message, RepositoryError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::unavailable("storage offline"));
        }
        let message = Message::new(
            MessageId::new(Uuid::new_v4()),
            params.order_id,
            params.sender_id,
            params.sender_name,
            params.body,
            params.attachment,
            params.reply_to,
            params.created_at,
        )
        .map_err(|err| RepositoryError::rejected(err.to_string()))?;
        self.messages.lock().await.push(message.clone());
        Ok(message)
    }

    async fn find(&self, message_id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .await
            .iter()
            .find(|m| m.id == message_id)
            .cloned())
    }

    async fn list_order(&self, order_id: OrderId) -> Result<Vec<Message>, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .await
            .iter()
            .filter(|m| m.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list_before(
        &self,
        order_id: OrderId,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.list_order(order_id).await?;
        let end = match before {
            Some(id) => messages
                .iter()
                .position(|m| m.id == id)
                .unwrap_or(messages.len()),
            None => messages.len(),
        };
        let start = end.saturating_sub(limit as usize);
        Ok(messages[start..end].to_vec())
    }
}

/// 永远挂起的附件存储，用于验证取消路径。
struct StalledAttachmentStore;

#[async_trait]
impl AttachmentStore for StalledAttachmentStore {
    async fn upload(&self, _local_path: &Path, _filename: &str) -> Result<String, AttachmentError> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

struct Harness {
    registry: SessionRegistry,
    bus: Arc<RecordingBus>,
    repository: Arc<MemoryRepository>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let bus = Arc::new(RecordingBus::default());
    let repository = Arc::new(MemoryRepository::default());
    let clock = Arc::new(ManualClock::new(Timestamp::UNIX_EPOCH));
    let deps = CoordinatorDeps {
        repository: repository.clone(),
        attachments: Arc::new(StalledAttachmentStore),
        bus: bus.clone(),
        clock: clock.clone(),
        validator: MessageValidator::new(2000),
        rate_limit: RateLimitPolicy::default(),
    };
    Harness {
        registry: SessionRegistry::new(deps),
        bus,
        repository,
        clock,
    }
}

fn draft(order_id: OrderId, sender_id: UserId, text: &str) -> MessageDraft {
    MessageDraft {
        order_id,
        sender_id,
        sender_name: "alice".into(),
        text: Some(text.to_owned()),
        image_url: None,
        document_url: None,
        document_name: None,
        audio_url: None,
        audio_duration_secs: None,
        reply_to: None,
    }
}

#[tokio::test]
async fn allowed_send_is_persisted_and_broadcast() {
    let h = harness();
    let order_id = OrderId::new(Uuid::new_v4());
    let sender = UserId::new(Uuid::new_v4());
    let coordinator = h.registry.get_or_create(order_id).await;

    let message = coordinator.send(draft(order_id, sender, "hi")).await.unwrap();
    assert_eq!(message.body.as_deref(), Some("hi"));
    assert_eq!(message.status(), MessageStatus::Sent);

    let topic = order_topic(order_id);
    assert_eq!(h.bus.new_message_count(&topic).await, 1);
}

#[tokio::test]
async fn duplicate_send_is_rejected_and_never_broadcast() {
    let h = harness();
    let order_id = OrderId::new(Uuid::new_v4());
    let sender = UserId::new(Uuid::new_v4());
    let coordinator = h.registry.get_or_create(order_id).await;

    coordinator.send(draft(order_id, sender, "hi")).await.unwrap();
    h.clock.advance(time::Duration::seconds(1));

    let rejected = coordinator
        .send(draft(order_id, sender, "hi"))
        .await
        .unwrap_err();
    match rejected {
        SendError::RateLimit(RateLimitError::DuplicateSpam { retry_after_secs }) => {
            assert!(retry_after_secs > 0);
        }
        other => panic!("expected DuplicateSpam, got {other:?}"),
    }

    // 被拒绝的发送从未出现在总线上
    assert_eq!(h.bus.new_message_count(&order_topic(order_id)).await, 1);
}

#[tokio::test]
async fn rejected_sends_consume_no_rate_budget() {
    let h = harness();
    let order_id = OrderId::new(Uuid::new_v4());
    let sender = UserId::new(Uuid::new_v4());
    let coordinator = h.registry.get_or_create(order_id).await;

    // 反复提交无效草稿
    for _ in 0..10 {
        let invalid = draft(order_id, sender, "   ");
        assert!(matches!(
            coordinator.send(invalid).await,
            Err(SendError::Validation(_))
        ));
    }

    // 配额完好：默认策略允许的 5 条依然全部放行
    for i in 0..5 {
        coordinator
            .send(draft(order_id, sender, &format!("msg {i}")))
            .await
            .unwrap();
        h.clock.advance(time::Duration::seconds(1));
    }
}

#[tokio::test]
async fn persistence_failure_is_surfaced_without_retry() {
    let h = harness();
    let order_id = OrderId::new(Uuid::new_v4());
    let sender = UserId::new(Uuid::new_v4());
    let coordinator = h.registry.get_or_create(order_id).await;

    h.repository.set_failing(true);
    let rejected = coordinator
        .send(draft(order_id, sender, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(rejected, SendError::Persistence(_)));

    // 不自动重试，也没有任何广播
    assert_eq!(h.repository.create_calls.load(Ordering::SeqCst), 1);
    assert!(h.bus.events().await.is_empty());

    // 失败的发送没有消耗配额：同样的正文立即重新提交是允许的
    h.repository.set_failing(false);
    coordinator.send(draft(order_id, sender, "hi")).await.unwrap();
}

#[tokio::test]
async fn delivered_then_read_updates_senders_view() {
    let h = harness();
    let order_id = OrderId::new(Uuid::new_v4());
    let sender = UserId::new(Uuid::new_v4());
    let reader = UserId::new(Uuid::new_v4());
    let coordinator = h.registry.get_or_create(order_id).await;

    let message = coordinator.send(draft(order_id, sender, "hi")).await.unwrap();

    assert_eq!(
        coordinator.mark_delivered(message.id, reader).await.unwrap(),
        Some(MessageStatus::Delivered)
    );
    assert_eq!(
        coordinator.mark_read(message.id, reader).await.unwrap(),
        Some(MessageStatus::Read)
    );
    // 重复回执幂等，不再发布事件
    assert_eq!(coordinator.mark_read(message.id, reader).await.unwrap(), None);

    let view = coordinator.message(message.id).await.unwrap().unwrap();
    assert_eq!(view.status(), MessageStatus::Read);
    assert_eq!(view.read_by.len(), 1);
    assert!(view.read_by.contains(&reader));

    // 回执变化同时出现在会话主题和发送者的个人通知通道
    let events = h.bus.events().await;
    let order_changes = events
        .iter()
        .filter(|(topic, event)| {
            topic == &order_topic(order_id)
                && matches!(event, SessionEvent::DeliveryStatusChanged { .. })
        })
        .count();
    let personal_changes = events
        .iter()
        .filter(|(topic, event)| {
            topic == &notifications_topic(sender)
                && matches!(
                    event,
                    SessionEvent::DeliveryStatusChanged {
                        receipt: ReceiptKind::Read,
                        ..
                    }
                )
        })
        .count();
    assert_eq!(order_changes, 2);
    assert_eq!(personal_changes, 1);
}

#[tokio::test]
async fn receipt_for_unknown_message_is_an_error() {
    let h = harness();
    let order_id = OrderId::new(Uuid::new_v4());
    let coordinator = h.registry.get_or_create(order_id).await;

    let result = coordinator
        .mark_delivered(MessageId::new(Uuid::new_v4()), UserId::new(Uuid::new_v4()))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn flat_threads_resolve_through_coordinator() {
    let h = harness();
    let order_id = OrderId::new(Uuid::new_v4());
    let sender = UserId::new(Uuid::new_v4());
    let coordinator = h.registry.get_or_create(order_id).await;

    let root = coordinator
        .send(draft(order_id, sender, "does the quote still stand?"))
        .await
        .unwrap();
    h.clock.advance(time::Duration::seconds(1));

    let mut reply = draft(order_id, sender, "yes, until friday");
    reply.reply_to = Some(root.id);
    let reply = coordinator.send(reply).await.unwrap();

    let thread = coordinator.thread(root.id).await.unwrap().unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[0].id, root.id);
    assert_eq!(thread[1].id, reply.id);

    assert_eq!(coordinator.reply_count(root.id).await.unwrap(), Some(1));
    assert_eq!(coordinator.reply_count(reply.id).await.unwrap(), None);

    let preview = coordinator.reply_preview(root.id).await.unwrap().unwrap();
    assert_eq!(preview.text, "does the quote still stand?");
}

#[tokio::test]
async fn history_pages_backwards() {
    let h = harness();
    let order_id = OrderId::new(Uuid::new_v4());
    let sender = UserId::new(Uuid::new_v4());
    let coordinator = h.registry.get_or_create(order_id).await;

    let mut ids = Vec::new();
    for i in 0..4 {
        let message = coordinator
            .send(draft(order_id, sender, &format!("msg {i}")))
            .await
            .unwrap();
        ids.push(message.id);
        h.clock.advance(time::Duration::seconds(3));
    }

    let newest = coordinator.history(None, 2).await.unwrap();
    assert_eq!(newest.iter().map(|m| m.id).collect::<Vec<_>>(), ids[2..]);

    let older = coordinator.history(Some(ids[2]), 2).await.unwrap();
    assert_eq!(older.iter().map(|m| m.id).collect::<Vec<_>>(), ids[..2]);
}

#[tokio::test]
async fn cancelled_upload_leaves_no_state_behind() {
    let h = harness();
    let order_id = OrderId::new(Uuid::new_v4());
    let sender = UserId::new(Uuid::new_v4());
    let coordinator = h.registry.get_or_create(order_id).await;

    let (cancel_tx, cancel_rx) = oneshot::channel();
    cancel_tx.send(()).unwrap();

    let uploaded = coordinator
        .upload_attachment(Path::new("/tmp/photo.png"), "photo.png", cancel_rx)
        .await
        .unwrap();
    assert!(uploaded.is_none());

    // 取消没有留下任何痕迹：总线安静，后续发送不受影响
    assert!(h.bus.events().await.is_empty());
    coordinator.send(draft(order_id, sender, "hi")).await.unwrap();
}

#[tokio::test]
async fn registry_reuses_per_order_singletons() {
    let h = harness();
    let order_a = OrderId::new(Uuid::new_v4());
    let order_b = OrderId::new(Uuid::new_v4());

    let first = h.registry.get_or_create(order_a).await;
    let again = h.registry.get_or_create(order_a).await;
    let other = h.registry.get_or_create(order_b).await;

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));
}
