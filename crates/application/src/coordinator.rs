//! 会话协调器
//!
//! 每个订单会话一个协调器单例，串起发送流水线：
//! 校验 → 限流检查 → 持久化 → 广播 → 回执/线程登记。
//! 任何一个前置阶段拒绝，消息就不会出现在总线上——其他观察者
//! 永远看不到被拒绝的草稿。持久化失败只回给发送者，不自动重试。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use domain::{
    Message, MessageId, MessageStatus, OrderId, ReceiptKind, RepositoryError, SessionEvent,
    UserId,
};
use tokio::sync::{oneshot, Mutex, RwLock};

use crate::attachments::AttachmentStore;
use crate::broadcaster::{notifications_topic, order_topic, TopicBus};
use crate::clock::Clock;
use crate::delivery::DeliveryStatusTracker;
use crate::error::{ApplicationError, SendError};
use crate::rate_limiter::{MessageRateLimiter, RateLimitPolicy};
use crate::repository::{MessageRepository, NewMessageParams};
use crate::thread_index::{ReplyPreview, ThreadIndex};
use crate::validator::{MessageDraft, MessageValidator};

/// 发送流水线的阶段，用于结构化日志。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendPhase {
    Validated,
    RateChecked,
    Persisted,
    Broadcast,
}

/// 历史分页中的一项：消息本体加线程上下文。
#[derive(Debug, Clone, serde::Serialize)]
pub struct HistoryItem {
    #[serde(flatten)]
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_preview: Option<ReplyPreview>,
}

/// 协调器的外部协作方与策略。
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub repository: Arc<dyn MessageRepository>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub bus: Arc<dyn TopicBus>,
    pub clock: Arc<dyn Clock>,
    pub validator: MessageValidator,
    pub rate_limit: RateLimitPolicy,
}

/// 单个订单会话的协调器。
///
/// 限流器、回执追踪器按会话各持一份，写入都经由这一个实例，
/// 无需额外加锁协调多个写者。
pub struct SessionCoordinator {
    order_id: OrderId,
    topic: String,
    repository: Arc<dyn MessageRepository>,
    attachments: Arc<dyn AttachmentStore>,
    bus: Arc<dyn TopicBus>,
    clock: Arc<dyn Clock>,
    validator: MessageValidator,
    rate_limiter: MessageRateLimiter,
    delivery: Mutex<DeliveryStatusTracker>,
}

impl SessionCoordinator {
    pub fn new(order_id: OrderId, deps: CoordinatorDeps) -> Self {
        Self {
            order_id,
            topic: order_topic(order_id),
            repository: deps.repository,
            attachments: deps.attachments,
            bus: deps.bus,
            clock: deps.clock,
            validator: deps.validator,
            rate_limiter: MessageRateLimiter::new(deps.rate_limit),
            delivery: Mutex::new(DeliveryStatusTracker::new()),
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// 处理一次发送请求。
    pub async fn send(&self, draft: MessageDraft) -> Result<Message, SendError> {
        // Drafted -> Validated
        self.validator.validate(&draft)?;
        let attachment = draft.attachment()?;
        tracing::debug!(phase = ?SendPhase::Validated, sender_id = %draft.sender_id, "发送校验通过");

        // Validated -> RateChecked
        let limiter_text = draft.trimmed_text().unwrap_or("");
        let now = self.clock.now();
        self.rate_limiter
            .check(draft.sender_id, limiter_text, now)
            .await?;
        tracing::debug!(phase = ?SendPhase::RateChecked, sender_id = %draft.sender_id, "限流放行");

        // RateChecked -> Persisted：唯一允许挂起的阶段。
        // 失败只回给发送者，由其自行决定是否重新提交。
        let message = self
            .repository
            .create_message(NewMessageParams {
                order_id: self.order_id,
                sender_id: draft.sender_id,
                sender_name: draft.sender_name.clone(),
                body: draft.trimmed_text().map(str::to_owned),
                attachment,
                reply_to: draft.reply_to,
                created_at: now,
            })
            .await?;
        tracing::debug!(phase = ?SendPhase::Persisted, message_id = %message.id, "消息已持久化");

        // Persisted -> Broadcast：此后才消耗限流配额、登记回执。
        self.rate_limiter
            .record(draft.sender_id, limiter_text, now)
            .await;
        self.delivery.lock().await.track(&message);

        if let Err(err) = self
            .bus
            .publish(
                &self.topic,
                SessionEvent::NewMessage {
                    message: message.clone(),
                },
            )
            .await
        {
            // 消息已持久化，广播失败不回滚发送
            tracing::warn!(error = %err, message_id = %message.id, "消息广播失败");
        }
        tracing::info!(
            phase = ?SendPhase::Broadcast,
            message_id = %message.id,
            order_id = %self.order_id,
            "消息发送完成"
        );
        Ok(message)
    }

    /// 收件人送达回执。
    pub async fn mark_delivered(
        &self,
        message_id: MessageId,
        recipient: UserId,
    ) -> Result<Option<MessageStatus>, ApplicationError> {
        self.apply_receipt(message_id, recipient, ReceiptKind::Delivered)
            .await
    }

    /// 收件人已读回执。
    pub async fn mark_read(
        &self,
        message_id: MessageId,
        recipient: UserId,
    ) -> Result<Option<MessageStatus>, ApplicationError> {
        self.apply_receipt(message_id, recipient, ReceiptKind::Read)
            .await
    }

    async fn apply_receipt(
        &self,
        message_id: MessageId,
        recipient: UserId,
        receipt: ReceiptKind,
    ) -> Result<Option<MessageStatus>, ApplicationError> {
        let message = self
            .repository
            .find(message_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("message"))?;

        let changed = {
            let mut delivery = self.delivery.lock().await;
            match receipt {
                ReceiptKind::Delivered => delivery.mark_delivered(&message, recipient),
                ReceiptKind::Read => delivery.mark_read(&message, recipient),
            }
        };

        if let Some(status) = changed {
            let event = SessionEvent::DeliveryStatusChanged {
                order_id: self.order_id,
                message_id,
                recipient,
                receipt,
                status,
            };
            if let Err(err) = self.bus.publish(&self.topic, event.clone()).await {
                tracing::warn!(error = %err, message_id = %message_id, "回执广播失败");
            }
            // 发送者的个人通知通道也推一份，人在别的页面时回执也能到达
            if let Err(err) = self
                .bus
                .publish(&notifications_topic(message.sender_id), event)
                .await
            {
                tracing::warn!(error = %err, message_id = %message_id, "回执个人通道推送失败");
            }
        }
        Ok(changed)
    }

    /// 单条消息视图，回执集合已合并。
    pub async fn message(
        &self,
        message_id: MessageId,
    ) -> Result<Option<Message>, ApplicationError> {
        let Some(mut message) = self.repository.find(message_id).await? else {
            return Ok(None);
        };
        self.delivery.lock().await.decorate(&mut message);
        Ok(Some(message))
    }

    /// 历史分页。晚到的响应由调用方在会话拆除后丢弃。
    pub async fn history(
        &self,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, ApplicationError> {
        let mut messages = self.repository.list_before(self.order_id, before, limit).await?;
        let delivery = self.delivery.lock().await;
        for message in &mut messages {
            delivery.decorate(message);
        }
        Ok(messages)
    }

    /// 带线程上下文的历史分页：每条消息附上它的回复数，
    /// 回复消息再附上"正在回复"摘要。快照只取一次。
    pub async fn history_view(
        &self,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<HistoryItem>, ApplicationError> {
        let snapshot = self.repository.list_order(self.order_id).await?;
        let index = ThreadIndex::new(&snapshot);

        let end = match before {
            Some(id) => snapshot
                .iter()
                .position(|m| m.id == id)
                .unwrap_or(snapshot.len()),
            None => snapshot.len(),
        };
        let start = end.saturating_sub(limit as usize);

        let delivery = self.delivery.lock().await;
        let items = snapshot[start..end]
            .iter()
            .map(|message| {
                let reply_count = index.reply_count(message.id);
                let reply_preview = message.reply_to.and_then(|root_id| index.preview_of(root_id));
                let mut message = message.clone();
                delivery.decorate(&mut message);
                HistoryItem {
                    message,
                    reply_count,
                    reply_preview,
                }
            })
            .collect();
        Ok(items)
    }

    /// 完整线程：根消息在前，回复按创建顺序。
    pub async fn thread(
        &self,
        root_id: MessageId,
    ) -> Result<Option<Vec<Message>>, ApplicationError> {
        let snapshot = self.repository.list_order(self.order_id).await?;
        let index = ThreadIndex::new(&snapshot);
        let Some(thread) = index.thread_of(root_id) else {
            return Ok(None);
        };
        let mut messages: Vec<Message> = thread.into_iter().cloned().collect();
        let delivery = self.delivery.lock().await;
        for message in &mut messages {
            delivery.decorate(message);
        }
        Ok(Some(messages))
    }

    pub async fn reply_count(
        &self,
        message_id: MessageId,
    ) -> Result<Option<usize>, ApplicationError> {
        let snapshot = self.repository.list_order(self.order_id).await?;
        Ok(ThreadIndex::new(&snapshot).reply_count(message_id))
    }

    /// "正在回复"摘要。
    pub async fn reply_preview(
        &self,
        message_id: MessageId,
    ) -> Result<Option<ReplyPreview>, ApplicationError> {
        let snapshot = self.repository.list_order(self.order_id).await?;
        Ok(ThreadIndex::new(&snapshot).preview_of(message_id))
    }

    /// 可取消的附件上传。取消返回 `Ok(None)`：此时既没有消耗限流
    /// 配额，也没有产生任何线程或回执状态。
    pub async fn upload_attachment(
        &self,
        local_path: &Path,
        filename: &str,
        cancel: oneshot::Receiver<()>,
    ) -> Result<Option<String>, ApplicationError> {
        let cancelled = async move {
            // 发送端被丢弃视为放弃取消，上传继续
            if cancel.await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            _ = cancelled => {
                tracing::debug!(filename, "附件上传在完成前被发送者取消");
                Ok(None)
            }
            uploaded = self.attachments.upload(local_path, filename) => {
                Ok(Some(uploaded?))
            }
        }
    }
}

/// 协调器注册表：按订单懒创建单例。
pub struct SessionRegistry {
    deps: CoordinatorDeps,
    coordinators: RwLock<HashMap<OrderId, Arc<SessionCoordinator>>>,
}

impl SessionRegistry {
    pub fn new(deps: CoordinatorDeps) -> Self {
        Self {
            deps,
            coordinators: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, order_id: OrderId) -> Arc<SessionCoordinator> {
        if let Some(coordinator) = self.coordinators.read().await.get(&order_id) {
            return coordinator.clone();
        }
        let mut coordinators = self.coordinators.write().await;
        coordinators
            .entry(order_id)
            .or_insert_with(|| Arc::new(SessionCoordinator::new(order_id, self.deps.clone())))
            .clone()
    }
}
