//! 内存消息仓库
//!
//! 每个订单维护接收顺序的索引，`list_before` 做键集分页。
//! 回复的扁平化在写入口执行：回复永远指向根消息。

use std::collections::HashMap;

use application::{MessageRepository, NewMessageParams};
use async_trait::async_trait;
use domain::{Message, MessageId, OrderId, RepositoryError};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<HashMap<MessageId, Message>>,
    order_index: RwLock<HashMap<OrderId, Vec<MessageId>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 回复目标的存储层校验：目标必须存在且属于同一会话。
    /// 指向另一条回复时折叠到它的根，保持线程扁平。
    async fn resolve_reply_target(
        &self,
        order_id: OrderId,
        reply_to: Option<MessageId>,
    ) -> Result<Option<MessageId>, RepositoryError> {
        let Some(reply_to) = reply_to else {
            return Ok(None);
        };
        let messages = self.messages.read().await;
        let target = messages
            .get(&reply_to)
            .ok_or_else(|| RepositoryError::rejected("reply target not found"))?;
        if target.order_id != order_id {
            return Err(RepositoryError::rejected(
                "reply target belongs to another conversation",
            ));
        }
        Ok(Some(target.reply_to.unwrap_or(target.id)))
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create_message(&self, params: NewMessageParams) -> Result<Message, RepositoryError> {
        let reply_to = self
            .resolve_reply_target(params.order_id, params.reply_to)
            .await?;

        let message = Message::new(
            MessageId::new(Uuid::new_v4()),
            params.order_id,
            params.sender_id,
            params.sender_name,
            params.body,
            params.attachment,
            reply_to,
            params.created_at,
        )
        .map_err(|err| RepositoryError::rejected(err.to_string()))?;

        let mut messages = self.messages.write().await;
        messages.insert(message.id, message.clone());
        drop(messages);

        let mut order_index = self.order_index.write().await;
        order_index
            .entry(message.order_id)
            .or_default()
            .push(message.id);

        Ok(message)
    }

    async fn find(&self, message_id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.get(&message_id).cloned())
    }

    async fn list_order(&self, order_id: OrderId) -> Result<Vec<Message>, RepositoryError> {
        let ids = {
            let order_index = self.order_index.read().await;
            order_index.get(&order_id).cloned().unwrap_or_default()
        };
        let messages = self.messages.read().await;
        Ok(ids
            .into_iter()
            .filter_map(|id| messages.get(&id).cloned())
            .collect())
    }

    async fn list_before(
        &self,
        order_id: OrderId,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let all = self.list_order(order_id).await?;
        let end = match before {
            Some(id) => all.iter().position(|m| m.id == id).unwrap_or(all.len()),
            None => all.len(),
        };
        let start = end.saturating_sub(limit as usize);
        Ok(all[start..end].to_vec())
    }
}
