use async_trait::async_trait;
use domain::{Attachment, Message, MessageId, OrderId, RepositoryError, Timestamp, UserId};

/// 新消息写入参数。标识由存储层分配。
#[derive(Debug, Clone)]
pub struct NewMessageParams {
    pub order_id: OrderId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub body: Option<String>,
    pub attachment: Option<Attachment>,
    pub reply_to: Option<MessageId>,
    pub created_at: Timestamp,
}

/// 持久化协作方。失败向发送者呈现为一次普通的发送失败，
/// 协调器不做自动重试。
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 创建消息并分配唯一、不可变的标识。
    async fn create_message(&self, params: NewMessageParams) -> Result<Message, RepositoryError>;

    async fn find(&self, message_id: MessageId) -> Result<Option<Message>, RepositoryError>;

    /// 会话消息快照，按接收顺序排列。
    async fn list_order(&self, order_id: OrderId) -> Result<Vec<Message>, RepositoryError>;

    /// 键集分页：`before` 之前（不含）的最近 `limit` 条，升序返回。
    async fn list_before(
        &self,
        order_id: OrderId,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;
}
