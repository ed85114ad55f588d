use async_trait::async_trait;
use domain::{OrderId, SessionEvent, UserId};
use thiserror::Error;

/// 主题命名是逐字节精确的约定，客户端按同样的格式订阅。
pub fn order_topic(order_id: OrderId) -> String {
    format!("order:{order_id}")
}

pub fn notifications_topic(user_id: UserId) -> String {
    format!("notifications:{user_id}")
}

pub fn mentions_topic(user_id: UserId) -> String {
    format!("mentions:{user_id}")
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 主题总线：同一主题内单个发布者的事件保序，
/// 跨发布者不保证全序。
#[async_trait]
pub trait TopicBus: Send + Sync {
    async fn publish(&self, topic: &str, event: SessionEvent) -> Result<(), BroadcastError>;
}
