//! 会话总线上的类型化事件
//!
//! 订阅同一订单主题的各连接通过这些事件感知新消息、系统通知、
//! 回执状态变化和名册增量。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Message, MessageStatus};
use crate::presence::RosterDiff;
use crate::value_objects::{MessageId, OrderId, Timestamp, UserId};

/// 系统通知发送者的展示名。
pub const SYSTEM_SENDER_NAME: &str = "System";

/// 在线事件类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceEventKind {
    Joined,
    Left,
}

/// 回执类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    Delivered,
    Read,
}

/// 进入/离开会话时展示给其他成员的系统通知。
///
/// `target_id` 是事件涉及的身份，仅用于在该身份自己的连接上
/// 抑制回声，不参与其他过滤。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNotification {
    pub id: Uuid,
    pub order_id: OrderId,
    pub text: String,
    pub sender_id: UserId,
    pub target_id: UserId,
    pub kind: PresenceEventKind,
    pub created_at: Timestamp,
}

impl SystemNotification {
    pub fn joined(
        order_id: OrderId,
        target_id: UserId,
        display_name: &str,
        at: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            text: format!("{display_name} entered the conversation"),
            sender_id: UserId::system(),
            target_id,
            kind: PresenceEventKind::Joined,
            created_at: at,
        }
    }

    pub fn left(order_id: OrderId, target_id: UserId, display_name: &str, at: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            text: format!("{display_name} left the conversation"),
            sender_id: UserId::system(),
            target_id,
            kind: PresenceEventKind::Left,
            created_at: at,
        }
    }
}

/// 会话主题上广播的事件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// 新消息通过校验并持久化成功后广播
    NewMessage { message: Message },

    /// 在线变更经防抖后产生的系统通知
    SystemNotification { notification: SystemNotification },

    /// 某条消息的回执集合发生了实际变化
    DeliveryStatusChanged {
        order_id: OrderId,
        message_id: MessageId,
        recipient: UserId,
        receipt: ReceiptKind,
        status: MessageStatus,
    },

    /// 名册增量，供客户端维护在线列表
    PresenceChanged { order_id: OrderId, diff: RosterDiff },
}

impl SessionEvent {
    /// 事件类型名，用于日志与调试。
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::NewMessage { .. } => "NewMessage",
            SessionEvent::SystemNotification { .. } => "SystemNotification",
            SessionEvent::DeliveryStatusChanged { .. } => "DeliveryStatusChanged",
            SessionEvent::PresenceChanged { .. } => "PresenceChanged",
        }
    }

    /// 事件归属的订单会话。
    pub fn order_id(&self) -> OrderId {
        match self {
            SessionEvent::NewMessage { message } => message.order_id,
            SessionEvent::SystemNotification { notification } => notification.order_id,
            SessionEvent::DeliveryStatusChanged { order_id, .. }
            | SessionEvent::PresenceChanged { order_id, .. } => *order_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_text_is_templated() {
        let order_id = OrderId::new(Uuid::new_v4());
        let user = UserId::new(Uuid::new_v4());

        let joined = SystemNotification::joined(order_id, user, "Ada", Timestamp::UNIX_EPOCH);
        assert_eq!(joined.text, "Ada entered the conversation");
        assert!(joined.sender_id.is_system());
        assert_eq!(joined.target_id, user);

        let left = SystemNotification::left(order_id, user, "Ada", Timestamp::UNIX_EPOCH);
        assert_eq!(left.text, "Ada left the conversation");
        assert_eq!(left.kind, PresenceEventKind::Left);
    }

    #[test]
    fn event_serialization_round_trips() {
        let order_id = OrderId::new(Uuid::new_v4());
        let event = SessionEvent::DeliveryStatusChanged {
            order_id,
            message_id: MessageId::new(Uuid::new_v4()),
            recipient: UserId::new(Uuid::new_v4()),
            receipt: ReceiptKind::Read,
            status: MessageStatus::Read,
        };

        let json = serde_json::to_string(&event).unwrap();
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.event_type(), "DeliveryStatusChanged");
        assert_eq!(back.order_id(), order_id);
    }
}
