//! 订单会话系统核心领域模型
//!
//! 包含消息、附件、在线名册、送达记录等核心实体，
//! 以及会话总线上流动的类型化事件。

pub mod errors;
pub mod events;
pub mod message;
pub mod message_delivery;
pub mod presence;
pub mod value_objects;

pub use errors::{DomainError, DomainResult, RepositoryError};
pub use events::{
    PresenceEventKind, ReceiptKind, SessionEvent, SystemNotification, SYSTEM_SENDER_NAME,
};
pub use message::{Attachment, Message, MessageKind, MessageStatus};
pub use message_delivery::DeliveryRecord;
pub use presence::{ConnectionMeta, PresenceEntry, RosterDiff};
pub use value_objects::{ConnectionId, MessageId, OrderId, Timestamp, UserId};
