use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{MessageId, OrderId, Timestamp, UserId};

/// 消息附件，一条消息至多携带一种附件。
///
/// 用带标签的枚举表达"图片/文档/音频互斥"这一约束，
/// 而不是依赖多个可选字段在运行时互相排斥。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    Image { url: String },
    Document { url: String, name: String },
    Audio { url: String, duration_secs: u32 },
}

impl Attachment {
    pub fn kind(&self) -> MessageKind {
        match self {
            Attachment::Image { .. } => MessageKind::Image,
            Attachment::Document { .. } => MessageKind::Document,
            Attachment::Audio { .. } => MessageKind::Audio,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Attachment::Image { url }
            | Attachment::Document { url, .. }
            | Attachment::Audio { url, .. } => url,
        }
    }
}

/// 消息类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Document,
    Audio,
    System,
}

/// 消息送达状态，只能单向前进：Sent -> Delivered -> Read。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

/// 一条会话消息。
///
/// `delivered_to` / `read_by` 只增不减，`status()` 由二者推导，
/// 不单独存储，因此不可能回退。序列化时把推导结果作为 `status`
/// 字段一并输出（见下方手写的 `Serialize` 实现）。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub order_id: OrderId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub body: Option<String>,
    pub kind: MessageKind,
    pub attachment: Option<Attachment>,
    pub reply_to: Option<MessageId>,
    pub created_at: Timestamp,
    pub delivered_to: HashSet<UserId>,
    pub read_by: HashSet<UserId>,
}

impl Message {
    /// 构造一条用户消息。正文和附件至少要有其一。
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: MessageId,
        order_id: OrderId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        body: Option<String>,
        attachment: Option<Attachment>,
        reply_to: Option<MessageId>,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if sender_id.is_system() {
            return Err(DomainError::invalid_argument(
                "sender_id",
                "system identity cannot author user messages",
            ));
        }
        let body = body.filter(|text| !text.trim().is_empty());
        if body.is_none() && attachment.is_none() {
            return Err(DomainError::invalid_argument(
                "body",
                "message needs a body or an attachment",
            ));
        }
        let kind = attachment
            .as_ref()
            .map(Attachment::kind)
            .unwrap_or(MessageKind::Text);
        Ok(Self {
            id,
            order_id,
            sender_id,
            sender_name: sender_name.into(),
            body,
            kind,
            attachment,
            reply_to,
            created_at,
            delivered_to: HashSet::new(),
            read_by: HashSet::new(),
        })
    }

    /// 构造一条系统消息，发送者固定为系统保留身份。
    pub fn system(
        id: MessageId,
        order_id: OrderId,
        text: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            order_id,
            sender_id: UserId::system(),
            sender_name: crate::events::SYSTEM_SENDER_NAME.to_owned(),
            body: Some(text.into()),
            kind: MessageKind::System,
            attachment: None,
            reply_to: None,
            created_at,
            delivered_to: HashSet::new(),
            read_by: HashSet::new(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.kind == MessageKind::System
    }

    /// 由回执集合推导出的展示状态。
    pub fn status(&self) -> MessageStatus {
        if !self.read_by.is_empty() {
            MessageStatus::Read
        } else if !self.delivered_to.is_empty() {
            MessageStatus::Delivered
        } else {
            MessageStatus::Sent
        }
    }
}

// status 是推导值而非存储字段，序列化时手动附上；
// 反序列化忽略它（serde 默认跳过未知字段）。
impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Message", 12)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("order_id", &self.order_id)?;
        state.serialize_field("sender_id", &self.sender_id)?;
        state.serialize_field("sender_name", &self.sender_name)?;
        state.serialize_field("body", &self.body)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("attachment", &self.attachment)?;
        state.serialize_field("reply_to", &self.reply_to)?;
        state.serialize_field("created_at", &self.created_at)?;
        state.serialize_field("status", &self.status())?;
        state.serialize_field("delivered_to", &self.delivered_to)?;
        state.serialize_field("read_by", &self.read_by)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn base_message(body: Option<&str>, attachment: Option<Attachment>) -> Result<Message, DomainError> {
        Message::new(
            MessageId::new(Uuid::new_v4()),
            OrderId::new(Uuid::new_v4()),
            UserId::new(Uuid::new_v4()),
            "alice",
            body.map(str::to_owned),
            attachment,
            None,
            Timestamp::UNIX_EPOCH,
        )
    }

    #[test]
    fn message_kind_follows_attachment() {
        let message = base_message(
            None,
            Some(Attachment::Document {
                url: "/uploads/contract.pdf".into(),
                name: "contract.pdf".into(),
            }),
        )
        .unwrap();
        assert_eq!(message.kind, MessageKind::Document);

        let message = base_message(Some("hello"), None).unwrap();
        assert_eq!(message.kind, MessageKind::Text);
    }

    #[test]
    fn message_requires_body_or_attachment() {
        assert!(base_message(None, None).is_err());
        assert!(base_message(Some("   "), None).is_err());
        assert!(base_message(
            None,
            Some(Attachment::Image {
                url: "/uploads/a.png".into()
            })
        )
        .is_ok());
    }

    #[test]
    fn system_identity_cannot_author_user_messages() {
        let result = Message::new(
            MessageId::new(Uuid::new_v4()),
            OrderId::new(Uuid::new_v4()),
            UserId::system(),
            "System",
            Some("hi".into()),
            None,
            None,
            Timestamp::UNIX_EPOCH,
        );
        assert!(result.is_err());
    }

    #[test]
    fn status_is_derived_and_monotone() {
        let mut message = base_message(Some("hi"), None).unwrap();
        assert_eq!(message.status(), MessageStatus::Sent);

        let reader = UserId::new(Uuid::new_v4());
        message.delivered_to.insert(reader);
        assert_eq!(message.status(), MessageStatus::Delivered);

        message.read_by.insert(reader);
        assert_eq!(message.status(), MessageStatus::Read);
        assert!(MessageStatus::Sent < MessageStatus::Delivered);
        assert!(MessageStatus::Delivered < MessageStatus::Read);
    }

    #[test]
    fn serialized_message_carries_derived_status() {
        let mut message = base_message(Some("hi"), None).unwrap();
        message.read_by.insert(UserId::new(Uuid::new_v4()));

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["status"], "read");
        assert_eq!(json["body"], "hi");

        // status 不是存储字段，反序列化时被忽略
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn attachment_serializes_with_kind_tag() {
        let attachment = Attachment::Audio {
            url: "/uploads/voice.ogg".into(),
            duration_secs: 12,
        };
        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["kind"], "audio");
        assert_eq!(json["duration_secs"], 12);

        let back: Attachment = serde_json::from_value(json).unwrap();
        assert_eq!(back, attachment);
    }
}
