//! 消息草稿校验
//!
//! 纯函数：只依赖传入的配置（最大长度），无任何副作用。
//! 规则按固定顺序评估：空消息 → 超长 → 附件种类冲突。

use domain::{Attachment, MessageId, OrderId, UserId};
use serde::Deserialize;

use crate::error::ValidationError;

/// 客户端提交的消息草稿。
///
/// 附件字段保持入站时的松散形态（多个可选字段），
/// 由 `attachment()` 在边界处折叠成带标签的 `Attachment`；
/// 折叠失败即"附件种类冲突"。
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDraft {
    pub order_id: OrderId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub document_url: Option<String>,
    pub document_name: Option<String>,
    pub audio_url: Option<String>,
    pub audio_duration_secs: Option<u32>,
    pub reply_to: Option<MessageId>,
}

impl MessageDraft {
    /// 去除首尾空白后的正文；全空白视为无正文。
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn has_attachment(&self) -> bool {
        self.image_url.is_some() || self.document_url.is_some() || self.audio_url.is_some()
    }

    /// 折叠成带标签的附件变体。一旦出现多种附件即拒绝，
    /// 之后"至多一种附件"就是结构保证而非运行时检查。
    pub fn attachment(&self) -> Result<Option<Attachment>, ValidationError> {
        let mut attachment = None;
        if let Some(url) = &self.image_url {
            attachment = Some(Attachment::Image { url: url.clone() });
        }
        if let Some(url) = &self.document_url {
            if attachment.is_some() {
                return Err(ValidationError::MultipleAttachmentKinds);
            }
            attachment = Some(Attachment::Document {
                url: url.clone(),
                name: self
                    .document_name
                    .clone()
                    .unwrap_or_else(|| "document".to_owned()),
            });
        }
        if let Some(url) = &self.audio_url {
            if attachment.is_some() {
                return Err(ValidationError::MultipleAttachmentKinds);
            }
            attachment = Some(Attachment::Audio {
                url: url.clone(),
                duration_secs: self.audio_duration_secs.unwrap_or(0),
            });
        }
        Ok(attachment)
    }
}

/// 出站消息的结构与策略校验。
#[derive(Debug, Clone)]
pub struct MessageValidator {
    max_length: usize,
}

impl MessageValidator {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn validate(&self, draft: &MessageDraft) -> Result<(), ValidationError> {
        let text = draft.trimmed_text();

        if text.is_none() && !draft.has_attachment() {
            return Err(ValidationError::Empty);
        }

        if let Some(text) = text {
            let len = text.chars().count();
            if len > self.max_length {
                return Err(ValidationError::TooLong {
                    len,
                    max: self.max_length,
                });
            }
        }

        draft.attachment()?;
        Ok(())
    }
}
