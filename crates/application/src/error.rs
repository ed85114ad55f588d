//! 应用层错误分类
//!
//! 校验错误与限流错误只回给发送者；持久化错误以不透明原因回给
//! 发送者且不自动重试；在线注册失败只降级会话。没有任何一类
//! 错误会导致宿主进程退出。

use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::attachments::AttachmentError;
use crate::broadcaster::BroadcastError;

/// 草稿结构校验失败的原因。
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message text is empty and no attachment is present")]
    Empty,

    #[error("message text exceeds {max} characters (got {len})")]
    TooLong { len: usize, max: usize },

    #[error("more than one attachment kind present")]
    MultipleAttachmentKinds,
}

impl ValidationError {
    /// 稳定的机器可读原因码。
    pub fn reason_code(&self) -> &'static str {
        match self {
            ValidationError::Empty => "empty",
            ValidationError::TooLong { .. } => "too_long",
            ValidationError::MultipleAttachmentKinds => "multiple_attachment_kinds",
        }
    }
}

/// 限流拒绝的原因，附带重试提示。
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("too many messages, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("duplicate message, retry in {retry_after_secs}s")]
    DuplicateSpam { retry_after_secs: u64 },

    #[error("too many long messages, retry in {retry_after_secs}s")]
    LongMessageSpam { retry_after_secs: u64 },
}

impl RateLimitError {
    /// 最早的越界记录滑出窗口所需的秒数。
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            RateLimitError::RateLimited { retry_after_secs }
            | RateLimitError::DuplicateSpam { retry_after_secs }
            | RateLimitError::LongMessageSpam { retry_after_secs } => *retry_after_secs,
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            RateLimitError::RateLimited { .. } => "rate_limited",
            RateLimitError::DuplicateSpam { .. } => "duplicate_spam",
            RateLimitError::LongMessageSpam { .. } => "long_message_spam",
        }
    }
}

/// 发送流水线的终态拒绝：三个前置阶段各自对应一类。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("rate limited: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] RepositoryError),
}

/// 在线注册表错误。非致命：注册失败的用户继续会话，只是不对
/// 其他成员显示在线。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PresenceError {
    #[error("presence tracking failed: {reason}")]
    Unavailable { reason: String },
}

impl PresenceError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),

    #[error("presence error: {0}")]
    Presence(#[from] PresenceError),

    #[error("attachment error: {0}")]
    Attachment(#[from] AttachmentError),
}
