//! 领域模型错误定义

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 字段取值不合法
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 当前状态下不允许的操作
    #[error("operation not allowed: {reason}")]
    OperationNotAllowed { reason: String },
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn operation_not_allowed(reason: impl Into<String>) -> Self {
        Self::OperationNotAllowed {
            reason: reason.into(),
        }
    }
}

/// 持久化协作方返回的错误。
///
/// 原因对协调器是不透明的：向发送者呈现为一次普通的发送失败，
/// 不做自动重试。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// 存储层拒绝了这次写入（字段校验、约束冲突等）
    #[error("storage rejected the write: {reason}")]
    Rejected { reason: String },

    /// 存储层暂时不可达
    #[error("storage unavailable: {reason}")]
    Unavailable { reason: String },

    /// 目标记录不存在
    #[error("{what} not found")]
    NotFound { what: String },
}

impl RepositoryError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
