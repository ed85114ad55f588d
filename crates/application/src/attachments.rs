use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("upload failed: {reason}")]
    Upload { reason: String },
}

impl AttachmentError {
    pub fn upload(reason: impl Into<String>) -> Self {
        Self::Upload {
            reason: reason.into(),
        }
    }
}

/// 附件存储协作方：上传本地文件，换回可分发的 URL。
/// 上传是发送流程中允许挂起的操作之一，发送者可以在完成前取消。
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn upload(&self, local_path: &Path, filename: &str) -> Result<String, AttachmentError>;
}
