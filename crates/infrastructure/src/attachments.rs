//! 本地磁盘附件存储
//!
//! 上传即把本地文件拷贝进集中目录，文件名加 uuid 前缀避免冲突，
//! 返回可分发的相对 URL。

use std::path::{Path, PathBuf};

use application::{AttachmentError, AttachmentStore};
use async_trait::async_trait;
use uuid::Uuid;

pub struct LocalDiskAttachmentStore {
    root: PathBuf,
}

impl LocalDiskAttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AttachmentStore for LocalDiskAttachmentStore {
    async fn upload(&self, local_path: &Path, filename: &str) -> Result<String, AttachmentError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| AttachmentError::upload(err.to_string()))?;

        // 只保留文件名部分，丢掉调用方可能带入的路径
        let safe_name = Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("attachment");
        let stored_name = format!("{}-{}", Uuid::new_v4(), safe_name);
        let destination = self.root.join(&stored_name);

        tokio::fs::copy(local_path, &destination)
            .await
            .map_err(|err| AttachmentError::upload(err.to_string()))?;

        tracing::debug!(filename = safe_name, stored = %destination.display(), "附件已入库");
        Ok(format!("/uploads/{stored_name}"))
    }
}
