//! 失败截图存储

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::context::ExecutionContext;
use crate::error::Result;

/// 截图存储，返回可持久化的引用
#[async_trait]
pub trait ScreenshotStore: Send + Sync {
    async fn save(&self, ctx: &ExecutionContext, step_index: usize, data: &[u8])
        -> Result<String>;
}

/// 本地文件系统截图存储
///
/// 路径格式: `<root>/<project_id>/<execution_id>/step-<index>-<timestamp_ms>.png`
#[derive(Debug, Clone)]
pub struct FsScreenshotStore {
    root: PathBuf,
}

impl FsScreenshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ScreenshotStore for FsScreenshotStore {
    async fn save(
        &self,
        ctx: &ExecutionContext,
        step_index: usize,
        data: &[u8],
    ) -> Result<String> {
        let dir = self.root.join(&ctx.project_id).join(&ctx.execution_id);
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = format!(
            "step-{}-{}.png",
            step_index,
            Utc::now().timestamp_millis()
        );
        let path = dir.join(file_name);
        tokio::fs::write(&path, data).await?;

        debug!("截图已保存: {}", path.display());
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsScreenshotStore::new(dir.path());
        let ctx = ExecutionContext::new("exec-1", "proj-1");

        let reference = store.save(&ctx, 2, b"png-bytes").await.unwrap();

        assert!(reference.contains("proj-1"));
        assert!(reference.contains("exec-1"));
        assert!(reference.contains("step-2-"));
        assert_eq!(tokio::fs::read(&reference).await.unwrap(), b"png-bytes");
    }
}
