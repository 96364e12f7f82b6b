//! 执行记录库的连接与建表
//!
//! 文件库供 CLI 和投递层长期使用，多个调度进程可能同时写入同一个库，
//! 因此开启 WAL 并设置忙等待。内存库只用于测试。

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, StorageError};

const FILE_POOL_SIZE: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const SCHEMA: &str = include_str!("../migrations/001_initial.sql");

/// 执行记录库
pub struct StorageManager {
    pool: SqlitePool,
}

impl StorageManager {
    /// 打开 (必要时创建) 执行记录库
    ///
    /// `db_path` 支持 `~`，父目录不存在时会先创建。
    ///
    /// ```no_run
    /// # use atp_storage::StorageManager;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let storage = StorageManager::new("~/.config/atp/executions.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(db_path: &str) -> Result<Self> {
        let path = resolve_db_path(db_path)?;
        info!("打开执行记录库: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_POOL_SIZE)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        Self::with_schema(pool).await
    }

    /// 内存执行记录库
    ///
    /// 内存库只活在单个连接里，连接池固定 1 个连接且不回收空闲连接。
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        Self::with_schema(pool).await
    }

    async fn with_schema(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StorageError::MigrationError(e.to_string()))?;
        debug!("executions 表已就绪");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// 库中的执行记录总数 (含套件记录)
    pub async fn execution_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM executions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn resolve_db_path(db_path: &str) -> Result<PathBuf> {
    if db_path.trim().is_empty() {
        return Err(StorageError::ConnectionError(
            "database path is empty".to_string(),
        ));
    }

    let path = PathBuf::from(shellexpand::tilde(db_path).as_ref());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::ConnectionError(format!(
                "cannot create database directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atp_common::{Execution, ExecutionMetadata};

    use crate::{ExecutionStore, Storage};

    #[tokio::test]
    async fn test_in_memory_schema() {
        let storage = StorageManager::new_in_memory().await.unwrap();
        storage.health_check().await.unwrap();

        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='executions'",
        )
        .fetch_one(storage.pool())
        .await
        .unwrap();
        assert_eq!(tables, 1);
        assert_eq!(storage.execution_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("atp.db");
        let db_path = db_path.to_str().unwrap();

        let storage = StorageManager::new(db_path).await.unwrap();
        let execution = Execution::queued("exec-1", "proj-1", ExecutionMetadata::new("ci"));
        Storage::from_manager(&storage)
            .executions()
            .put(&execution)
            .await
            .unwrap();
        storage.close().await;

        let reopened = StorageManager::new(db_path).await.unwrap();
        assert_eq!(reopened.execution_count().await.unwrap(), 1);
        reopened.close().await;
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(matches!(
            resolve_db_path("  "),
            Err(StorageError::ConnectionError(_))
        ));
    }
}
