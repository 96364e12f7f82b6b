//! ATP 存储层
//!
//! 基于 SQLite 的执行记录持久化。上层组件通过 [`ExecutionStore`] 契约读写，
//! [`ExecutionRepository`] 是它的 sqlx 实现。

mod connection;
mod error;
mod models;
mod repositories;
mod store;

pub use connection::StorageManager;
pub use error::{Result, StorageError};
pub use models::*;
pub use repositories::*;
pub use store::ExecutionStore;

use sqlx::SqlitePool;

/// 统一的数据访问层入口
pub struct Storage {
    pool: SqlitePool,
    executions: ExecutionRepository,
}

impl Storage {
    /// 从 StorageManager 创建 Storage
    pub fn from_manager(manager: &StorageManager) -> Self {
        let pool = manager.pool().clone();
        Self {
            executions: ExecutionRepository::new(pool.clone()),
            pool,
        }
    }

    /// 获取执行记录仓储
    pub fn executions(&self) -> &ExecutionRepository {
        &self.executions
    }

    /// 获取数据库连接池
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
