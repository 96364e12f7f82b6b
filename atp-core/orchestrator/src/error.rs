//! 调度错误类型

use thiserror::Error;

use atp_storage::StorageError;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Malformed task message: {0}")]
    MalformedTask(String),

    #[error("Insufficient time remaining: {remaining_ms}ms available, {required_ms}ms required")]
    InsufficientTime { remaining_ms: u64, required_ms: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl DispatchError {
    /// 消息格式错误不应重新投递
    pub fn is_malformed(&self) -> bool {
        matches!(self, DispatchError::MalformedTask(_))
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
