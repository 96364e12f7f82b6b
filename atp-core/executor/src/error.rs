//! 执行器错误类型

use thiserror::Error;

use crate::retry::ClassifyError;

/// UI 驱动错误
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Element not visible: {0}")]
    NotVisible(String),

    #[error("Element is detached from the page: {0}")]
    Detached(String),

    #[error("Driver setup failed: {0}")]
    Setup(String),

    #[error("Driver error: {0}")]
    Other(String),
}

impl ClassifyError for DriverError {
    fn type_name(&self) -> &str {
        match self {
            DriverError::Timeout(_) => "TimeoutError",
            DriverError::Navigation(_) => "NavigationError",
            DriverError::NotFound(_) => "ElementNotFoundError",
            DriverError::NotVisible(_) => "ElementNotVisibleError",
            DriverError::Detached(_) => "ElementDetachedError",
            DriverError::Setup(_) => "DriverSetupError",
            DriverError::Other(_) => "DriverError",
        }
    }
}

/// HTTP 传输错误 (不包括非 2xx/3xx 响应，那是正常返回的响应)
#[derive(Error, Debug, Clone)]
pub enum HttpError {
    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP client error: {0}")]
    Other(String),
}

impl ClassifyError for HttpError {
    fn type_name(&self) -> &str {
        match self {
            HttpError::Timeout(_) => "TimeoutError",
            HttpError::Network(_) => "NetworkError",
            HttpError::InvalidRequest(_) => "RequestError",
            HttpError::Other(_) => "HttpError",
        }
    }
}

/// 步骤内部错误，只在重试循环中流转，最终转换为步骤结果
#[derive(Error, Debug, Clone)]
pub enum StepError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("{0}")]
    Assertion(String),
}

impl ClassifyError for StepError {
    fn type_name(&self) -> &str {
        match self {
            StepError::Driver(e) => e.type_name(),
            StepError::Http(e) => e.type_name(),
            StepError::Assertion(_) => "AssertionError",
        }
    }
}

/// 执行器错误
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Driver setup failed: {0}")]
    DriverSetup(#[from] DriverError),

    #[error("Screenshot error: {0}")]
    Screenshot(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
