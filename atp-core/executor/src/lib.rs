//! ATP 执行器
//!
//! 测试用例执行引擎

pub mod action;
pub mod case;
pub mod context;
pub mod driver;
pub mod error;
pub mod http;
pub mod retry;
pub mod screenshot;
pub mod step;

pub use action::{AssertionKind, StepAction};
pub use case::{determine_case_result, CaseOutcome, CaseRequest, TestCaseExecutor};
pub use context::ExecutionContext;
pub use driver::{
    DriverProvider, DriverSession, ElementHandle, ElementState, UiDriver,
    UnavailableDriverProvider, WaitOptions,
};
pub use error::{DriverError, ExecutorError, HttpError, Result, StepError};
pub use http::{HttpBody, HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use retry::{retry, retry_safe, ClassifyError, RetryOptions, RetryOutcome, RetryPolicy};
pub use screenshot::{FsScreenshotStore, ScreenshotStore};
pub use step::{StepExecutor, StepOutcome};
