//! ATP 调度器
//!
//! 接收任务消息并驱动用例执行，维护套件汇总，检测失败模式

pub mod budget;
pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod suite;

pub use budget::{DeadlineBudget, FixedBudget, TimeBudget};
pub use config::DispatcherConfig;
pub use detector::{generate_critical_alert, FailureDetector};
pub use dispatcher::{DispatchReport, Dispatcher, TIMEOUT_MARKER};
pub use error::{DispatchError, Result};
pub use events::{
    completion_event, new_event, EventSink, FanoutEventSink, JsonlEventSink, TracingEventSink,
};
pub use suite::{
    calculate_aggregate, determine_suite_result, determine_suite_status, SuiteAggregator,
};
