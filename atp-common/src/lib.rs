//! ATP 通用类型定义
//!
//! 此 crate 包含调度器、执行器和存储层之间共享的数据模型。
//! 所有类型的 JSON 表示使用 camelCase 字段名，与任务消息和执行记录的线上格式保持一致。

mod event;
mod execution;
mod step;
mod task;

pub use event::{AlertDetails, AlertSeverity, AlertType, CriticalAlert, Event, EventType};
pub use execution::{
    Execution, ExecutionMetadata, ExecutionResult, ExecutionStatus, SuiteAggregate,
};
pub use step::{ActionKind, StepResult, StepStatus, TestCase, TestStep};
pub use task::{TaskMessage, TaskMetadata};
