//! 执行上下文

/// 单次用例执行的上下文，随每次步骤调用传递
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub project_id: String,
}

impl ExecutionContext {
    pub fn new(execution_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            project_id: project_id.into(),
        }
    }
}
