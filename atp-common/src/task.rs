//! 任务消息

use serde::{Deserialize, Serialize};

use crate::execution::{Execution, ExecutionMetadata};
use crate::step::TestCase;

/// 任务元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    pub triggered_by: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// 入站任务消息 - 每次执行尝试一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMessage {
    pub execution_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_suite_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite_execution_id: Option<String>,

    pub project_id: String,

    pub test_case: TestCase,

    pub metadata: TaskMetadata,
}

impl TaskMessage {
    /// 从 JSON 字符串解析
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 用例 ID：优先使用消息字段，其次是用例定义中的 ID
    pub fn resolved_test_case_id(&self) -> String {
        self.test_case_id
            .clone()
            .unwrap_or_else(|| self.test_case.test_case_id.clone())
    }

    /// 套件 ID：优先使用消息字段，其次是用例定义中的 ID
    pub fn resolved_test_suite_id(&self) -> Option<String> {
        self.test_suite_id
            .clone()
            .or_else(|| self.test_case.test_suite_id.clone())
    }

    /// 构造对应的排队中执行记录
    pub fn queued_execution(&self) -> Execution {
        let mut metadata = ExecutionMetadata::new(&self.metadata.triggered_by);
        metadata.environment = self.metadata.environment.clone();

        let mut execution = Execution::queued(&self.execution_id, &self.project_id, metadata);
        execution.test_case_id = Some(self.resolved_test_case_id());
        execution.test_suite_id = self.resolved_test_suite_id();
        execution.suite_execution_id = self.suite_execution_id.clone();
        execution
    }
}
