//! 测试步骤与步骤结果

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 动作类型
///
/// 未知的动作名称不会导致反序列化失败，而是保留为 `Unknown`，
/// 由执行器记录为 error 状态的步骤结果。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Wait,
    Assert,
    ApiCall,
    Unknown(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Wait => "wait",
            ActionKind::Assert => "assert",
            ActionKind::ApiCall => "api-call",
            ActionKind::Unknown(name) => name,
        }
    }

    /// 是否需要 UI 驱动
    pub fn requires_driver(&self) -> bool {
        matches!(
            self,
            ActionKind::Navigate | ActionKind::Click | ActionKind::Type | ActionKind::Assert
        )
    }
}

impl From<String> for ActionKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "navigate" => ActionKind::Navigate,
            "click" => ActionKind::Click,
            "type" => ActionKind::Type,
            "wait" => ActionKind::Wait,
            "assert" => ActionKind::Assert,
            "api-call" => ActionKind::ApiCall,
            _ => ActionKind::Unknown(name),
        }
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 测试步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    /// 动作类型
    pub action: ActionKind,

    /// 选择器或 URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// 输入文本 / JSON / 等待时长
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// 断言类型或 HTTP 方法
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_result: Option<String>,
}

impl TestStep {
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            target: None,
            value: None,
            expected_result: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected_result = Some(expected.into());
        self
    }
}

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pass,
    Fail,
    Error,
}

/// 步骤结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// 步骤索引
    pub step_index: usize,

    /// 动作类型
    pub action: ActionKind,

    /// 步骤状态
    pub status: StepStatus,

    /// 耗时（毫秒）
    pub duration: u64,

    /// 错误信息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// 失败截图引用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,

    /// 动作相关的详细信息
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl StepResult {
    pub fn new(step_index: usize, action: ActionKind, status: StepStatus) -> Self {
        Self {
            step_index,
            action,
            status,
            duration: 0,
            error_message: None,
            screenshot: None,
            details: Map::new(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == StepStatus::Pass
    }
}

/// 测试用例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub test_case_id: String,

    pub project_id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// 按声明顺序执行的步骤
    pub steps: Vec<TestStep>,

    /// 所属测试套件
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_suite_id: Option<String>,

    /// 其余字段原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TestCase {
    /// 是否有任一步骤需要 UI 驱动
    pub fn requires_driver(&self) -> bool {
        self.steps.iter().any(|s| s.action.requires_driver())
    }
}
