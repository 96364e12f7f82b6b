//! 执行记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::step::StepResult;

/// 执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Error => "error",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Error)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(ExecutionStatus::Queued),
            "running" => Some(ExecutionStatus::Running),
            "completed" => Some(ExecutionStatus::Completed),
            "error" => Some(ExecutionStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionResult {
    Pass,
    Fail,
    Error,
}

impl ExecutionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionResult::Pass => "pass",
            ExecutionResult::Fail => "fail",
            ExecutionResult::Error => "error",
        }
    }

    /// fail 和 error 都计为失败
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionResult::Fail | ExecutionResult::Error)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pass" => Some(ExecutionResult::Pass),
            "fail" => Some(ExecutionResult::Fail),
            "error" => Some(ExecutionResult::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 套件汇总计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteAggregate {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

/// 执行元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    /// 触发者
    pub triggered_by: String,

    /// 运行环境
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// 浏览器 / 驱动版本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_version: Option<String>,

    /// 套件汇总（仅套件记录）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<SuiteAggregate>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecutionMetadata {
    pub fn new(triggered_by: impl Into<String>) -> Self {
        Self {
            triggered_by: triggered_by.into(),
            ..Default::default()
        }
    }
}

/// 执行记录 - 单个测试用例的一次执行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub execution_id: String,

    pub project_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_suite_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite_execution_id: Option<String>,

    pub status: ExecutionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,

    pub start_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// 耗时（毫秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    #[serde(default)]
    pub steps: Vec<StepResult>,

    /// 截图存储引用
    #[serde(default)]
    pub screenshots: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub metadata: ExecutionMetadata,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// 创建排队中的执行记录
    pub fn queued(
        execution_id: impl Into<String>,
        project_id: impl Into<String>,
        metadata: ExecutionMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            execution_id: execution_id.into(),
            project_id: project_id.into(),
            test_case_id: None,
            test_suite_id: None,
            suite_execution_id: None,
            status: ExecutionStatus::Queued,
            result: None,
            start_time: now,
            end_time: None,
            duration: None,
            steps: Vec::new(),
            screenshots: Vec::new(),
            error_message: None,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// 结束时间，缺失时回退到创建时间
    pub fn finished_or_created_at(&self) -> DateTime<Utc> {
        self.end_time.unwrap_or(self.created_at)
    }

    pub fn is_failure(&self) -> bool {
        self.result.map(|r| r.is_failure()).unwrap_or(false)
    }
}
