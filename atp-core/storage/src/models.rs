use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use atp_common::{Execution, ExecutionResult, ExecutionStatus};

use crate::error::StorageError;

/// 执行记录数据库模型
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub project_id: String,
    pub test_case_id: Option<String>,
    pub test_suite_id: Option<String>,
    pub suite_execution_id: Option<String>,
    pub status: String,         // 'queued', 'running', 'completed', 'error'
    pub result: Option<String>, // 'pass', 'fail', 'error'
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub steps: String,       // JSON array
    pub screenshots: String, // JSON array
    pub error_message: Option<String>,
    pub metadata: String, // JSON object
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&Execution> for ExecutionRecord {
    type Error = StorageError;

    fn try_from(execution: &Execution) -> Result<Self, Self::Error> {
        Ok(Self {
            execution_id: execution.execution_id.clone(),
            project_id: execution.project_id.clone(),
            test_case_id: execution.test_case_id.clone(),
            test_suite_id: execution.test_suite_id.clone(),
            suite_execution_id: execution.suite_execution_id.clone(),
            status: execution.status.as_str().to_string(),
            result: execution.result.map(|r| r.as_str().to_string()),
            start_time: execution.start_time,
            end_time: execution.end_time,
            duration_ms: execution.duration.map(|d| d as i64),
            steps: serde_json::to_string(&execution.steps)?,
            screenshots: serde_json::to_string(&execution.screenshots)?,
            error_message: execution.error_message.clone(),
            metadata: serde_json::to_string(&execution.metadata)?,
            created_at: execution.created_at,
            updated_at: execution.updated_at,
        })
    }
}

impl TryFrom<ExecutionRecord> for Execution {
    type Error = StorageError;

    fn try_from(record: ExecutionRecord) -> Result<Self, Self::Error> {
        let status = ExecutionStatus::parse(&record.status).ok_or_else(|| {
            StorageError::InvalidRecord(format!(
                "execution {} has unknown status '{}'",
                record.execution_id, record.status
            ))
        })?;

        let result = match record.result.as_deref() {
            Some(r) => Some(ExecutionResult::parse(r).ok_or_else(|| {
                StorageError::InvalidRecord(format!(
                    "execution {} has unknown result '{}'",
                    record.execution_id, r
                ))
            })?),
            None => None,
        };

        Ok(Execution {
            status,
            result,
            steps: serde_json::from_str(&record.steps)?,
            screenshots: serde_json::from_str(&record.screenshots)?,
            metadata: serde_json::from_str(&record.metadata)?,
            duration: record.duration_ms.map(|d| d.max(0) as u64),
            execution_id: record.execution_id,
            project_id: record.project_id,
            test_case_id: record.test_case_id,
            test_suite_id: record.test_suite_id,
            suite_execution_id: record.suite_execution_id,
            start_time: record.start_time,
            end_time: record.end_time,
            error_message: record.error_message,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// 执行记录查询过滤器
#[derive(Debug, Default, Clone)]
pub struct ExecutionFilter {
    pub project_id: Option<String>,
    pub test_case_id: Option<String>,
    pub suite_execution_id: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
