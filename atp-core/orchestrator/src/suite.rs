//! 套件结果汇总
//!
//! 每次用例完成后从全部用例执行重新计算套件记录，直接覆盖写入。

use std::sync::Arc;
use tracing::{debug, info};

use atp_common::{Execution, ExecutionResult, ExecutionStatus, SuiteAggregate};
use atp_storage::{ExecutionStore, Result, StorageError};

/// 按结果统计用例执行
pub fn calculate_aggregate(cases: &[Execution]) -> SuiteAggregate {
    let mut aggregate = SuiteAggregate {
        total: cases.len(),
        ..Default::default()
    };

    for case in cases {
        match case.result {
            Some(ExecutionResult::Pass) => aggregate.passed += 1,
            Some(ExecutionResult::Fail) => aggregate.failed += 1,
            Some(ExecutionResult::Error) => aggregate.errors += 1,
            None => {}
        }
    }

    aggregate
}

/// 计算套件状态
///
/// 没有用例为 queued；任一用例未结束为 running；全部 error 为 error；否则 completed。
pub fn determine_suite_status(cases: &[Execution]) -> ExecutionStatus {
    if cases.is_empty() {
        return ExecutionStatus::Queued;
    }

    if cases.iter().any(|c| !c.status.is_terminal()) {
        return ExecutionStatus::Running;
    }

    if cases.iter().all(|c| c.status == ExecutionStatus::Error) {
        ExecutionStatus::Error
    } else {
        ExecutionStatus::Completed
    }
}

/// 终态套件的结果
pub fn determine_suite_result(
    status: ExecutionStatus,
    aggregate: &SuiteAggregate,
) -> Option<ExecutionResult> {
    match status {
        ExecutionStatus::Error => Some(ExecutionResult::Error),
        ExecutionStatus::Completed if aggregate.failed > 0 || aggregate.errors > 0 => {
            Some(ExecutionResult::Fail)
        }
        ExecutionStatus::Completed => Some(ExecutionResult::Pass),
        ExecutionStatus::Queued | ExecutionStatus::Running => None,
    }
}

/// 套件汇总器
#[derive(Clone)]
pub struct SuiteAggregator {
    store: Arc<dyn ExecutionStore>,
}

impl SuiteAggregator {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    /// 重新计算并写入套件记录
    ///
    /// 套件下没有用例时不做任何修改，返回 `None`。
    pub async fn update_suite_execution(&self, suite_execution_id: &str) -> Result<Option<Execution>> {
        let cases = self.store.query_by_suite(suite_execution_id).await?;
        if cases.is_empty() {
            debug!("套件 {} 暂无用例执行", suite_execution_id);
            return Ok(None);
        }

        let mut suite = self
            .store
            .get(suite_execution_id)
            .await?
            .ok_or_else(|| {
                StorageError::NotFound(format!("Suite execution {} not found", suite_execution_id))
            })?;

        let aggregate = calculate_aggregate(&cases);
        let status = determine_suite_status(&cases);

        suite.status = status;
        suite.result = determine_suite_result(status, &aggregate);
        suite.metadata.aggregate = Some(aggregate);

        if status.is_terminal() {
            let end = cases
                .iter()
                .filter_map(|c| c.end_time)
                .max()
                .unwrap_or_else(chrono::Utc::now);
            suite.end_time = Some(end);
            suite.duration = Some((end - suite.start_time).num_milliseconds().max(0) as u64);
        } else {
            suite.end_time = None;
            suite.duration = None;
        }

        self.store.update_results(&suite).await?;

        info!(
            "套件 {} 已更新: status={}, total={}, passed={}, failed={}, errors={}",
            suite_execution_id,
            status,
            aggregate.total,
            aggregate.passed,
            aggregate.failed,
            aggregate.errors
        );

        Ok(Some(suite))
    }
}
