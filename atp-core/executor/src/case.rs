//! 测试用例执行器

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use atp_common::{
    Execution, ExecutionMetadata, ExecutionResult, ExecutionStatus, StepResult, StepStatus,
    TaskMessage, TestCase,
};

use crate::context::ExecutionContext;
use crate::driver::{DriverProvider, DriverSession};
use crate::step::StepExecutor;

/// 用例执行请求
#[derive(Debug, Clone)]
pub struct CaseRequest {
    pub execution_id: String,
    pub project_id: String,
    pub test_case: TestCase,
    pub test_case_id: Option<String>,
    pub test_suite_id: Option<String>,
    pub suite_execution_id: Option<String>,
    pub triggered_by: String,
    pub environment: Option<String>,
}

impl CaseRequest {
    pub fn from_task(task: &TaskMessage) -> Self {
        Self {
            execution_id: task.execution_id.clone(),
            project_id: task.project_id.clone(),
            test_case: task.test_case.clone(),
            test_case_id: Some(task.resolved_test_case_id()),
            test_suite_id: task.resolved_test_suite_id(),
            suite_execution_id: task.suite_execution_id.clone(),
            triggered_by: task.metadata.triggered_by.clone(),
            environment: task.metadata.environment.clone(),
        }
    }
}

/// 用例执行结果
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub execution: Execution,
    /// result == pass
    pub success: bool,
}

/// 根据步骤状态计算用例结果: error > fail > pass，没有步骤视为 error
pub fn determine_case_result(steps: &[StepResult]) -> ExecutionResult {
    if steps.is_empty() {
        return ExecutionResult::Error;
    }
    if steps.iter().any(|s| s.status == StepStatus::Error) {
        ExecutionResult::Error
    } else if steps.iter().any(|s| s.status == StepStatus::Fail) {
        ExecutionResult::Fail
    } else {
        ExecutionResult::Pass
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 测试用例执行器
pub struct TestCaseExecutor {
    steps: StepExecutor,
    drivers: Arc<dyn DriverProvider>,
}

impl TestCaseExecutor {
    pub fn new(steps: StepExecutor, drivers: Arc<dyn DriverProvider>) -> Self {
        Self { steps, drivers }
    }

    /// 执行测试用例
    ///
    /// 步骤按顺序执行，遇到第一个非 pass 步骤即停止。
    pub async fn execute_test_case(&self, request: &CaseRequest) -> CaseOutcome {
        let ctx = ExecutionContext::new(&request.execution_id, &request.project_id);
        let mut execution = new_execution(request);

        info!(
            "开始执行用例: {} ({}), execution={}",
            request.test_case.name,
            request.test_case.steps.len(),
            request.execution_id
        );

        let session = if request.test_case.requires_driver() {
            match DriverSession::acquire(self.drivers.as_ref()).await {
                Ok(session) => Some(session),
                Err(e) => {
                    error!("UI 驱动启动失败: {}", e);
                    let end = Utc::now();
                    execution.status = ExecutionStatus::Error;
                    execution.result = Some(ExecutionResult::Error);
                    execution.error_message = Some(e.to_string());
                    execution.end_time = Some(end);
                    execution.duration = Some(elapsed_ms(&execution, end));
                    execution.updated_at = end;
                    return CaseOutcome {
                        execution,
                        success: false,
                    };
                }
            }
        } else {
            None
        };

        let driver = session.as_ref().map(|s| s.driver());
        if let Some(driver) = driver {
            execution.metadata.driver_version = driver.version();
        }

        let mut results: Vec<StepResult> = Vec::new();
        for (index, step) in request.test_case.steps.iter().enumerate() {
            let result = match AssertUnwindSafe(self.steps.execute_step(&ctx, driver, step, index))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("步骤 {} 执行时发生 panic: {}", index, message);
                    let mut result = StepResult::new(index, step.action.clone(), StepStatus::Error);
                    result.error_message = Some(format!("Step handler panicked: {}", message));
                    result
                }
            };

            let halt = !result.is_pass();
            results.push(result);
            if halt {
                warn!("步骤 {} 未通过，停止执行剩余步骤", index);
                break;
            }
        }

        if let Some(session) = session {
            session.release().await;
        }

        let result = determine_case_result(&results);
        let end = Utc::now();

        execution.status = ExecutionStatus::Completed;
        execution.result = Some(result);
        execution.error_message = if results.is_empty() {
            Some("No steps were executed".to_string())
        } else {
            results
                .iter()
                .find(|r| !r.is_pass())
                .and_then(|r| r.error_message.clone())
        };
        execution.screenshots = results
            .iter()
            .filter_map(|r| r.screenshot.clone())
            .collect();
        execution.steps = results;
        execution.end_time = Some(end);
        execution.duration = Some(elapsed_ms(&execution, end));
        execution.updated_at = end;

        info!(
            "用例执行完成: execution={}, result={}, steps={}",
            execution.execution_id,
            result,
            execution.steps.len()
        );

        CaseOutcome {
            success: result == ExecutionResult::Pass,
            execution,
        }
    }
}

fn new_execution(request: &CaseRequest) -> Execution {
    let mut metadata = ExecutionMetadata::new(&request.triggered_by);
    metadata.environment = request.environment.clone();

    let mut execution = Execution::queued(&request.execution_id, &request.project_id, metadata);
    execution.status = ExecutionStatus::Running;
    execution.test_case_id = request
        .test_case_id
        .clone()
        .or_else(|| Some(request.test_case.test_case_id.clone()));
    execution.test_suite_id = request
        .test_suite_id
        .clone()
        .or_else(|| request.test_case.test_suite_id.clone());
    execution.suite_execution_id = request.suite_execution_id.clone();
    execution
}

fn elapsed_ms(execution: &Execution, end: chrono::DateTime<Utc>) -> u64 {
    (end - execution.start_time).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use atp_common::ActionKind;

    fn step(status: StepStatus) -> StepResult {
        StepResult::new(0, ActionKind::Wait, status)
    }

    #[test]
    fn test_result_precedence() {
        assert_eq!(determine_case_result(&[]), ExecutionResult::Error);
        assert_eq!(
            determine_case_result(&[step(StepStatus::Pass), step(StepStatus::Pass)]),
            ExecutionResult::Pass
        );
        assert_eq!(
            determine_case_result(&[step(StepStatus::Pass), step(StepStatus::Fail)]),
            ExecutionResult::Fail
        );
        assert_eq!(
            determine_case_result(&[step(StepStatus::Fail), step(StepStatus::Error)]),
            ExecutionResult::Error
        );
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(payload.as_ref()), "kaboom");

        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
