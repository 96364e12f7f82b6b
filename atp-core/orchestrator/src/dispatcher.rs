//! 任务调度器
//!
//! 每次处理一条任务消息：检查时间预算，执行用例，持久化结果，
//! 然后尽力发布事件、检测失败模式、更新套件汇总。

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use atp_common::{Execution, ExecutionResult, ExecutionStatus, TaskMessage};
use atp_executor::{CaseRequest, TestCaseExecutor};
use atp_storage::ExecutionStore;

use crate::budget::TimeBudget;
use crate::config::DispatcherConfig;
use crate::detector::{generate_critical_alert, FailureDetector};
use crate::error::{DispatchError, Result};
use crate::events::{completion_event, EventSink};
use crate::suite::SuiteAggregator;

/// 超时类错误信息前缀
pub const TIMEOUT_MARKER: &str = "Execution timeout: ";

const TIMEOUT_KEYWORDS: &[&str] = &["time remaining", "timeout", "timed out"];

/// 单条任务的处理结果
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub execution_id: String,
    pub result: ExecutionResult,
    pub success: bool,
    /// 完成事件 ID (发布失败时为空)
    pub event_id: Option<String>,
}

/// 任务调度器
pub struct Dispatcher {
    store: Arc<dyn ExecutionStore>,
    executor: TestCaseExecutor,
    events: Arc<dyn EventSink>,
    detector: FailureDetector,
    aggregator: SuiteAggregator,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        executor: TestCaseExecutor,
        events: Arc<dyn EventSink>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            detector: FailureDetector::new(Arc::clone(&store), &config),
            aggregator: SuiteAggregator::new(Arc::clone(&store)),
            store,
            executor,
            events,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// 处理一条任务消息
    ///
    /// 消息解析失败时直接返回，不修改任何记录。其他错误会先把执行记录标记为 error，
    /// 再把原始错误返回给投递层。
    pub async fn handle(&self, body: &str, budget: &dyn TimeBudget) -> Result<DispatchReport> {
        let task = TaskMessage::from_json_str(body)
            .map_err(|e| DispatchError::MalformedTask(e.to_string()))?;

        info!(
            "收到任务: execution={}, test_case={}",
            task.execution_id,
            task.resolved_test_case_id()
        );

        match self.process(&task, budget).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!("任务 {} 处理失败: {}", task.execution_id, e);
                self.record_failure(&task.execution_id, &e, budget).await;
                Err(e)
            }
        }
    }

    async fn process(&self, task: &TaskMessage, budget: &dyn TimeBudget) -> Result<DispatchReport> {
        self.store
            .update_status(&task.execution_id, ExecutionStatus::Running)
            .await?;

        let remaining_ms = budget.remaining_ms();
        let required_ms = self.config.required_ms();
        if remaining_ms < required_ms {
            return Err(DispatchError::InsufficientTime {
                remaining_ms,
                required_ms,
            });
        }

        let outcome = self
            .executor
            .execute_test_case(&CaseRequest::from_task(task))
            .await;
        let execution = outcome.execution;

        self.store.update_results(&execution).await?;

        let event_id = self.after_execution(&execution).await;
        let result = execution.result.unwrap_or(ExecutionResult::Error);

        info!(
            "任务完成: execution={}, result={}",
            execution.execution_id, result
        );

        Ok(DispatchReport {
            execution_id: execution.execution_id,
            result,
            success: outcome.success,
            event_id,
        })
    }

    /// 把执行记录标记为 error，写入失败只记录日志
    async fn record_failure(&self, execution_id: &str, cause: &DispatchError, budget: &dyn TimeBudget) {
        let mut execution = match self.store.get(execution_id).await {
            Ok(Some(execution)) => execution,
            Ok(None) => {
                warn!("执行记录 {} 不存在，无法记录失败", execution_id);
                return;
            }
            Err(e) => {
                warn!("读取执行记录 {} 失败: {}", execution_id, e);
                return;
            }
        };

        let now = Utc::now();
        execution.status = ExecutionStatus::Error;
        execution.result = Some(ExecutionResult::Error);
        execution.end_time = Some(now);
        execution.duration = Some((now - execution.start_time).num_milliseconds().max(0) as u64);
        execution.error_message = Some(self.failure_message(cause, budget));
        execution.updated_at = now;

        if let Err(e) = self.store.update_results(&execution).await {
            warn!("记录执行 {} 的失败状态时出错: {}", execution_id, e);
        }

        self.after_execution(&execution).await;
    }

    /// 错误信息，超时类错误或剩余时间过少时加上超时前缀
    fn failure_message(&self, cause: &DispatchError, budget: &dyn TimeBudget) -> String {
        let message = cause.to_string();
        let lowered = message.to_lowercase();
        let timed_out = TIMEOUT_KEYWORDS.iter().any(|k| lowered.contains(k))
            || budget.remaining_ms() < self.config.timeout_marker_ms;

        if timed_out {
            format!("{}{}", TIMEOUT_MARKER, message)
        } else {
            message
        }
    }

    /// 发布完成事件，检测失败模式，更新套件汇总，返回完成事件 ID
    async fn after_execution(&self, execution: &Execution) -> Option<String> {
        let event_id = self.events.publish(&completion_event(execution)).await;
        if event_id.is_none() {
            warn!("执行 {} 的完成事件发布失败", execution.execution_id);
        }

        if let Some(test_case_id) = &execution.test_case_id {
            match self
                .detector
                .detect_consecutive_failures(test_case_id, self.config.consecutive_failure_window)
                .await
            {
                Ok(Some(alert)) => {
                    let event = generate_critical_alert(
                        &alert,
                        &execution.project_id,
                        &execution.metadata.triggered_by,
                    );
                    self.events.publish(&event).await;
                }
                Ok(None) => {}
                Err(e) => warn!("连续失败检测出错: {}", e),
            }
        }

        if let Some(suite_execution_id) = &execution.suite_execution_id {
            match self.detector.detect_suite_failure_rate(suite_execution_id).await {
                Ok(Some(alert)) => {
                    let event = generate_critical_alert(
                        &alert,
                        &execution.project_id,
                        &execution.metadata.triggered_by,
                    );
                    self.events.publish(&event).await;
                }
                Ok(None) => {}
                Err(e) => warn!("套件失败率检测出错: {}", e),
            }

            if let Err(e) = self.aggregator.update_suite_execution(suite_execution_id).await {
                warn!("更新套件 {} 失败: {}", suite_execution_id, e);
            }
        }

        event_id
    }
}
