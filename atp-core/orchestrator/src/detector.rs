//! 失败模式检测
//!
//! 连续失败: 用例最近 N 次执行全部失败。
//! 套件失败率: 套件中失败或出错的用例比例超过阈值。

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use atp_common::{AlertDetails, AlertType, CriticalAlert, Event, EventType};
use atp_storage::{ExecutionStore, Result};

use crate::config::DispatcherConfig;
use crate::events::new_event;

/// 失败检测器
#[derive(Clone)]
pub struct FailureDetector {
    store: Arc<dyn ExecutionStore>,
    failure_rate_threshold: u32,
    settle_delay: Duration,
}

impl FailureDetector {
    pub fn new(store: Arc<dyn ExecutionStore>, config: &DispatcherConfig) -> Self {
        Self {
            store,
            failure_rate_threshold: config.failure_rate_threshold,
            settle_delay: config.suite_settle_delay(),
        }
    }

    /// 检测用例最近 `window_size` 次执行是否全部失败
    pub async fn detect_consecutive_failures(
        &self,
        test_case_id: &str,
        window_size: usize,
    ) -> Result<Option<CriticalAlert>> {
        let recent = self
            .store
            .query_by_test_case(test_case_id, window_size)
            .await?;

        if window_size == 0 || recent.len() < window_size {
            debug!(
                "用例 {} 执行次数不足 ({}/{})",
                test_case_id,
                recent.len(),
                window_size
            );
            return Ok(None);
        }

        if !recent.iter().all(|e| e.is_failure()) {
            return Ok(None);
        }

        let latest = &recent[0];
        warn!("用例 {} 连续失败 {} 次", test_case_id, window_size);

        Ok(Some(CriticalAlert::new(
            AlertType::ConsecutiveFailures,
            format!(
                "Test case {} failed {} consecutive times",
                test_case_id, window_size
            ),
            AlertDetails {
                consecutive_failures: Some(window_size),
                last_failure: Some(latest.finished_or_created_at()),
                error_message: latest.error_message.clone(),
                ..Default::default()
            },
        )))
    }

    /// 检测套件失败率是否超过阈值
    ///
    /// 先等待一段时间，让并发完成的用例结果落库。
    pub async fn detect_suite_failure_rate(
        &self,
        suite_execution_id: &str,
    ) -> Result<Option<CriticalAlert>> {
        if !self.settle_delay.is_zero() {
            sleep(self.settle_delay).await;
        }

        let cases = self.store.query_by_suite(suite_execution_id).await?;
        if cases.is_empty() {
            return Ok(None);
        }

        let failed: Vec<_> = cases.iter().filter(|e| e.is_failure()).collect();
        let rate = failed.len() as f64 * 100.0 / cases.len() as f64;

        if rate <= self.failure_rate_threshold as f64 {
            debug!("套件 {} 失败率 {:.1}%", suite_execution_id, rate);
            return Ok(None);
        }

        let rounded = rate.round() as u32;
        warn!(
            "套件 {} 失败率 {}% 超过阈值 {}%",
            suite_execution_id, rounded, self.failure_rate_threshold
        );

        let affected_tests = failed
            .iter()
            .filter_map(|e| e.test_case_id.clone())
            .collect();
        let last_failure = cases.iter().map(|e| e.finished_or_created_at()).max();

        Ok(Some(CriticalAlert::new(
            AlertType::SuiteFailureThreshold,
            format!(
                "Suite {} failure rate {}% exceeds {}%",
                suite_execution_id, rounded, self.failure_rate_threshold
            ),
            AlertDetails {
                failure_rate: Some(rounded),
                affected_tests: Some(affected_tests),
                last_failure,
                ..Default::default()
            },
        )))
    }
}

/// 把告警包装为 critical_alert 事件
pub fn generate_critical_alert(alert: &CriticalAlert, project_id: &str, triggered_by: &str) -> Event {
    new_event(
        EventType::CriticalAlert,
        json!({
            "projectId": project_id,
            "triggeredBy": triggered_by,
            "alertType": alert.alert_type,
            "severity": alert.severity,
            "reason": alert.reason,
            "details": alert.details,
            "timestamp": alert.timestamp,
            "status": "error",
            "result": "error",
        }),
    )
}
