//! 事件与告警

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TestCompletion,
    TestFailure,
    CriticalAlert,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TestCompletion => "test_completion",
            EventType::TestFailure => "test_failure",
            EventType::CriticalAlert => "critical_alert",
        }
    }
}

/// 发布到事件总线的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: EventType,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

/// 告警类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ConsecutiveFailures,
    SuiteFailureThreshold,
}

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
}

/// 告警详情
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDetails {
    /// 失败率（百分比，四舍五入）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_rate: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_failures: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_tests: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// 严重告警
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalAlert {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub reason: String,
    pub details: AlertDetails,
    pub timestamp: DateTime<Utc>,
}

impl CriticalAlert {
    pub fn new(alert_type: AlertType, reason: impl Into<String>, details: AlertDetails) -> Self {
        Self {
            alert_type,
            severity: AlertSeverity::Critical,
            reason: reason.into(),
            details,
            timestamp: Utc::now(),
        }
    }
}
