//! 调度器配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 调度器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// 固定预留时间（毫秒）
    #[serde(default = "default_time_buffer_ms")]
    pub time_buffer_ms: u64,

    /// 最小工作窗口（毫秒）
    #[serde(default = "default_min_work_window_ms")]
    pub min_work_window_ms: u64,

    /// 剩余时间低于该值时，错误信息标记为超时（毫秒）
    #[serde(default = "default_timeout_marker_ms")]
    pub timeout_marker_ms: u64,

    /// 套件失败率检查前的等待时间（毫秒）
    #[serde(default = "default_suite_settle_delay_ms")]
    pub suite_settle_delay_ms: u64,

    /// 连续失败检测窗口
    #[serde(default = "default_consecutive_failure_window")]
    pub consecutive_failure_window: usize,

    /// 套件失败率告警阈值（百分比，严格大于）
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: u32,
}

fn default_time_buffer_ms() -> u64 {
    30_000
}

fn default_min_work_window_ms() -> u64 {
    60_000
}

fn default_timeout_marker_ms() -> u64 {
    5_000
}

fn default_suite_settle_delay_ms() -> u64 {
    2_000
}

fn default_consecutive_failure_window() -> usize {
    3
}

fn default_failure_rate_threshold() -> u32 {
    50
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            time_buffer_ms: default_time_buffer_ms(),
            min_work_window_ms: default_min_work_window_ms(),
            timeout_marker_ms: default_timeout_marker_ms(),
            suite_settle_delay_ms: default_suite_settle_delay_ms(),
            consecutive_failure_window: default_consecutive_failure_window(),
            failure_rate_threshold: default_failure_rate_threshold(),
        }
    }
}

impl DispatcherConfig {
    /// 开始执行前需要的最少剩余时间
    pub fn required_ms(&self) -> u64 {
        self.time_buffer_ms + self.min_work_window_ms
    }

    pub fn suite_settle_delay(&self) -> Duration {
        Duration::from_millis(self.suite_settle_delay_ms)
    }
}
