//! 带指数退避的重试执行器
//!
//! 错误按消息或类型名称分类：任一配置的子串 (不区分大小写) 出现即视为可重试。
//! 不可重试的错误立即返回，不再尝试。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// 默认可重试错误子串
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    "timeout",
    "ETIMEDOUT",
    "ECONNRESET",
    "ECONNREFUSED",
    "ENOTFOUND",
    "network",
    "NetworkError",
    "TimeoutError",
];

/// 可参与重试分类的错误
pub trait ClassifyError: fmt::Display {
    /// 错误类型名称，例如 "TimeoutError"
    fn type_name(&self) -> &str;
}

/// 重试配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryOptions {
    /// 最大尝试次数 (含首次)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// 首次重试前的延迟（毫秒）
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// 延迟上限（毫秒）
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// 退避倍数
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// 可重试错误子串
    #[serde(default = "default_retryable_errors")]
    pub retryable_errors: Vec<String>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_retryable_errors() -> Vec<String> {
    DEFAULT_RETRYABLE_ERRORS.iter().map(|s| s.to_string()).collect()
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            retryable_errors: default_retryable_errors(),
        }
    }
}

impl RetryOptions {
    /// 替换可重试错误子串，保留其余退避参数
    pub fn with_retryable_errors(mut self, errors: &[&str]) -> Self {
        self.retryable_errors = errors.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// 第 `attempt` 次 (从 1 开始) 失败后的等待时间
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// 判断错误是否可重试
    pub fn is_retryable<E: ClassifyError + ?Sized>(&self, error: &E) -> bool {
        let message = error.to_string().to_lowercase();
        let type_name = error.type_name().to_lowercase();

        self.retryable_errors.iter().any(|pattern| {
            let pattern = pattern.to_lowercase();
            message.contains(&pattern) || type_name.contains(&pattern)
        })
    }
}

/// 不抛出错误的重试结果
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: std::result::Result<T, E>,
    /// 实际尝试次数
    pub attempts: u32,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> std::result::Result<T, E> {
        self.result
    }
}

/// 重试执行，耗尽次数或遇到不可重试错误时返回最后一个错误
pub async fn retry<T, E, F, Fut>(operation: F, options: &RetryOptions) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: ClassifyError,
{
    retry_safe(operation, options).await.result
}

/// 重试执行，返回结果和尝试次数
pub async fn retry_safe<T, E, F, Fut>(mut operation: F, options: &RetryOptions) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: ClassifyError,
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("第 {} 次尝试成功", attempt);
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(error) => {
                if !options.is_retryable(&error) {
                    debug!("不可重试的错误 ({}): {}", error.type_name(), error);
                    return RetryOutcome {
                        result: Err(error),
                        attempts: attempt,
                    };
                }

                if attempt >= max_attempts {
                    warn!("已达最大尝试次数 {}: {}", max_attempts, error);
                    return RetryOutcome {
                        result: Err(error),
                        attempts: attempt,
                    };
                }

                let delay = options.delay_for_attempt(attempt);
                warn!(
                    "第 {}/{} 次尝试失败: {}，将在 {:?} 后重试",
                    attempt, max_attempts, error, delay
                );
                sleep(delay).await;
            }
        }
    }
}

/// 持有固定配置的重试策略
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    options: RetryOptions,
}

impl RetryPolicy {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    pub async fn run<T, E, F, Fut>(&self, operation: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: ClassifyError,
    {
        retry(operation, &self.options).await
    }

    pub async fn run_safe<T, E, F, Fut>(&self, operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: ClassifyError,
    {
        retry_safe(operation, &self.options).await
    }

    /// 包装一个异步函数，返回带重试能力的版本
    pub fn wrap<F>(&self, f: F) -> RetryingFn<F> {
        RetryingFn {
            f,
            options: self.options.clone(),
        }
    }
}

/// [`RetryPolicy::wrap`] 的返回值
pub struct RetryingFn<F> {
    f: F,
    options: RetryOptions,
}

impl<F> RetryingFn<F> {
    pub async fn call<A, T, E, Fut>(&self, arg: A) -> std::result::Result<T, E>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: ClassifyError,
    {
        retry(|| (self.f)(arg.clone()), &self.options).await
    }
}
