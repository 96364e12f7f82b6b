//! 步骤执行器

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use atp_common::{ActionKind, StepResult, StepStatus, TestStep};

use crate::action::{AssertionKind, StepAction};
use crate::context::ExecutionContext;
use crate::driver::{UiDriver, WaitOptions};
use crate::error::StepError;
use crate::http::{HttpClient, HttpRequest};
use crate::retry::{retry_safe, RetryOptions};
use crate::screenshot::ScreenshotStore;

/// 默认元素等待超时
const DEFAULT_ELEMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// 步骤执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Pass {
        details: Map<String, Value>,
    },
    Fail {
        reason: String,
        details: Map<String, Value>,
    },
    Error {
        reason: String,
        details: Map<String, Value>,
    },
}

impl StepOutcome {
    fn fail(reason: impl Into<String>) -> Self {
        StepOutcome::Fail {
            reason: reason.into(),
            details: Map::new(),
        }
    }

    fn error(reason: impl Into<String>) -> Self {
        StepOutcome::Error {
            reason: reason.into(),
            details: Map::new(),
        }
    }

    pub fn status(&self) -> StepStatus {
        match self {
            StepOutcome::Pass { .. } => StepStatus::Pass,
            StepOutcome::Fail { .. } => StepStatus::Fail,
            StepOutcome::Error { .. } => StepStatus::Error,
        }
    }
}

fn details(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// 步骤执行器
///
/// 不保存任何执行状态，执行相关信息通过 [`ExecutionContext`] 传入。
pub struct StepExecutor {
    http: Arc<dyn HttpClient>,
    screenshots: Arc<dyn ScreenshotStore>,
    retry: RetryOptions,
    element_timeout: Duration,
}

impl StepExecutor {
    pub fn new(http: Arc<dyn HttpClient>, screenshots: Arc<dyn ScreenshotStore>) -> Self {
        Self {
            http,
            screenshots,
            retry: RetryOptions::default(),
            element_timeout: DEFAULT_ELEMENT_TIMEOUT,
        }
    }

    /// 设置退避参数 (可重试错误词表由动作决定)
    pub fn with_retry_options(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_element_timeout(mut self, timeout: Duration) -> Self {
        self.element_timeout = timeout;
        self
    }

    /// 执行单个步骤，任何失败都体现在返回的步骤结果中
    pub async fn execute_step(
        &self,
        ctx: &ExecutionContext,
        driver: Option<&dyn UiDriver>,
        step: &TestStep,
        step_index: usize,
    ) -> StepResult {
        let start = Instant::now();
        debug!(
            "执行步骤 {} ({}): execution={}",
            step_index, step.action, ctx.execution_id
        );

        let outcome = self.run(driver, step).await;

        let mut result = StepResult::new(step_index, step.action.clone(), outcome.status());
        match outcome {
            StepOutcome::Pass { details } => {
                result.details = details;
            }
            StepOutcome::Fail { reason, details } => {
                warn!("步骤 {} 失败: {}", step_index, reason);
                result.error_message = Some(reason);
                result.details = details;

                if step.action.requires_driver() {
                    if let Some(driver) = driver {
                        result.screenshot = self.capture_failure(ctx, driver, step_index).await;
                    }
                }
            }
            StepOutcome::Error { reason, details } => {
                warn!("步骤 {} 出错: {}", step_index, reason);
                result.error_message = Some(reason);
                result.details = details;
            }
        }

        result.duration = start.elapsed().as_millis() as u64;
        result
    }

    async fn run(&self, driver: Option<&dyn UiDriver>, step: &TestStep) -> StepOutcome {
        if let ActionKind::Unknown(name) = &step.action {
            return StepOutcome::error(format!("Unknown action type: {}", name));
        }

        if step.action.requires_driver() && driver.is_none() {
            return StepOutcome::error(format!("UI driver required for '{}' step", step.action));
        }

        let action = match StepAction::from_step(step) {
            Ok(action) => action,
            Err(reason) => return StepOutcome::fail(reason),
        };

        let options = self
            .retry
            .clone()
            .with_retryable_errors(action.retryable_errors());

        match (action, driver) {
            (StepAction::Navigate { url }, Some(driver)) => {
                self.navigate(driver, &url, &options).await
            }
            (StepAction::Click { selector }, Some(driver)) => {
                self.click(driver, &selector, &options).await
            }
            (StepAction::Type { selector, text }, Some(driver)) => {
                self.type_text(driver, &selector, &text, &options).await
            }
            (
                StepAction::Assert {
                    selector,
                    assertion,
                },
                Some(driver),
            ) => self.assert(driver, &selector, &assertion, &options).await,
            (StepAction::Wait { duration }, _) => {
                sleep(duration).await;
                StepOutcome::Pass {
                    details: details(json!({ "durationMs": duration.as_millis() as u64 })),
                }
            }
            (StepAction::ApiCall { request }, _) => self.api_call(request, &options).await,
            (StepAction::Unknown { name }, _) => {
                StepOutcome::error(format!("Unknown action type: {}", name))
            }
            (_, None) => {
                StepOutcome::error(format!("UI driver required for '{}' step", step.action))
            }
        }
    }

    async fn navigate(
        &self,
        driver: &dyn UiDriver,
        url: &str,
        options: &RetryOptions,
    ) -> StepOutcome {
        let outcome = retry_safe(
            || async move { driver.navigate(url).await.map_err(StepError::from) },
            options,
        )
        .await;

        let info = json!({ "url": url, "attempts": outcome.attempts });
        match outcome.result {
            Ok(()) => StepOutcome::Pass {
                details: details(info),
            },
            Err(e) => StepOutcome::Fail {
                reason: e.to_string(),
                details: details(info),
            },
        }
    }

    async fn click(
        &self,
        driver: &dyn UiDriver,
        selector: &str,
        options: &RetryOptions,
    ) -> StepOutcome {
        let wait = WaitOptions::visible(self.element_timeout);
        let outcome = retry_safe(
            || async move {
                driver.wait_for_selector(selector, wait).await?;
                driver.click(selector).await.map_err(StepError::from)
            },
            options,
        )
        .await;

        let info = json!({ "selector": selector, "attempts": outcome.attempts });
        match outcome.result {
            Ok(()) => StepOutcome::Pass {
                details: details(info),
            },
            Err(e) => StepOutcome::Fail {
                reason: e.to_string(),
                details: details(info),
            },
        }
    }

    async fn type_text(
        &self,
        driver: &dyn UiDriver,
        selector: &str,
        text: &str,
        options: &RetryOptions,
    ) -> StepOutcome {
        let wait = WaitOptions::visible(self.element_timeout);
        let outcome = retry_safe(
            || async move {
                driver.wait_for_selector(selector, wait).await?;
                driver.fill(selector, text).await.map_err(StepError::from)
            },
            options,
        )
        .await;

        let info = json!({
            "selector": selector,
            "length": text.chars().count(),
            "attempts": outcome.attempts,
        });
        match outcome.result {
            Ok(()) => StepOutcome::Pass {
                details: details(info),
            },
            Err(e) => StepOutcome::Fail {
                reason: e.to_string(),
                details: details(info),
            },
        }
    }

    async fn assert(
        &self,
        driver: &dyn UiDriver,
        selector: &str,
        assertion: &AssertionKind,
        options: &RetryOptions,
    ) -> StepOutcome {
        let wait = match assertion {
            AssertionKind::Visible => WaitOptions::visible(self.element_timeout),
            _ => WaitOptions::attached(self.element_timeout),
        };

        let outcome = retry_safe(
            || async move {
                let element = driver.wait_for_selector(selector, wait).await?;
                match assertion {
                    AssertionKind::Visible => {
                        if element.is_visible().await? {
                            Ok(())
                        } else {
                            Err(StepError::Assertion(format!(
                                "Expected element {} to be visible",
                                selector
                            )))
                        }
                    }
                    AssertionKind::Text(expected) => {
                        let actual = element.text_content().await?.unwrap_or_default();
                        if &actual == expected {
                            Ok(())
                        } else {
                            Err(StepError::Assertion(format!(
                                "Expected text \"{}\" but found \"{}\"",
                                expected, actual
                            )))
                        }
                    }
                    AssertionKind::Value(expected) => {
                        let actual = element.input_value().await?;
                        if &actual == expected {
                            Ok(())
                        } else {
                            Err(StepError::Assertion(format!(
                                "Expected value \"{}\" but found \"{}\"",
                                expected, actual
                            )))
                        }
                    }
                }
            },
            options,
        )
        .await;

        let info = json!({
            "selector": selector,
            "assertion": assertion.name(),
            "attempts": outcome.attempts,
        });
        match outcome.result {
            Ok(()) => StepOutcome::Pass {
                details: details(info),
            },
            Err(e) => StepOutcome::Fail {
                reason: e.to_string(),
                details: details(info),
            },
        }
    }

    async fn api_call(&self, request: HttpRequest, options: &RetryOptions) -> StepOutcome {
        let method = request.method.clone();
        let url = request.url.clone();
        let http = &self.http;
        let request = &request;

        let outcome = retry_safe(
            || async move { http.request(request.clone()).await.map_err(StepError::from) },
            options,
        )
        .await;

        match outcome.result {
            Ok(response) => {
                let info = details(json!({
                    "method": method,
                    "url": url,
                    "status": response.status,
                    "statusText": response.status_text,
                    "attempts": outcome.attempts,
                }));

                if response.is_success() {
                    info!("API 调用成功: {} {} -> {}", method, url, response.status);
                    StepOutcome::Pass { details: info }
                } else {
                    StepOutcome::Fail {
                        reason: format!("HTTP {}: {}", response.status, response.status_text),
                        details: info,
                    }
                }
            }
            Err(e) => StepOutcome::Error {
                reason: e.to_string(),
                details: details(json!({
                    "method": method,
                    "url": url,
                    "attempts": outcome.attempts,
                })),
            },
        }
    }

    /// 截取失败截图，截图失败只记录日志
    async fn capture_failure(
        &self,
        ctx: &ExecutionContext,
        driver: &dyn UiDriver,
        step_index: usize,
    ) -> Option<String> {
        let data = match driver.screenshot().await {
            Ok(data) => data,
            Err(e) => {
                warn!("步骤 {} 截图失败: {}", step_index, e);
                return None;
            }
        };

        match self.screenshots.save(ctx, step_index, &data).await {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!("步骤 {} 截图保存失败: {}", step_index, e);
                None
            }
        }
    }
}
