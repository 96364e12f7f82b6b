//! Executor 模块测试

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use atp_common::{ActionKind, ExecutionResult, ExecutionStatus, StepStatus, TestCase, TestStep};
use atp_executor::*;

// ========== 测试替身 ==========

#[derive(Clone)]
struct FakeElement {
    visible: bool,
    text: Option<String>,
    value: String,
}

#[async_trait]
impl ElementHandle for FakeElement {
    async fn is_visible(&self) -> std::result::Result<bool, DriverError> {
        Ok(self.visible)
    }

    async fn text_content(&self) -> std::result::Result<Option<String>, DriverError> {
        Ok(self.text.clone())
    }

    async fn input_value(&self) -> std::result::Result<String, DriverError> {
        Ok(self.value.clone())
    }
}

#[derive(Default)]
struct FakeDriver {
    unreachable: bool,
    elements: HashMap<String, FakeElement>,
    calls: Mutex<Vec<String>>,
    screenshots: AtomicUsize,
    closed: AtomicBool,
}

impl FakeDriver {
    fn with_element(mut self, selector: &str, text: &str) -> Self {
        self.elements.insert(
            selector.to_string(),
            FakeElement {
                visible: true,
                text: Some(text.to_string()),
                value: text.to_string(),
            },
        );
        self
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl UiDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> std::result::Result<(), DriverError> {
        self.record(format!("navigate {}", url));
        if self.unreachable {
            return Err(DriverError::Navigation(format!(
                "net::ERR_CONNECTION_REFUSED at {}",
                url
            )));
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> std::result::Result<(), DriverError> {
        self.record(format!("click {}", selector));
        if selector == "#explode" {
            panic!("driver crashed");
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> std::result::Result<(), DriverError> {
        self.record(format!("fill {} {}", selector, value));
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        _options: WaitOptions,
    ) -> std::result::Result<Box<dyn ElementHandle>, DriverError> {
        self.record(format!("wait {}", selector));
        match self.elements.get(selector) {
            Some(element) => Ok(Box::new(element.clone())),
            None => Err(DriverError::NotFound(selector.to_string())),
        }
    }

    async fn screenshot(&self) -> std::result::Result<Vec<u8>, DriverError> {
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    fn version(&self) -> Option<String> {
        Some("FakeBrowser 1.0".to_string())
    }

    async fn close(&self) -> std::result::Result<(), DriverError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeProvider {
    driver: Arc<FakeDriver>,
    launches: AtomicUsize,
}

impl FakeProvider {
    fn new(driver: FakeDriver) -> Arc<Self> {
        Arc::new(Self {
            driver: Arc::new(driver),
            launches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DriverProvider for FakeProvider {
    async fn launch(&self) -> std::result::Result<Arc<dyn UiDriver>, DriverError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let driver: Arc<dyn UiDriver> = self.driver.clone();
        Ok(driver)
    }
}

struct FakeHttp {
    response: std::result::Result<(u16, &'static str), HttpError>,
    calls: AtomicUsize,
}

impl FakeHttp {
    fn status(status: u16, status_text: &'static str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok((status, status_text)),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(error: HttpError) -> Arc<Self> {
        Arc::new(Self {
            response: Err(error),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn request(&self, _request: HttpRequest) -> std::result::Result<HttpResponse, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Ok((status, text)) => Ok(HttpResponse {
                status: *status,
                status_text: text.to_string(),
                headers: Default::default(),
                data: serde_json::Value::Null,
            }),
            Err(e) => Err(e.clone()),
        }
    }
}

#[derive(Default)]
struct MemoryScreenshots {
    saved: Mutex<Vec<String>>,
}

#[async_trait]
impl ScreenshotStore for MemoryScreenshots {
    async fn save(
        &self,
        ctx: &ExecutionContext,
        step_index: usize,
        _data: &[u8],
    ) -> atp_executor::Result<String> {
        let reference = format!("mem://{}/step-{}.png", ctx.execution_id, step_index);
        self.saved.lock().unwrap().push(reference.clone());
        Ok(reference)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("atp_executor=debug")
        .with_test_writer()
        .try_init();
}

fn step_executor(http: Arc<FakeHttp>, screenshots: Arc<MemoryScreenshots>) -> StepExecutor {
    StepExecutor::new(http, screenshots)
}

fn case_executor(
    http: Arc<FakeHttp>,
    screenshots: Arc<MemoryScreenshots>,
    drivers: Arc<dyn DriverProvider>,
) -> TestCaseExecutor {
    TestCaseExecutor::new(step_executor(http, screenshots), drivers)
}

fn request(steps: Vec<TestStep>) -> CaseRequest {
    CaseRequest {
        execution_id: "exec-1".to_string(),
        project_id: "proj-1".to_string(),
        test_case: TestCase {
            test_case_id: "tc-1".to_string(),
            project_id: "proj-1".to_string(),
            name: "checkout".to_string(),
            description: None,
            steps,
            test_suite_id: None,
            extra: Default::default(),
        },
        test_case_id: None,
        test_suite_id: None,
        suite_execution_id: None,
        triggered_by: "scheduler".to_string(),
        environment: Some("staging".to_string()),
    }
}

fn wait(ms: &str) -> TestStep {
    TestStep::new(ActionKind::Wait).with_value(ms)
}

fn api(url: &str) -> TestStep {
    TestStep::new(ActionKind::ApiCall).with_target(url)
}

// ========== 步骤执行 ==========

#[tokio::test(start_paused = true)]
async fn test_api_call_503_fails_without_retry() {
    let http = FakeHttp::status(503, "Service Unavailable");
    let executor = step_executor(http.clone(), Arc::new(MemoryScreenshots::default()));
    let ctx = ExecutionContext::new("exec-1", "proj-1");

    let result = executor
        .execute_step(&ctx, None, &api("https://api.example.test/health"), 0)
        .await;

    assert_eq!(result.status, StepStatus::Fail);
    assert_eq!(
        result.error_message.as_deref(),
        Some("HTTP 503: Service Unavailable")
    );
    assert_eq!(result.details["status"], 503);
    assert_eq!(result.details["method"], "GET");
    assert_eq!(http.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_api_transport_error_retried_then_error() {
    let http = FakeHttp::failing(HttpError::Network("connect ECONNREFUSED 10.0.0.1:443".into()));
    let executor = step_executor(http.clone(), Arc::new(MemoryScreenshots::default()));
    let ctx = ExecutionContext::new("exec-1", "proj-1");

    let result = executor
        .execute_step(&ctx, None, &api("https://api.example.test/health"), 0)
        .await;

    assert_eq!(result.status, StepStatus::Error);
    assert!(result.error_message.unwrap().contains("ECONNREFUSED"));
    assert_eq!(http.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_ui_step_without_driver_is_error() {
    let executor = step_executor(
        FakeHttp::status(200, "OK"),
        Arc::new(MemoryScreenshots::default()),
    );
    let ctx = ExecutionContext::new("exec-1", "proj-1");
    let step = TestStep::new(ActionKind::Click).with_target("#buy");

    let result = executor.execute_step(&ctx, None, &step, 3).await;

    assert_eq!(result.status, StepStatus::Error);
    assert_eq!(result.step_index, 3);
    assert_eq!(
        result.error_message.as_deref(),
        Some("UI driver required for 'click' step")
    );
}

#[tokio::test(start_paused = true)]
async fn test_unknown_action_is_error() {
    let executor = step_executor(
        FakeHttp::status(200, "OK"),
        Arc::new(MemoryScreenshots::default()),
    );
    let ctx = ExecutionContext::new("exec-1", "proj-1");
    let step = TestStep::new(ActionKind::Unknown("hover".to_string()));

    let result = executor.execute_step(&ctx, None, &step, 0).await;

    assert_eq!(result.status, StepStatus::Error);
    assert!(result.error_message.unwrap().contains("hover"));
}

#[tokio::test(start_paused = true)]
async fn test_wait_records_duration() {
    let executor = step_executor(
        FakeHttp::status(200, "OK"),
        Arc::new(MemoryScreenshots::default()),
    );
    let ctx = ExecutionContext::new("exec-1", "proj-1");

    let result = executor.execute_step(&ctx, None, &wait("250"), 0).await;
    assert_eq!(result.status, StepStatus::Pass);
    assert!(result.duration >= 250);

    let result = executor.execute_step(&ctx, None, &wait("soon"), 1).await;
    assert_eq!(result.status, StepStatus::Fail);
    assert!(result.error_message.unwrap().contains("Invalid wait duration"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_element_retried_with_screenshot() {
    init_tracing();
    let driver = FakeDriver::default();
    let screenshots = Arc::new(MemoryScreenshots::default());
    let executor = step_executor(FakeHttp::status(200, "OK"), screenshots.clone());
    let ctx = ExecutionContext::new("exec-7", "proj-1");
    let step = TestStep::new(ActionKind::Click).with_target("#missing");

    let result = executor.execute_step(&ctx, Some(&driver), &step, 1).await;

    assert_eq!(result.status, StepStatus::Fail);
    assert_eq!(
        result.error_message.as_deref(),
        Some("Element not found: #missing")
    );
    assert_eq!(driver.count("wait #missing"), 3);
    assert_eq!(driver.count("click"), 0);
    assert_eq!(result.screenshot.as_deref(), Some("mem://exec-7/step-1.png"));
}

#[tokio::test(start_paused = true)]
async fn test_assert_text_mismatch_not_retried() {
    let driver = FakeDriver::default().with_element("#title", "Welcome back");
    let executor = step_executor(
        FakeHttp::status(200, "OK"),
        Arc::new(MemoryScreenshots::default()),
    );
    let ctx = ExecutionContext::new("exec-1", "proj-1");
    let step = TestStep::new(ActionKind::Assert)
        .with_target("#title")
        .with_expected("text")
        .with_value("Welcome");

    let result = executor.execute_step(&ctx, Some(&driver), &step, 0).await;

    assert_eq!(result.status, StepStatus::Fail);
    assert!(result
        .error_message
        .unwrap()
        .contains("Expected text \"Welcome\""));
    assert_eq!(driver.count("wait #title"), 1);
    assert_eq!(driver.screenshots.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_type_and_assert_value_pass() {
    let driver = FakeDriver::default().with_element("#email", "alice@example.test");
    let executor = step_executor(
        FakeHttp::status(200, "OK"),
        Arc::new(MemoryScreenshots::default()),
    );
    let ctx = ExecutionContext::new("exec-1", "proj-1");

    let fill = TestStep::new(ActionKind::Type)
        .with_target("#email")
        .with_value("alice@example.test");
    let check = TestStep::new(ActionKind::Assert)
        .with_target("#email")
        .with_expected("value")
        .with_value("alice@example.test");

    assert!(executor
        .execute_step(&ctx, Some(&driver), &fill, 0)
        .await
        .is_pass());
    assert!(executor
        .execute_step(&ctx, Some(&driver), &check, 1)
        .await
        .is_pass());
    assert_eq!(driver.count("fill #email"), 1);
}

// ========== 用例执行 ==========

#[tokio::test(start_paused = true)]
async fn test_unreachable_navigation_halts_case() {
    init_tracing();
    let provider = FakeProvider::new(
        FakeDriver {
            unreachable: true,
            ..Default::default()
        }
        .with_element("#login", "Log in"),
    );
    let screenshots = Arc::new(MemoryScreenshots::default());
    let executor = case_executor(
        FakeHttp::status(200, "OK"),
        screenshots.clone(),
        provider.clone(),
    );

    let outcome = executor
        .execute_test_case(&request(vec![
            TestStep::new(ActionKind::Navigate).with_target("https://unreachable.example.test"),
            TestStep::new(ActionKind::Click).with_target("#login"),
        ]))
        .await;

    let execution = outcome.execution;
    assert!(!outcome.success);
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.result, Some(ExecutionResult::Fail));
    assert_eq!(execution.steps.len(), 1);
    assert!(execution.error_message.unwrap().contains("net::ERR"));
    assert_eq!(provider.driver.count("navigate"), 3);
    assert_eq!(provider.driver.count("click"), 0);
    assert_eq!(provider.driver.screenshots.load(Ordering::SeqCst), 1);
    assert_eq!(execution.screenshots, vec!["mem://exec-1/step-0.png"]);
    assert!(provider.driver.closed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_pass_fail_pass_stops_after_failure() {
    let executor = case_executor(
        FakeHttp::status(404, "Not Found"),
        Arc::new(MemoryScreenshots::default()),
        Arc::new(UnavailableDriverProvider),
    );

    let outcome = executor
        .execute_test_case(&request(vec![
            wait("10"),
            api("https://api.example.test/orders/9"),
            wait("10"),
        ]))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.execution.result, Some(ExecutionResult::Fail));
    assert_eq!(outcome.execution.steps.len(), 2);
    assert_eq!(
        outcome.execution.error_message.as_deref(),
        Some("HTTP 404: Not Found")
    );
}

#[tokio::test(start_paused = true)]
async fn test_pass_then_error_is_error() {
    let executor = case_executor(
        FakeHttp::status(200, "OK"),
        Arc::new(MemoryScreenshots::default()),
        Arc::new(UnavailableDriverProvider),
    );

    let outcome = executor
        .execute_test_case(&request(vec![
            wait("5"),
            TestStep::new(ActionKind::Unknown("drag".to_string())),
        ]))
        .await;

    assert_eq!(outcome.execution.result, Some(ExecutionResult::Error));
    assert_eq!(outcome.execution.status, ExecutionStatus::Completed);
    assert_eq!(outcome.execution.steps.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_zero_steps_is_error() {
    let executor = case_executor(
        FakeHttp::status(200, "OK"),
        Arc::new(MemoryScreenshots::default()),
        Arc::new(UnavailableDriverProvider),
    );

    let outcome = executor.execute_test_case(&request(vec![])).await;

    assert!(!outcome.success);
    assert_eq!(outcome.execution.result, Some(ExecutionResult::Error));
    assert_eq!(
        outcome.execution.error_message.as_deref(),
        Some("No steps were executed")
    );
    assert!(outcome.execution.end_time.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_driver_setup_failure() {
    let executor = case_executor(
        FakeHttp::status(200, "OK"),
        Arc::new(MemoryScreenshots::default()),
        Arc::new(UnavailableDriverProvider),
    );

    let outcome = executor
        .execute_test_case(&request(vec![
            TestStep::new(ActionKind::Navigate).with_target("https://example.test")
        ]))
        .await;

    let execution = outcome.execution;
    assert_eq!(execution.status, ExecutionStatus::Error);
    assert_eq!(execution.result, Some(ExecutionResult::Error));
    assert!(execution.steps.is_empty());
    assert!(execution
        .error_message
        .unwrap()
        .contains("no UI driver configured"));
}

#[tokio::test(start_paused = true)]
async fn test_api_only_case_skips_driver() {
    let provider = FakeProvider::new(FakeDriver::default());
    let executor = case_executor(
        FakeHttp::status(204, "No Content"),
        Arc::new(MemoryScreenshots::default()),
        provider.clone(),
    );

    let outcome = executor
        .execute_test_case(&request(vec![api("https://api.example.test/ping")]))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.execution.test_case_id.as_deref(), Some("tc-1"));
    assert_eq!(outcome.execution.metadata.driver_version, None);
    assert_eq!(provider.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_successful_ui_case_records_driver_and_releases() {
    let provider = FakeProvider::new(FakeDriver::default().with_element("#buy", "Buy"));
    let executor = case_executor(
        FakeHttp::status(200, "OK"),
        Arc::new(MemoryScreenshots::default()),
        provider.clone(),
    );

    let outcome = executor
        .execute_test_case(&request(vec![
            TestStep::new(ActionKind::Navigate).with_target("https://shop.example.test"),
            TestStep::new(ActionKind::Click).with_target("#buy"),
        ]))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.execution.steps.len(), 2);
    assert!(outcome.execution.screenshots.is_empty());
    assert_eq!(
        outcome.execution.metadata.driver_version.as_deref(),
        Some("FakeBrowser 1.0")
    );
    assert_eq!(
        outcome.execution.metadata.environment.as_deref(),
        Some("staging")
    );
    assert_eq!(provider.launches.load(Ordering::SeqCst), 1);
    assert!(provider.driver.closed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_step_becomes_error() {
    init_tracing();
    let provider = FakeProvider::new(FakeDriver::default().with_element("#explode", "Boom"));
    let executor = case_executor(
        FakeHttp::status(200, "OK"),
        Arc::new(MemoryScreenshots::default()),
        provider.clone(),
    );

    let outcome = executor
        .execute_test_case(&request(vec![
            TestStep::new(ActionKind::Click).with_target("#explode"),
            wait("5"),
        ]))
        .await;

    assert_eq!(outcome.execution.result, Some(ExecutionResult::Error));
    assert_eq!(outcome.execution.steps.len(), 1);
    assert!(outcome.execution.steps[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("driver crashed"));
    assert!(provider.driver.closed.load(Ordering::SeqCst));
}
