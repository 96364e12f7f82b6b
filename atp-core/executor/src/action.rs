//! 步骤动作
//!
//! 把声明式的 [`TestStep`] 解析为强类型的动作，
//! 每种动作自带所需能力和可重试错误词表。

use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use atp_common::{ActionKind, TestStep};

use crate::http::{HttpBody, HttpRequest};

/// UI 动作的可重试错误
pub const UI_RETRYABLE_ERRORS: &[&str] = &["timeout", "not found", "not visible", "detached"];

/// 导航动作的可重试错误
pub const NAVIGATION_RETRYABLE_ERRORS: &[&str] = &[
    "timeout",
    "not found",
    "not visible",
    "detached",
    "net::ERR",
    "Navigation timeout",
];

/// API 调用的可重试错误
pub const API_RETRYABLE_ERRORS: &[&str] = &[
    "ETIMEDOUT",
    "ECONNRESET",
    "ECONNREFUSED",
    "ENOTFOUND",
    "network",
    "timeout",
];

/// 默认等待时长（毫秒）
pub const DEFAULT_WAIT_MS: u64 = 1000;

/// 断言类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionKind {
    /// 元素可见
    Visible,
    /// 文本内容完全匹配
    Text(String),
    /// 输入框值完全匹配
    Value(String),
}

impl AssertionKind {
    pub fn name(&self) -> &'static str {
        match self {
            AssertionKind::Visible => "visible",
            AssertionKind::Text(_) => "text",
            AssertionKind::Value(_) => "value",
        }
    }
}

/// 解析后的步骤动作
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    Navigate { url: String },
    Click { selector: String },
    Type { selector: String, text: String },
    Wait { duration: Duration },
    Assert { selector: String, assertion: AssertionKind },
    ApiCall { request: HttpRequest },
    Unknown { name: String },
}

impl StepAction {
    /// 解析步骤
    ///
    /// 返回 `Err` 表示步骤定义本身不完整，调用方记为 fail 且不重试。
    pub fn from_step(step: &TestStep) -> Result<Self, String> {
        let target = step.target.as_deref().filter(|t| !t.is_empty());

        match &step.action {
            ActionKind::Navigate => {
                let url = target.ok_or("Navigate step requires a target URL")?;
                Ok(StepAction::Navigate {
                    url: url.to_string(),
                })
            }
            ActionKind::Click => {
                let selector = target.ok_or("Click step requires a target selector")?;
                Ok(StepAction::Click {
                    selector: selector.to_string(),
                })
            }
            ActionKind::Type => {
                let selector = target.ok_or("Type step requires a target selector")?;
                let text = step
                    .value
                    .as_deref()
                    .ok_or("Type step requires a value")?;
                Ok(StepAction::Type {
                    selector: selector.to_string(),
                    text: text.to_string(),
                })
            }
            ActionKind::Wait => {
                let raw = step.value.as_deref().filter(|v| !v.is_empty()).or(target);
                let millis = match raw {
                    None => DEFAULT_WAIT_MS,
                    Some(raw) => raw
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| format!("Invalid wait duration: {}", raw))?,
                };
                Ok(StepAction::Wait {
                    duration: Duration::from_millis(millis),
                })
            }
            ActionKind::Assert => {
                let selector = target.ok_or("Assert step requires a target selector")?;
                let assertion = parse_assertion(step)?;
                Ok(StepAction::Assert {
                    selector: selector.to_string(),
                    assertion,
                })
            }
            ActionKind::ApiCall => {
                let url = target.ok_or("API call step requires a target URL")?;
                Ok(StepAction::ApiCall {
                    request: build_request(step, url),
                })
            }
            ActionKind::Unknown(name) => Ok(StepAction::Unknown { name: name.clone() }),
        }
    }

    pub fn requires_driver(&self) -> bool {
        matches!(
            self,
            StepAction::Navigate { .. }
                | StepAction::Click { .. }
                | StepAction::Type { .. }
                | StepAction::Assert { .. }
        )
    }

    /// 该动作的可重试错误词表
    pub fn retryable_errors(&self) -> &'static [&'static str] {
        match self {
            StepAction::Navigate { .. } => NAVIGATION_RETRYABLE_ERRORS,
            StepAction::Click { .. } | StepAction::Type { .. } | StepAction::Assert { .. } => {
                UI_RETRYABLE_ERRORS
            }
            StepAction::ApiCall { .. } => API_RETRYABLE_ERRORS,
            StepAction::Wait { .. } | StepAction::Unknown { .. } => &[],
        }
    }
}

fn parse_assertion(step: &TestStep) -> Result<AssertionKind, String> {
    let kind = step
        .expected_result
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .unwrap_or("visible");

    match kind.to_lowercase().as_str() {
        "visible" => Ok(AssertionKind::Visible),
        "text" => step
            .value
            .clone()
            .map(AssertionKind::Text)
            .ok_or_else(|| "Text assertion requires an expected value".to_string()),
        "value" => step
            .value
            .clone()
            .map(AssertionKind::Value)
            .ok_or_else(|| "Value assertion requires an expected value".to_string()),
        other => Err(format!("Unknown assertion type: {}", other)),
    }
}

/// 构造 API 请求
///
/// value 为带 `headers`/`body` 键的 JSON 对象时分别取用，
/// 其他 JSON 整体作为请求体，非 JSON 作为文本请求体。
fn build_request(step: &TestStep, url: &str) -> HttpRequest {
    let method = step
        .expected_result
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_uppercase)
        .unwrap_or_else(|| "GET".to_string());

    let mut request = HttpRequest::new(method, url);

    let raw = match step.value.as_deref() {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return request,
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(mut object))
            if object.contains_key("headers") || object.contains_key("body") =>
        {
            if let Some(Value::Object(headers)) = object.remove("headers") {
                request.headers = headers
                    .into_iter()
                    .map(|(name, value)| {
                        let value = match value {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (name, value)
                    })
                    .collect::<BTreeMap<_, _>>();
            }
            request.body = match object.remove("body") {
                None | Some(Value::Null) => None,
                Some(body) => Some(HttpBody::Json(body)),
            };
        }
        Ok(value) => request.body = Some(HttpBody::Json(value)),
        Err(_) => request.body = Some(HttpBody::Text(raw.to_string())),
    }

    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wait_duration_sources() {
        let step = TestStep::new(ActionKind::Wait).with_value("250");
        assert_eq!(
            StepAction::from_step(&step).unwrap(),
            StepAction::Wait {
                duration: Duration::from_millis(250)
            }
        );

        let step = TestStep::new(ActionKind::Wait).with_target("40");
        assert_eq!(
            StepAction::from_step(&step).unwrap(),
            StepAction::Wait {
                duration: Duration::from_millis(40)
            }
        );

        let step = TestStep::new(ActionKind::Wait);
        assert_eq!(
            StepAction::from_step(&step).unwrap(),
            StepAction::Wait {
                duration: Duration::from_millis(DEFAULT_WAIT_MS)
            }
        );

        let step = TestStep::new(ActionKind::Wait)
            .with_value("")
            .with_target("75");
        assert_eq!(
            StepAction::from_step(&step).unwrap(),
            StepAction::Wait {
                duration: Duration::from_millis(75)
            }
        );

        let step = TestStep::new(ActionKind::Wait).with_value("").with_target("");
        assert_eq!(
            StepAction::from_step(&step).unwrap(),
            StepAction::Wait {
                duration: Duration::from_millis(DEFAULT_WAIT_MS)
            }
        );

        let step = TestStep::new(ActionKind::Wait).with_value("-5");
        assert!(StepAction::from_step(&step)
            .unwrap_err()
            .contains("Invalid wait duration"));
    }

    #[test]
    fn test_missing_target() {
        let step = TestStep::new(ActionKind::Click);
        assert!(StepAction::from_step(&step).is_err());

        let step = TestStep::new(ActionKind::Type).with_target("#name");
        assert!(StepAction::from_step(&step).is_err());
    }

    #[test]
    fn test_assertion_kinds() {
        let step = TestStep::new(ActionKind::Assert).with_target("#banner");
        assert!(matches!(
            StepAction::from_step(&step).unwrap(),
            StepAction::Assert {
                assertion: AssertionKind::Visible,
                ..
            }
        ));

        let step = TestStep::new(ActionKind::Assert)
            .with_target("#title")
            .with_expected("text")
            .with_value("Welcome");
        assert!(matches!(
            StepAction::from_step(&step).unwrap(),
            StepAction::Assert {
                assertion: AssertionKind::Text(ref t),
                ..
            } if t == "Welcome"
        ));

        let step = TestStep::new(ActionKind::Assert)
            .with_target("#title")
            .with_expected("color");
        assert_eq!(
            StepAction::from_step(&step).unwrap_err(),
            "Unknown assertion type: color"
        );
    }

    #[test]
    fn test_api_request_with_headers_and_body() {
        let step = TestStep::new(ActionKind::ApiCall)
            .with_target("https://api.example.test/users")
            .with_expected("post")
            .with_value(
                json!({"headers": {"X-Token": "abc", "X-Retry": 2}, "body": {"name": "alice"}})
                    .to_string(),
            );

        let StepAction::ApiCall { request } = StepAction::from_step(&step).unwrap() else {
            panic!("expected api call");
        };
        assert_eq!(request.method, "POST");
        assert_eq!(request.headers.get("X-Token").map(String::as_str), Some("abc"));
        assert_eq!(request.headers.get("X-Retry").map(String::as_str), Some("2"));
        assert_eq!(request.body, Some(HttpBody::Json(json!({"name": "alice"}))));
    }

    #[test]
    fn test_api_request_body_variants() {
        let step = TestStep::new(ActionKind::ApiCall)
            .with_target("https://api.example.test/items")
            .with_value(r#"{"id": 3}"#);
        let StepAction::ApiCall { request } = StepAction::from_step(&step).unwrap() else {
            panic!("expected api call");
        };
        assert_eq!(request.method, "GET");
        assert_eq!(request.body, Some(HttpBody::Json(json!({"id": 3}))));

        let step = TestStep::new(ActionKind::ApiCall)
            .with_target("https://api.example.test/raw")
            .with_value("plain text");
        let StepAction::ApiCall { request } = StepAction::from_step(&step).unwrap() else {
            panic!("expected api call");
        };
        assert_eq!(request.body, Some(HttpBody::Text("plain text".to_string())));
    }

    #[test]
    fn test_retry_vocabulary() {
        let navigate = StepAction::Navigate {
            url: "https://example.test".to_string(),
        };
        assert!(navigate.retryable_errors().contains(&"net::ERR"));
        assert!(navigate.requires_driver());

        let unknown = StepAction::from_step(&TestStep::new(ActionKind::Unknown(
            "hover".to_string(),
        )))
        .unwrap();
        assert!(!unknown.requires_driver());
        assert!(unknown.retryable_errors().is_empty());
    }
}
