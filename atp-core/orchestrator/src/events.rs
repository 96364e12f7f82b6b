//! 事件发布
//!
//! 发布是尽力而为的：任何失败只记录日志，返回 `None`。

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use atp_common::{Event, EventType, Execution};

/// 事件接收端
#[async_trait]
pub trait EventSink: Send + Sync {
    /// 发布事件，成功时返回事件 ID
    async fn publish(&self, event: &Event) -> Option<String>;
}

/// 构造新事件
pub fn new_event(event_type: EventType, payload: Value) -> Event {
    Event {
        event_type,
        event_id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        payload,
    }
}

/// 用例执行结束事件: pass 为 test_completion，其余为 test_failure
pub fn completion_event(execution: &Execution) -> Event {
    let event_type = if execution.is_failure() || execution.result.is_none() {
        EventType::TestFailure
    } else {
        EventType::TestCompletion
    };

    new_event(
        event_type,
        json!({
            "executionId": execution.execution_id,
            "projectId": execution.project_id,
            "testCaseId": execution.test_case_id,
            "testSuiteId": execution.test_suite_id,
            "suiteExecutionId": execution.suite_execution_id,
            "status": execution.status,
            "result": execution.result,
            "duration": execution.duration,
            "errorMessage": execution.error_message,
            "screenshots": execution.screenshots,
            "triggeredBy": execution.metadata.triggered_by,
        }),
    )
}

/// 输出到日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: &Event) -> Option<String> {
        info!(
            "事件 {} ({}): {}",
            event.event_type.as_str(),
            event.event_id,
            event.payload
        );
        Some(event.event_id.clone())
    }
}

/// 追加写入 JSON Lines 文件
#[derive(Debug, Clone)]
pub struct JsonlEventSink {
    path: PathBuf,
}

impl JsonlEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn append(&self, event: &Event) -> std::io::Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn publish(&self, event: &Event) -> Option<String> {
        match self.append(event).await {
            Ok(()) => Some(event.event_id.clone()),
            Err(e) => {
                warn!("写入事件文件 {} 失败: {}", self.path.display(), e);
                None
            }
        }
    }
}

/// 同时发布到多个接收端，返回第一个成功的事件 ID
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

#[async_trait]
impl EventSink for FanoutEventSink {
    async fn publish(&self, event: &Event) -> Option<String> {
        let mut first = None;
        for sink in &self.sinks {
            let id = sink.publish(event).await;
            if first.is_none() {
                first = id;
            }
        }
        first
    }
}
