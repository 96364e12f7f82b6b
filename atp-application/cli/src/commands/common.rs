//! 公共工具函数模块
//!
//! 提供各命令模块共享的功能，包括：
//! - 打开数据库并构造执行记录存储
//! - 按配置组装调度器
//! - 读取任务消息、补齐排队中的执行记录

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use atp_common::{Execution, ExecutionMetadata, TaskMessage};
use atp_executor::{
    DriverProvider, FsScreenshotStore, ReqwestHttpClient, StepExecutor, TestCaseExecutor,
    UnavailableDriverProvider,
};
use atp_orchestrator::{Dispatcher, EventSink, FanoutEventSink, JsonlEventSink, TracingEventSink};
use atp_storage::{ExecutionStore, Storage, StorageManager};

use crate::config::AtpConfig;

/// 展开路径中的 `~`
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// 打开配置中的数据库
pub async fn open_storage(config: &AtpConfig) -> Result<StorageManager> {
    StorageManager::new(&config.database.path)
        .await
        .with_context(|| format!("打开数据库失败: {}", config.database.path))
}

/// 执行记录存储
pub fn execution_store(manager: &StorageManager) -> Arc<dyn ExecutionStore> {
    let storage = Storage::from_manager(manager);
    Arc::new(storage.executions().clone())
}

/// 按配置组装事件输出
pub fn build_event_sink(config: &AtpConfig) -> Arc<dyn EventSink> {
    let tracing_sink: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let mut sink = FanoutEventSink::new(vec![tracing_sink]);
    if let Some(log_file) = &config.events.log_file {
        sink.push(Arc::new(JsonlEventSink::new(expand_path(log_file))));
    }
    Arc::new(sink)
}

/// 按配置组装调度器
///
/// CLI 不内置 UI 驱动，UI 步骤会以驱动初始化失败结束。
pub fn build_dispatcher(config: &AtpConfig, store: Arc<dyn ExecutionStore>) -> Result<Dispatcher> {
    let http = ReqwestHttpClient::new(config.http.timeout()).context("创建 HTTP 客户端失败")?;
    let screenshots = FsScreenshotStore::new(expand_path(&config.screenshots.dir));

    let steps = StepExecutor::new(Arc::new(http), Arc::new(screenshots))
        .with_retry_options(config.retry.clone());
    let drivers: Arc<dyn DriverProvider> = Arc::new(UnavailableDriverProvider);
    let executor = TestCaseExecutor::new(steps, drivers);

    Ok(Dispatcher::new(
        store,
        executor,
        build_event_sink(config),
        config.dispatcher.clone(),
    ))
}

/// 读取并校验任务消息文件，返回原始内容和解析结果
pub fn read_task(path: &str) -> Result<(String, TaskMessage)> {
    let path = expand_path(path);
    let body = std::fs::read_to_string(&path)
        .with_context(|| format!("读取任务文件失败: {:?}", path))?;
    let task = TaskMessage::from_json_str(&body)
        .with_context(|| format!("任务消息格式错误: {:?}", path))?;
    Ok((body, task))
}

/// 补齐任务对应的排队中执行记录
///
/// 执行记录不存在时创建；消息指定了套件执行但套件记录不存在时，一并创建套件记录。
/// 返回新创建的记录数。
pub async fn ensure_queued(store: &dyn ExecutionStore, task: &TaskMessage) -> Result<usize> {
    let mut created = 0;

    if store.get(&task.execution_id).await?.is_none() {
        store.put(&task.queued_execution()).await?;
        info!("已创建执行记录: {}", task.execution_id);
        created += 1;
    }

    if let Some(suite_execution_id) = &task.suite_execution_id {
        if store.get(suite_execution_id).await?.is_none() {
            let mut metadata = ExecutionMetadata::new(&task.metadata.triggered_by);
            metadata.environment = task.metadata.environment.clone();

            let mut suite = Execution::queued(suite_execution_id, &task.project_id, metadata);
            suite.test_suite_id = task.resolved_test_suite_id();
            store.put(&suite).await?;
            info!("已创建套件执行记录: {}", suite_execution_id);
            created += 1;
        }
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atp_common::ExecutionStatus;

    fn task(suite_execution_id: Option<&str>) -> TaskMessage {
        let mut body = serde_json::json!({
            "executionId": "exec-1",
            "projectId": "proj-1",
            "testCase": {
                "testCaseId": "tc-1",
                "projectId": "proj-1",
                "name": "login",
                "testSuiteId": "ts-1",
                "steps": [{"action": "wait", "value": "1"}]
            },
            "metadata": {"triggeredBy": "ci"}
        });
        if let Some(suite) = suite_execution_id {
            body["suiteExecutionId"] = serde_json::json!(suite);
        }
        TaskMessage::from_json_str(&body.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_ensure_queued_creates_suite_record() {
        let manager = StorageManager::new_in_memory().await.unwrap();
        let store = execution_store(&manager);

        let created = ensure_queued(store.as_ref(), &task(Some("suite-1"))).await.unwrap();
        assert_eq!(created, 2);

        let case = store.get("exec-1").await.unwrap().unwrap();
        assert_eq!(case.status, ExecutionStatus::Queued);
        assert_eq!(case.suite_execution_id.as_deref(), Some("suite-1"));

        let suite = store.get("suite-1").await.unwrap().unwrap();
        assert_eq!(suite.test_suite_id.as_deref(), Some("ts-1"));
        assert!(suite.test_case_id.is_none());
        assert_eq!(store.query_by_suite("suite-1").await.unwrap().len(), 1);

        let created = ensure_queued(store.as_ref(), &task(Some("suite-1"))).await.unwrap();
        assert_eq!(created, 0);
    }

    #[tokio::test]
    async fn test_ensure_queued_without_suite() {
        let manager = StorageManager::new_in_memory().await.unwrap();
        let store = execution_store(&manager);

        assert_eq!(ensure_queued(store.as_ref(), &task(None)).await.unwrap(), 1);
        assert!(store.get("suite-1").await.unwrap().is_none());
    }

    #[test]
    fn test_read_task_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.json");
        std::fs::write(&path, r#"{"executionId": "exec-1"}"#).unwrap();

        assert!(read_task(path.to_str().unwrap()).is_err());
    }
}
