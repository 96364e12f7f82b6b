use anyhow::Result;
use colored::Colorize;

use super::common::{ensure_queued, execution_store, expand_path, open_storage, read_task};
use super::queue::SpoolQueue;
use crate::config::AtpConfig;

pub async fn handle(config: &AtpConfig, task_path: &str, queue_dir: Option<String>) -> Result<()> {
    let (body, task) = read_task(task_path)?;

    let manager = open_storage(config).await?;
    let store = execution_store(&manager);
    let created = ensure_queued(store.as_ref(), &task).await?;
    manager.close().await;

    let dir = queue_dir.unwrap_or_else(|| config.queue.dir.clone());
    let queue = SpoolQueue::open(expand_path(&dir))?;
    let path = queue.enqueue(&task.execution_id, &body)?;

    println!("{} 任务已提交", "✓".green());
    println!("  执行 ID: {}", task.execution_id.cyan());
    println!("  用例: {} ({})", task.test_case.name, task.resolved_test_case_id());
    if let Some(suite_execution_id) = &task.suite_execution_id {
        println!("  套件执行: {}", suite_execution_id);
    }
    println!("  新建记录: {}", created);
    println!("  队列文件: {}", path.display());

    Ok(())
}
