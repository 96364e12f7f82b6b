use anyhow::Result;
use colored::Colorize;
use std::time::Duration;

use atp_common::ExecutionResult;
use atp_orchestrator::DeadlineBudget;

use super::common::{build_dispatcher, ensure_queued, execution_store, open_storage, read_task};
use crate::config::AtpConfig;

pub async fn handle(config: &AtpConfig, task_path: &str, budget_secs: Option<u64>) -> Result<()> {
    let (body, task) = read_task(task_path)?;
    let budget_secs = budget_secs.unwrap_or(config.queue.budget_secs);

    let manager = open_storage(config).await?;
    let store = execution_store(&manager);
    ensure_queued(store.as_ref(), &task).await?;

    let dispatcher = build_dispatcher(config, store)?;
    let budget = DeadlineBudget::new(Duration::from_secs(budget_secs));

    println!(
        "{} 执行用例: {} ({})",
        "⏳".cyan(),
        task.test_case.name.bold(),
        task.execution_id
    );

    let outcome = dispatcher.handle(&body, &budget).await;
    manager.close().await;

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            println!("{} 执行失败: {}", "✗".red(), e);
            return Err(e.into());
        }
    };

    let result = match report.result {
        ExecutionResult::Pass => "pass".green(),
        ExecutionResult::Fail => "fail".red(),
        ExecutionResult::Error => "error".yellow(),
    };
    println!("{} 执行结束: {}", "✓".green(), result);
    if let Some(event_id) = &report.event_id {
        println!("  事件 ID: {}", event_id);
    }

    if !report.success {
        anyhow::bail!("用例 {} 未通过: {}", report.execution_id, report.result);
    }

    Ok(())
}
