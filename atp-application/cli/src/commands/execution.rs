//! 执行记录查询命令

use anyhow::Result;
use chrono::Local;
use colored::{ColoredString, Colorize};

use atp_common::{Execution, ExecutionResult, ExecutionStatus, StepStatus};
use atp_storage::{ExecutionFilter, ExecutionStore, Storage};

use super::common::open_storage;
use crate::config::AtpConfig;

pub async fn handle(config: &AtpConfig, action: crate::ExecutionAction) -> Result<()> {
    match action {
        crate::ExecutionAction::Show { id } => show_execution(config, &id).await,
        crate::ExecutionAction::List {
            test_case,
            suite,
            status,
            limit,
        } => list_executions(config, test_case, suite, status, limit).await,
        crate::ExecutionAction::Delete { id } => delete_execution(config, &id).await,
    }
}

pub(crate) fn status_label(status: ExecutionStatus) -> ColoredString {
    match status {
        ExecutionStatus::Queued => "queued".normal(),
        ExecutionStatus::Running => "running".cyan(),
        ExecutionStatus::Completed => "completed".green(),
        ExecutionStatus::Error => "error".red(),
    }
}

pub(crate) fn result_label(result: Option<ExecutionResult>) -> ColoredString {
    match result {
        Some(ExecutionResult::Pass) => "通过".green(),
        Some(ExecutionResult::Fail) => "失败".red(),
        Some(ExecutionResult::Error) => "错误".yellow(),
        None => "-".normal(),
    }
}

pub(crate) fn format_duration(duration: Option<u64>) -> String {
    match duration {
        Some(ms) => format!("{:.2}s", ms as f64 / 1000.0),
        None => "N/A".to_string(),
    }
}

/// 打印执行记录表格
pub(crate) fn print_execution_table(executions: &[Execution]) {
    println!(
        "{:<38} {:<20} {:<10} {:<8} {:<20} {:<10}",
        "执行 ID".bold(),
        "用例".bold(),
        "状态".bold(),
        "结果".bold(),
        "开始时间".bold(),
        "耗时".bold()
    );
    println!("{}", "-".repeat(110));

    for execution in executions {
        let local_time = execution.start_time.with_timezone(&Local);
        println!(
            "{:<38} {:<20} {:<10} {:<8} {:<20} {:<10}",
            execution.execution_id,
            execution.test_case_id.as_deref().unwrap_or("-"),
            status_label(execution.status),
            result_label(execution.result),
            local_time.format("%Y-%m-%d %H:%M:%S"),
            format_duration(execution.duration)
        );
    }
}

async fn list_executions(
    config: &AtpConfig,
    test_case: Option<String>,
    suite: Option<String>,
    status: Option<String>,
    limit: i64,
) -> Result<()> {
    let status = match status {
        Some(raw) => Some(
            ExecutionStatus::parse(&raw)
                .ok_or_else(|| anyhow::anyhow!("无效的状态: {}", raw))?,
        ),
        None => None,
    };

    println!("{} 加载执行记录...", "⏳".cyan());

    let manager = open_storage(config).await?;
    let storage = Storage::from_manager(&manager);

    let filter = ExecutionFilter {
        test_case_id: test_case,
        suite_execution_id: suite,
        status,
        limit: Some(limit),
        ..Default::default()
    };
    let executions = storage.executions().list(&filter).await?;
    manager.close().await;

    if executions.is_empty() {
        println!("\n{} 没有找到执行记录", "ℹ".yellow());
        return Ok(());
    }

    println!("\n{} 找到 {} 条执行记录:\n", "✓".green(), executions.len());
    print_execution_table(&executions);

    Ok(())
}

async fn show_execution(config: &AtpConfig, id: &str) -> Result<()> {
    println!("{} 加载执行详情...", "⏳".cyan());

    let manager = open_storage(config).await?;
    let storage = Storage::from_manager(&manager);
    let execution = storage.executions().get(id).await?;
    manager.close().await;

    let Some(execution) = execution else {
        println!("\n{} 未找到执行记录: {}", "✗".red(), id);
        return Ok(());
    };

    println!("\n{} 执行详情\n", "📊".cyan());
    println!("  ID: {}", execution.execution_id);
    println!("  项目: {}", execution.project_id);
    if let Some(test_case_id) = &execution.test_case_id {
        println!("  用例: {}", test_case_id.yellow());
    }
    if let Some(suite_execution_id) = &execution.suite_execution_id {
        println!("  套件执行: {}", suite_execution_id);
    }
    println!("  状态: {}", status_label(execution.status));
    println!("  结果: {}", result_label(execution.result));
    println!(
        "  开始时间: {}",
        execution
            .start_time
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    println!("  耗时: {}", format_duration(execution.duration));
    println!("  触发者: {}", execution.metadata.triggered_by);
    if let Some(version) = &execution.metadata.driver_version {
        println!("  驱动版本: {}", version);
    }
    if let Some(message) = &execution.error_message {
        println!("  错误: {}", message.red());
    }

    if !execution.steps.is_empty() {
        println!("\n  步骤:");
        for step in &execution.steps {
            let mark = match step.status {
                StepStatus::Pass => "✓".green(),
                StepStatus::Fail => "✗".red(),
                StepStatus::Error => "!".yellow(),
            };
            print!(
                "    {} [{}] {} ({}ms)",
                mark, step.step_index, step.action, step.duration
            );
            match &step.error_message {
                Some(message) => println!(" - {}", message),
                None => println!(),
            }
        }
    }

    if !execution.screenshots.is_empty() {
        println!("\n  截图:");
        for screenshot in &execution.screenshots {
            println!("    {}", screenshot);
        }
    }

    Ok(())
}

async fn delete_execution(config: &AtpConfig, id: &str) -> Result<()> {
    let manager = open_storage(config).await?;
    let storage = Storage::from_manager(&manager);
    let result = storage.executions().delete(id).await;
    manager.close().await;

    result?;
    println!("{} 已删除执行记录: {}", "✓".green(), id);
    Ok(())
}
