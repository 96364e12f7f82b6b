//! 套件执行命令

use anyhow::Result;
use colored::Colorize;

use atp_orchestrator::{calculate_aggregate, SuiteAggregator};

use super::common::{execution_store, open_storage};
use super::execution::{format_duration, print_execution_table, result_label, status_label};
use crate::config::AtpConfig;

pub async fn handle(config: &AtpConfig, action: crate::SuiteAction) -> Result<()> {
    match action {
        crate::SuiteAction::Show { id } => show_suite(config, &id).await,
        crate::SuiteAction::Recompute { id } => recompute_suite(config, &id).await,
    }
}

async fn show_suite(config: &AtpConfig, id: &str) -> Result<()> {
    println!("{} 加载套件执行...", "⏳".cyan());

    let manager = open_storage(config).await?;
    let store = execution_store(&manager);
    let suite = store.get(id).await?;
    let cases = store.query_by_suite(id).await?;
    manager.close().await;

    let Some(suite) = suite else {
        println!("\n{} 未找到套件执行: {}", "✗".red(), id);
        return Ok(());
    };

    // 按当前用例记录统计
    let aggregate = calculate_aggregate(&cases);

    println!("\n{} 套件执行详情\n", "📊".cyan());
    println!("  ID: {}", suite.execution_id);
    if let Some(test_suite_id) = &suite.test_suite_id {
        println!("  套件: {}", test_suite_id.yellow());
    }
    println!("  状态: {}", status_label(suite.status));
    println!("  结果: {}", result_label(suite.result));
    println!("  耗时: {}", format_duration(suite.duration));
    println!(
        "  用例: 共 {} / 通过 {} / 失败 {} / 错误 {}",
        aggregate.total,
        aggregate.passed.to_string().green(),
        aggregate.failed.to_string().red(),
        aggregate.errors.to_string().yellow()
    );

    if !cases.is_empty() {
        println!();
        print_execution_table(&cases);
    }

    Ok(())
}

async fn recompute_suite(config: &AtpConfig, id: &str) -> Result<()> {
    let manager = open_storage(config).await?;
    let aggregator = SuiteAggregator::new(execution_store(&manager));
    let updated = aggregator.update_suite_execution(id).await;
    manager.close().await;

    match updated? {
        Some(suite) => {
            println!(
                "{} 套件 {} 已更新: {} / {}",
                "✓".green(),
                id,
                status_label(suite.status),
                result_label(suite.result)
            );
        }
        None => println!("{} 套件 {} 下没有用例执行", "ℹ".yellow(), id),
    }

    Ok(())
}
