use anyhow::Result;
use colored::Colorize;

use super::common::{expand_path, open_storage};
use crate::config::AtpConfig;

pub async fn handle(config: &AtpConfig, action: crate::DbAction) -> Result<()> {
    match action {
        crate::DbAction::Init => init_database(config).await,
        crate::DbAction::Check => check_database(config).await,
    }
}

async fn init_database(config: &AtpConfig) -> Result<()> {
    println!("🔄 正在初始化数据库...");
    let manager = open_storage(config).await?;
    manager.close().await;

    println!(
        "✅ 数据库已就绪: {}",
        expand_path(&config.database.path).display()
    );
    Ok(())
}

async fn check_database(config: &AtpConfig) -> Result<()> {
    let manager = open_storage(config).await?;
    manager.health_check().await?;
    let count = manager.execution_count().await?;
    manager.close().await;

    println!("{} 数据库连接正常", "✓".green());
    println!("  路径: {}", expand_path(&config.database.path).display());
    println!("  执行记录: {}", count);
    Ok(())
}
