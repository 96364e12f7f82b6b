//! ATP CLI 应用

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::AtpConfig;

#[derive(Parser)]
#[command(name = "atp")]
#[command(about = "ATP - 测试用例执行调度", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别 (设置 RUST_LOG 时以其为准)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 提交任务消息到队列
    Submit {
        /// 任务消息文件 (JSON)
        task: String,

        /// 队列目录
        #[arg(short = 'd', long)]
        queue_dir: Option<String>,
    },

    /// 直接执行一条任务消息
    Dispatch {
        /// 任务消息文件 (JSON)
        task: String,

        /// 时间预算（秒）
        #[arg(short, long)]
        budget_secs: Option<u64>,
    },

    /// 消费队列中的任务消息
    Queue {
        /// 队列目录
        #[arg(short, long)]
        dir: Option<String>,

        /// 单条消息最多投递次数
        #[arg(short, long)]
        max_deliveries: Option<u32>,

        /// 本次消费的时间预算（秒）
        #[arg(short, long)]
        budget_secs: Option<u64>,
    },

    /// 执行记录查询
    Execution {
        #[command(subcommand)]
        action: ExecutionAction,
    },

    /// 套件执行管理
    Suite {
        #[command(subcommand)]
        action: SuiteAction,
    },

    /// 数据库管理
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
pub enum ExecutionAction {
    /// 显示执行记录详情
    Show {
        /// 执行 ID
        id: String,
    },

    /// 列出执行记录
    List {
        /// 用例 ID 过滤
        #[arg(short, long)]
        test_case: Option<String>,

        /// 套件执行 ID 过滤
        #[arg(short, long)]
        suite: Option<String>,

        /// 状态过滤 (queued/running/completed/error)
        #[arg(long)]
        status: Option<String>,

        /// 限制数量
        #[arg(short = 'n', long, default_value = "20")]
        limit: i64,
    },

    /// 删除执行记录
    Delete {
        /// 执行 ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum SuiteAction {
    /// 显示套件执行及其用例
    Show {
        /// 套件执行 ID
        id: String,
    },

    /// 重新计算套件汇总
    Recompute {
        /// 套件执行 ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum DbAction {
    /// 初始化数据库 (运行迁移)
    Init,

    /// 检查数据库连接
    Check,
}

fn init_logging(log_level: &str) {
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
        return;
    }

    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    info!("ATP CLI 启动");

    let config = AtpConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Submit { task, queue_dir } => {
            commands::submit::handle(&config, &task, queue_dir).await?
        }
        Commands::Dispatch { task, budget_secs } => {
            commands::dispatch::handle(&config, &task, budget_secs).await?
        }
        Commands::Queue {
            dir,
            max_deliveries,
            budget_secs,
        } => commands::queue::handle(&config, dir, max_deliveries, budget_secs).await?,
        Commands::Execution { action } => commands::execution::handle(&config, action).await?,
        Commands::Suite { action } => commands::suite::handle(&config, action).await?,
        Commands::Db { action } => commands::db::handle(&config, action).await?,
    }

    Ok(())
}
