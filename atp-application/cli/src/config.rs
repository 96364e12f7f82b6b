//! CLI 配置管理
//!
//! 按以下顺序查找 TOML 配置文件:
//! 1. `--config` 参数或 `ATP_CONFIG` 环境变量
//! 2. `./atp.toml`
//! 3. `~/.config/atp/atp.toml`
//!
//! 找不到配置文件时使用默认值，最后由环境变量覆盖。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use atp_executor::RetryOptions;
use atp_orchestrator::DispatcherConfig;

/// ATP 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtpConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub retry: RetryOptions,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub screenshots: ScreenshotConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

/// 数据库配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.config/atp/data.db".to_string()
}

/// 任务队列配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// 队列目录
    #[serde(default = "default_queue_dir")]
    pub dir: String,

    /// 单条消息最多投递次数
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,

    /// 一次消费的时间预算（秒）
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dir: default_queue_dir(),
            max_deliveries: default_max_deliveries(),
            budget_secs: default_budget_secs(),
        }
    }
}

fn default_queue_dir() -> String {
    "~/.config/atp/queue".to_string()
}

fn default_max_deliveries() -> u32 {
    3
}

fn default_budget_secs() -> u64 {
    900
}

/// 截图存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    #[serde(default = "default_screenshot_dir")]
    pub dir: String,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            dir: default_screenshot_dir(),
        }
    }
}

fn default_screenshot_dir() -> String {
    "~/.config/atp/screenshots".to_string()
}

/// 事件输出配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// 事件日志文件 (JSON Lines)，为空时只输出到日志
    #[serde(default)]
    pub log_file: Option<String>,
}

/// HTTP 客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AtpConfig {
    /// 加载配置
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let mut config = match Self::find_config_file(explicit) {
            Some(path) => {
                tracing::debug!("Loading config from: {:?}", path);
                Self::load_from_file(&path)?
            }
            None => {
                if let Some(path) = explicit {
                    anyhow::bail!("配置文件不存在: {}", path);
                }
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_vars()?;
        config.validate()?;

        Ok(config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;

        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path))
    }

    /// 查找配置文件 (按优先级搜索)
    fn find_config_file(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            let p = PathBuf::from(shellexpand::tilde(path).as_ref());
            return p.exists().then_some(p);
        }

        if let Ok(path) = env::var("ATP_CONFIG") {
            let p = PathBuf::from(shellexpand::tilde(&path).as_ref());
            if p.exists() {
                return Some(p);
            }
        }

        let local = PathBuf::from("./atp.toml");
        if local.exists() {
            return Some(local);
        }

        if let Some(home) = dirs::home_dir() {
            let p = home.join(".config").join("atp").join("atp.toml");
            if p.exists() {
                return Some(p);
            }
        }

        None
    }

    fn apply_env_vars(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// 使用给定的查找函数应用环境变量覆盖
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("ATP_DB_PATH") {
            self.database.path = path;
        }
        if let Some(dir) = lookup("ATP_QUEUE_DIR") {
            self.queue.dir = dir;
        }
        if let Some(dir) = lookup("ATP_SCREENSHOT_DIR") {
            self.screenshots.dir = dir;
        }
        if let Some(secs) = lookup("ATP_BUDGET_SECS") {
            self.queue.budget_secs = secs
                .trim()
                .parse()
                .context("Invalid ATP_BUDGET_SECS value")?;
        }
        if let Some(attempts) = lookup("ATP_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = attempts
                .trim()
                .parse()
                .context("Invalid ATP_RETRY_MAX_ATTEMPTS value")?;
        }

        Ok(())
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            anyhow::bail!("database.path cannot be empty");
        }
        if self.queue.dir.trim().is_empty() {
            anyhow::bail!("queue.dir cannot be empty");
        }
        if self.queue.max_deliveries == 0 {
            anyhow::bail!("queue.max_deliveries must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.backoff_multiplier < 1.0 {
            anyhow::bail!("retry.backoff_multiplier must be >= 1.0");
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            anyhow::bail!("retry.max_delay_ms must not be less than retry.initial_delay_ms");
        }
        if self.dispatcher.failure_rate_threshold > 100 {
            anyhow::bail!("dispatcher.failure_rate_threshold must be within 0..=100");
        }
        if self.dispatcher.consecutive_failure_window == 0 {
            anyhow::bail!("dispatcher.consecutive_failure_window must be at least 1");
        }
        if self.http.timeout_secs == 0 {
            anyhow::bail!("http.timeout_secs must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AtpConfig::default();
        assert_eq!(config.database.path, "~/.config/atp/data.db");
        assert_eq!(config.queue.max_deliveries, 3);
        assert_eq!(config.queue.budget_secs, 900);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.dispatcher.required_ms(), 90_000);
        assert!(config.events.log_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
path = "/tmp/atp-test.db"

[dispatcher]
failure_rate_threshold = 75

[retry]
max_attempts = 5

[events]
log_file = "/tmp/atp-events.jsonl"
"#
        )
        .unwrap();

        let config = AtpConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.database.path, "/tmp/atp-test.db");
        assert_eq!(config.dispatcher.failure_rate_threshold, 75);
        assert_eq!(config.dispatcher.time_buffer_ms, 30_000);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.queue, QueueConfig::default());
        assert_eq!(config.events.log_file.as_deref(), Some("/tmp/atp-events.jsonl"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ATP_DB_PATH", "/srv/atp.db"),
            ("ATP_QUEUE_DIR", "/srv/queue"),
            ("ATP_BUDGET_SECS", "120"),
            ("ATP_RETRY_MAX_ATTEMPTS", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = AtpConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database.path, "/srv/atp.db");
        assert_eq!(config.queue.dir, "/srv/queue");
        assert_eq!(config.queue.budget_secs, 120);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.screenshots, ScreenshotConfig::default());
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = AtpConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "ATP_BUDGET_SECS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AtpConfig::default();
        config.queue.max_deliveries = 0;
        assert!(config.validate().is_err());

        let mut config = AtpConfig::default();
        config.dispatcher.failure_rate_threshold = 150;
        assert!(config.validate().is_err());

        let mut config = AtpConfig::default();
        config.retry.initial_delay_ms = 10_000;
        assert!(config.validate().is_err());
    }
}
