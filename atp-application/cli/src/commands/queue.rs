//! 目录队列
//!
//! 每条消息是队列目录下的一个 JSON 信封文件，按文件名 (入队时间戳) 顺序消费。
//! 成功的消息移入 `processed/`，无法处理的消息移入 `dead-letter/`，
//! 其余失败写回投递次数后留在队列中等待重新投递。

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use atp_orchestrator::{DeadlineBudget, DispatchError, Dispatcher, TimeBudget};

use super::common::{build_dispatcher, execution_store, expand_path, open_storage};
use crate::config::AtpConfig;

const PROCESSED_DIR: &str = "processed";
const DEAD_LETTER_DIR: &str = "dead-letter";

/// 队列中的消息信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub message_id: String,
    pub enqueued_at: DateTime<Utc>,
    /// 已投递次数
    #[serde(default)]
    pub deliveries: u32,
    /// 原始任务消息
    pub body: String,
}

/// 基于目录的任务队列
pub struct SpoolQueue {
    root: PathBuf,
}

impl SpoolQueue {
    /// 打开队列目录，不存在时创建
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [
            root.clone(),
            root.join(PROCESSED_DIR),
            root.join(DEAD_LETTER_DIR),
        ] {
            fs::create_dir_all(&dir).with_context(|| format!("创建队列目录失败: {:?}", dir))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 写入一条消息，返回信封文件路径
    pub fn enqueue(&self, message_id: &str, body: &str) -> Result<PathBuf> {
        let envelope = Envelope {
            message_id: message_id.to_string(),
            enqueued_at: Utc::now(),
            deliveries: 0,
            body: body.to_string(),
        };

        let file_name = format!(
            "{}-{}.json",
            envelope.enqueued_at.timestamp_millis(),
            sanitize(message_id)
        );
        let path = self.root.join(file_name);
        self.write(&path, &envelope)?;

        info!("消息 {} 已入队: {:?}", message_id, path);
        Ok(path)
    }

    /// 待处理消息，按入队顺序排列
    pub fn pending(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("读取队列目录失败: {:?}", self.root))?
        {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    pub fn load(&self, path: &Path) -> Result<Envelope> {
        let content =
            fs::read_to_string(path).with_context(|| format!("读取消息失败: {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("解析消息信封失败: {:?}", path))
    }

    /// 写回投递次数
    pub fn record_delivery(&self, path: &Path, envelope: &Envelope) -> Result<()> {
        self.write(path, envelope)
    }

    /// 移入 processed/
    pub fn complete(&self, path: &Path) -> Result<PathBuf> {
        self.move_to(path, PROCESSED_DIR)
    }

    /// 移入 dead-letter/
    pub fn dead_letter(&self, path: &Path) -> Result<PathBuf> {
        self.move_to(path, DEAD_LETTER_DIR)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join(PROCESSED_DIR)
    }

    pub fn dead_letter_dir(&self) -> PathBuf {
        self.root.join(DEAD_LETTER_DIR)
    }

    fn write(&self, path: &Path, envelope: &Envelope) -> Result<()> {
        let content = serde_json::to_string_pretty(envelope).context("序列化消息失败")?;
        fs::write(path, content).with_context(|| format!("写入消息失败: {:?}", path))
    }

    fn move_to(&self, path: &Path, dir: &str) -> Result<PathBuf> {
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("无效的消息路径: {:?}", path))?;
        let target = self.root.join(dir).join(file_name);
        fs::rename(path, &target)
            .with_context(|| format!("移动消息失败: {:?} -> {:?}", path, target))?;
        Ok(target)
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// 一次消费的统计
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DrainSummary {
    pub processed: usize,
    pub redelivered: usize,
    pub dead_lettered: usize,
    /// 因时间预算不足提前结束
    pub out_of_time: bool,
}

/// 消费队列直到为空、全部进入终态或时间预算耗尽
pub async fn drain(
    queue: &SpoolQueue,
    dispatcher: &Dispatcher,
    budget: &dyn TimeBudget,
    max_deliveries: u32,
) -> Result<DrainSummary> {
    let mut summary = DrainSummary::default();

    loop {
        let pending = queue.pending()?;
        if pending.is_empty() {
            break;
        }

        for path in pending {
            let mut envelope = match queue.load(&path) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("无法读取消息 {:?}: {:#}", path, e);
                    queue.dead_letter(&path)?;
                    summary.dead_lettered += 1;
                    continue;
                }
            };
            envelope.deliveries += 1;

            match dispatcher.handle(&envelope.body, budget).await {
                Ok(report) => {
                    info!(
                        "消息 {} 处理完成: result={}",
                        envelope.message_id, report.result
                    );
                    queue.complete(&path)?;
                    summary.processed += 1;
                }
                Err(e) if e.is_malformed() => {
                    warn!("消息 {} 格式错误，移入死信: {}", envelope.message_id, e);
                    queue.dead_letter(&path)?;
                    summary.dead_lettered += 1;
                }
                Err(e) => {
                    if envelope.deliveries >= max_deliveries {
                        warn!(
                            "消息 {} 已投递 {} 次仍失败，移入死信: {}",
                            envelope.message_id, envelope.deliveries, e
                        );
                        queue.record_delivery(&path, &envelope)?;
                        queue.dead_letter(&path)?;
                        summary.dead_lettered += 1;
                    } else {
                        warn!(
                            "消息 {} 第 {} 次投递失败，等待重新投递: {}",
                            envelope.message_id, envelope.deliveries, e
                        );
                        queue.record_delivery(&path, &envelope)?;
                        summary.redelivered += 1;
                    }

                    if matches!(e, DispatchError::InsufficientTime { .. }) {
                        summary.out_of_time = true;
                        return Ok(summary);
                    }
                }
            }
        }
    }

    Ok(summary)
}

pub async fn handle(
    config: &AtpConfig,
    dir: Option<String>,
    max_deliveries: Option<u32>,
    budget_secs: Option<u64>,
) -> Result<()> {
    let dir = dir.unwrap_or_else(|| config.queue.dir.clone());
    let max_deliveries = max_deliveries.unwrap_or(config.queue.max_deliveries).max(1);
    let budget_secs = budget_secs.unwrap_or(config.queue.budget_secs);

    let queue = SpoolQueue::open(expand_path(&dir))?;
    let manager = open_storage(config).await?;
    let dispatcher = build_dispatcher(config, execution_store(&manager))?;
    let budget = DeadlineBudget::new(Duration::from_secs(budget_secs));

    println!(
        "{} 开始消费队列: {} (预算 {}s, 最多投递 {} 次)",
        "⏳".cyan(),
        queue.root().display(),
        budget_secs,
        max_deliveries
    );

    let summary = drain(&queue, &dispatcher, &budget, max_deliveries).await?;
    manager.close().await;

    println!();
    println!("{}", "队列消费结果".bold());
    println!("{}", "-".repeat(40));
    println!("  完成: {}", summary.processed.to_string().green());
    println!("  待重投: {}", summary.redelivered.to_string().yellow());
    println!("  死信: {}", summary.dead_lettered.to_string().red());

    if summary.out_of_time {
        println!("{} 时间预算不足，剩余消息留待下次消费", "⚠".yellow());
    }

    Ok(())
}
