//! 执行时间预算

use std::time::Duration;
use tokio::time::Instant;

/// 宿主提供的剩余执行时间
pub trait TimeBudget: Send + Sync {
    fn remaining_ms(&self) -> u64;
}

/// 基于截止时间的预算
#[derive(Debug, Clone, Copy)]
pub struct DeadlineBudget {
    deadline: Instant,
}

impl DeadlineBudget {
    /// 从现在起 `budget` 后截止
    pub fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
        }
    }
}

impl TimeBudget for DeadlineBudget {
    fn remaining_ms(&self) -> u64 {
        self.deadline
            .saturating_duration_since(Instant::now())
            .as_millis() as u64
    }
}

/// 固定剩余时间
#[derive(Debug, Clone, Copy)]
pub struct FixedBudget(pub u64);

impl TimeBudget for FixedBudget {
    fn remaining_ms(&self) -> u64 {
        self.0
    }
}
