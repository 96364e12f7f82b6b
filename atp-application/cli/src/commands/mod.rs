//! CLI 命令处理模块

pub mod common; // 公共工具函数
pub mod db;
pub mod dispatch;
pub mod execution;
pub mod queue;
pub mod submit;
pub mod suite;
