//! 执行记录存储接口
//!
//! 调度器、套件汇总和失败检测只依赖这个读写契约，不关心底层查询语言。

use async_trait::async_trait;

use atp_common::{Execution, ExecutionStatus};

use crate::error::Result;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// 读取单条执行记录
    async fn get(&self, execution_id: &str) -> Result<Option<Execution>>;

    /// 写入执行记录 (存在则整体覆盖，创建时间保持不变)
    async fn put(&self, execution: &Execution) -> Result<()>;

    /// 更新执行状态，记录不存在时返回 `NotFound`
    async fn update_status(&self, execution_id: &str, status: ExecutionStatus) -> Result<()>;

    /// 写入执行结果 (状态、结果、时间、步骤、截图、错误信息、元数据)
    async fn update_results(&self, execution: &Execution) -> Result<()>;

    /// 查询套件下的所有用例执行 (不含套件自身记录)
    async fn query_by_suite(&self, suite_execution_id: &str) -> Result<Vec<Execution>>;

    /// 查询用例最近的执行，按时间倒序
    async fn query_by_test_case(&self, test_case_id: &str, limit: usize)
        -> Result<Vec<Execution>>;
}
