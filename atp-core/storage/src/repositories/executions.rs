use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use atp_common::{Execution, ExecutionStatus};

use crate::error::{Result, StorageError};
use crate::models::{ExecutionFilter, ExecutionRecord};
use crate::store::ExecutionStore;

const SELECT_COLUMNS: &str = r#"
    SELECT execution_id, project_id, test_case_id, test_suite_id, suite_execution_id,
           status, result, start_time, end_time, duration_ms, steps, screenshots,
           error_message, metadata, created_at, updated_at
    FROM executions
"#;

/// 执行记录仓储
#[derive(Clone)]
pub struct ExecutionRepository {
    pool: SqlitePool,
}

impl ExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, sql: &str, binds: &[&str]) -> Result<Vec<Execution>> {
        let mut query = sqlx::query_as::<_, ExecutionRecord>(sql);
        for bind in binds {
            query = query.bind(*bind);
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Execution::try_from)
            .collect()
    }

    /// 查询执行记录列表
    pub async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>> {
        let mut query = format!("{} WHERE 1=1", SELECT_COLUMNS);
        let mut bindings: Vec<String> = Vec::new();

        if let Some(project_id) = &filter.project_id {
            query.push_str(" AND project_id = ?");
            bindings.push(project_id.clone());
        }

        if let Some(test_case_id) = &filter.test_case_id {
            query.push_str(" AND test_case_id = ?");
            bindings.push(test_case_id.clone());
        }

        if let Some(suite_execution_id) = &filter.suite_execution_id {
            query.push_str(" AND suite_execution_id = ?");
            bindings.push(suite_execution_id.clone());
        }

        if let Some(status) = filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }

        query.push_str(" ORDER BY created_at DESC, rowid DESC");

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit));
            if let Some(offset) = filter.offset {
                query.push_str(&format!(" OFFSET {}", offset));
            }
        }

        let binds: Vec<&str> = bindings.iter().map(String::as_str).collect();
        self.fetch(&query, &binds).await
    }

    /// 删除执行记录
    pub async fn delete(&self, execution_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM executions WHERE execution_id = ?")
            .bind(execution_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "Execution {} not found",
                execution_id
            )));
        }

        debug!("Deleted execution {}", execution_id);
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for ExecutionRepository {
    async fn get(&self, execution_id: &str) -> Result<Option<Execution>> {
        let sql = format!("{} WHERE execution_id = ?", SELECT_COLUMNS);
        let record = sqlx::query_as::<_, ExecutionRecord>(&sql)
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await?;

        record.map(Execution::try_from).transpose()
    }

    async fn put(&self, execution: &Execution) -> Result<()> {
        let record = ExecutionRecord::try_from(execution)?;

        sqlx::query(
            r#"
            INSERT INTO executions
            (execution_id, project_id, test_case_id, test_suite_id, suite_execution_id,
             status, result, start_time, end_time, duration_ms, steps, screenshots,
             error_message, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(execution_id) DO UPDATE SET
                project_id = excluded.project_id,
                test_case_id = excluded.test_case_id,
                test_suite_id = excluded.test_suite_id,
                suite_execution_id = excluded.suite_execution_id,
                status = excluded.status,
                result = excluded.result,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                duration_ms = excluded.duration_ms,
                steps = excluded.steps,
                screenshots = excluded.screenshots,
                error_message = excluded.error_message,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.execution_id)
        .bind(&record.project_id)
        .bind(&record.test_case_id)
        .bind(&record.test_suite_id)
        .bind(&record.suite_execution_id)
        .bind(&record.status)
        .bind(&record.result)
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.duration_ms)
        .bind(&record.steps)
        .bind(&record.screenshots)
        .bind(&record.error_message)
        .bind(&record.metadata)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("Stored execution {}", record.execution_id);
        Ok(())
    }

    async fn update_status(&self, execution_id: &str, status: ExecutionStatus) -> Result<()> {
        let result = sqlx::query(
            "UPDATE executions SET status = ?, updated_at = ? WHERE execution_id = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "Execution {} not found",
                execution_id
            )));
        }

        debug!("Execution {} -> {}", execution_id, status);
        Ok(())
    }

    async fn update_results(&self, execution: &Execution) -> Result<()> {
        let record = ExecutionRecord::try_from(execution)?;

        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = ?, result = ?, start_time = ?, end_time = ?, duration_ms = ?,
                steps = ?, screenshots = ?, error_message = ?, metadata = ?, updated_at = ?
            WHERE execution_id = ?
            "#,
        )
        .bind(&record.status)
        .bind(&record.result)
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.duration_ms)
        .bind(&record.steps)
        .bind(&record.screenshots)
        .bind(&record.error_message)
        .bind(&record.metadata)
        .bind(Utc::now())
        .bind(&record.execution_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "Execution {} not found",
                record.execution_id
            )));
        }

        debug!(
            "Updated results for execution {}: {}",
            record.execution_id, record.status
        );
        Ok(())
    }

    async fn query_by_suite(&self, suite_execution_id: &str) -> Result<Vec<Execution>> {
        let sql = format!(
            "{} WHERE suite_execution_id = ? AND execution_id != ? ORDER BY created_at ASC, rowid ASC",
            SELECT_COLUMNS
        );
        self.fetch(&sql, &[suite_execution_id, suite_execution_id])
            .await
    }

    async fn query_by_test_case(
        &self,
        test_case_id: &str,
        limit: usize,
    ) -> Result<Vec<Execution>> {
        let sql = format!(
            "{} WHERE test_case_id = ? ORDER BY created_at DESC, rowid DESC LIMIT {}",
            SELECT_COLUMNS, limit
        );
        self.fetch(&sql, &[test_case_id]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::StorageManager;
    use atp_common::ExecutionMetadata;

    #[tokio::test]
    async fn test_put_and_get_execution() {
        let storage = StorageManager::new_in_memory().await.unwrap();
        let repo = ExecutionRepository::new(storage.pool().clone());

        let execution = Execution::queued("exec-1", "proj-1", ExecutionMetadata::new("ci"));
        repo.put(&execution).await.unwrap();

        let retrieved = repo.get("exec-1").await.unwrap();
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().status, ExecutionStatus::Queued);

        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_missing_record() {
        let storage = StorageManager::new_in_memory().await.unwrap();
        let repo = ExecutionRepository::new(storage.pool().clone());

        let err = repo
            .update_status("missing", ExecutionStatus::Running)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
