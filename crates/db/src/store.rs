//! [`RunStore`] backed by Postgres.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use strata_core::results::{RunResult, TaskResult};
use strata_core::store::{RunStore, StoreError, StoreResult};

use crate::repositories::ActionRunRepo;
use crate::DbPool;

/// Default upper bound for a single store operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Postgres implementation of [`RunStore`].
///
/// Every operation is bounded by `operation_timeout`; an expired operation
/// drops its transaction, which rolls it back.
#[derive(Debug, Clone)]
pub struct PgRunStore {
    pool: DbPool,
    operation_timeout: Duration,
}

impl PgRunStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Override the per-operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn bounded<T>(&self, op: impl Future<Output = StoreResult<T>> + Send) -> StoreResult<T> {
        match tokio::time::timeout(self.operation_timeout, op).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::warn!(timeout = ?self.operation_timeout, "Store operation timed out");
                Err(StoreError::Timeout(self.operation_timeout))
            }
        }
    }
}

/// Convert a page size into a SQL `LIMIT`.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn insert_run(
        &self,
        repository_id: &str,
        run: &RunResult,
        tasks: &[TaskResult],
    ) -> StoreResult<()> {
        self.bounded(ActionRunRepo::create_with_hooks(
            &self.pool,
            repository_id,
            run,
            tasks,
        ))
        .await
    }

    async fn update_commit_id(
        &self,
        repository_id: &str,
        run_id: &str,
        commit_id: &str,
    ) -> StoreResult<bool> {
        self.bounded(async {
            ActionRunRepo::update_commit_id(&self.pool, repository_id, run_id, commit_id)
                .await
                .map_err(|e| StoreError::backend("update run commit_id", e))
        })
        .await
    }

    async fn get_run(&self, repository_id: &str, run_id: &str) -> StoreResult<Option<RunResult>> {
        self.bounded(async {
            let row = ActionRunRepo::find_run(&self.pool, repository_id, run_id)
                .await
                .map_err(|e| StoreError::backend("get run result", e))?;
            row.map(RunResult::try_from)
                .transpose()
                .map_err(|e| StoreError::backend("decode run result", e))
        })
        .await
    }

    async fn get_task(
        &self,
        repository_id: &str,
        run_id: &str,
        hook_run_id: &str,
    ) -> StoreResult<Option<TaskResult>> {
        self.bounded(async {
            let row = ActionRunRepo::find_hook(&self.pool, repository_id, run_id, hook_run_id)
                .await
                .map_err(|e| StoreError::backend("get task result", e))?;
            Ok(row.map(TaskResult::from))
        })
        .await
    }

    async fn list_runs(
        &self,
        repository_id: &str,
        branch_id: Option<&str>,
        after: &str,
        limit: usize,
    ) -> StoreResult<Vec<RunResult>> {
        self.bounded(async {
            let rows = ActionRunRepo::list_runs(
                &self.pool,
                repository_id,
                branch_id,
                after,
                sql_limit(limit),
            )
            .await
            .map_err(|e| StoreError::backend("list run results", e))?;
            rows.into_iter()
                .map(RunResult::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::backend("decode run result", e))
        })
        .await
    }

    async fn list_tasks(
        &self,
        repository_id: &str,
        run_id: &str,
        after: &str,
        limit: usize,
    ) -> StoreResult<Vec<TaskResult>> {
        self.bounded(async {
            let rows =
                ActionRunRepo::list_hooks(&self.pool, repository_id, run_id, after, sql_limit(limit))
                    .await
                    .map_err(|e| StoreError::backend("list task results", e))?;
            Ok(rows.into_iter().map(TaskResult::from).collect())
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_limit_saturates() {
        assert_eq!(sql_limit(1024), 1024);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
    }
}
