//! Pluggable persistence for run and hook outcomes.
//!
//! [`RunStore`] is the boundary between the actions service and the
//! transactional datastore. The Postgres implementation lives in
//! `strata-db`; [`memory::InMemoryRunStore`] backs tests and local tooling.
//!
//! Implementations must guarantee:
//! - `insert_run` writes the run row and every task row atomically; a failure
//!   on any row leaves no rows behind.
//! - Point lookups return `Ok(None)` for missing rows, never an error.
//! - Listing is ordered by `run_id` (runs) or `hook_run_id` (tasks) and only
//!   returns keys strictly greater than `after`.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::results::{RunResult, TaskResult};

/// Boxed error from a storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`RunStore`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: BoxError,
    },

    /// The operation did not finish within the configured timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
}

impl StoreError {
    /// Wrap a backend error with a description of the failed step.
    pub fn backend(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            context: context.into(),
            source: source.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage abstraction for action run outcomes.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Atomically insert a run row and one row per task.
    ///
    /// Task rows inherit the run's `event_type`. The error context names the
    /// row that failed (the run itself or the action/hook of a task).
    async fn insert_run(
        &self,
        repository_id: &str,
        run: &RunResult,
        tasks: &[TaskResult],
    ) -> StoreResult<()>;

    /// Set the commit id of an existing run.
    ///
    /// Returns `false` when no run matched `(repository_id, run_id)`.
    async fn update_commit_id(
        &self,
        repository_id: &str,
        run_id: &str,
        commit_id: &str,
    ) -> StoreResult<bool>;

    /// Get a run by id.
    async fn get_run(&self, repository_id: &str, run_id: &str) -> StoreResult<Option<RunResult>>;

    /// Get a single hook outcome of a run.
    async fn get_task(
        &self,
        repository_id: &str,
        run_id: &str,
        hook_run_id: &str,
    ) -> StoreResult<Option<TaskResult>>;

    /// One page of runs with `run_id > after`, optionally limited to a branch.
    async fn list_runs(
        &self,
        repository_id: &str,
        branch_id: Option<&str>,
        after: &str,
        limit: usize,
    ) -> StoreResult<Vec<RunResult>>;

    /// One page of a run's hook outcomes with `hook_run_id > after`.
    async fn list_tasks(
        &self,
        repository_id: &str,
        run_id: &str,
        after: &str,
        limit: usize,
    ) -> StoreResult<Vec<TaskResult>>;
}
