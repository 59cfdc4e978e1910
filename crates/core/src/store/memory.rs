//! In-memory [`RunStore`] implementation.
//!
//! Keeps rows in ordered maps keyed like the Postgres primary keys so that
//! listing order matches production. Not durable and single-process only.
//!
//! A failure can be injected for the task row of a given hook id to exercise
//! the all-or-nothing insert path.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{RunStore, StoreError, StoreResult};
use crate::results::{RunResult, TaskResult};

type RunKey = (String, String);
type TaskKey = (String, String, String);

#[derive(Debug, Default)]
struct Rows {
    runs: BTreeMap<RunKey, RunResult>,
    tasks: BTreeMap<TaskKey, TaskResult>,
}

/// In-memory store for tests and local tooling.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    rows: RwLock<Rows>,
    fail_on_hook: RwLock<Option<String>>,
}

fn poison_err<T>(_: PoisonError<T>) -> StoreError {
    StoreError::backend("in-memory store", "lock poisoned")
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make inserting the task row of `hook_id` fail.
    pub fn fail_on_hook(&self, hook_id: impl Into<String>) {
        if let Ok(mut guard) = self.fail_on_hook.write() {
            *guard = Some(hook_id.into());
        }
    }

    /// Number of run rows across all repositories.
    pub fn run_count(&self) -> StoreResult<usize> {
        let count = self.rows.read().map_err(poison_err)?.runs.len();
        Ok(count)
    }

    /// Number of task rows across all repositories.
    pub fn task_count(&self) -> StoreResult<usize> {
        let count = self.rows.read().map_err(poison_err)?.tasks.len();
        Ok(count)
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn insert_run(
        &self,
        repository_id: &str,
        run: &RunResult,
        tasks: &[TaskResult],
    ) -> StoreResult<()> {
        let fail_on = self.fail_on_hook.read().map_err(poison_err)?.clone();
        let mut rows = self.rows.write().map_err(poison_err)?;

        let run_key = (repository_id.to_string(), run.run_id.clone());
        if rows.runs.contains_key(&run_key) {
            return Err(StoreError::backend(
                "insert run information",
                format!("duplicate run id {}", run.run_id),
            ));
        }

        // Stage every row first; nothing is visible unless all succeed.
        let mut staged: BTreeMap<TaskKey, TaskResult> = BTreeMap::new();
        for task in tasks {
            let context = format!(
                "insert run hook information ({} {})",
                task.action_name, task.hook_id
            );
            if fail_on.as_deref() == Some(task.hook_id.as_str()) {
                return Err(StoreError::backend(context, "injected failure"));
            }
            let key = (
                repository_id.to_string(),
                run.run_id.clone(),
                task.hook_run_id.clone(),
            );
            if staged.contains_key(&key) || rows.tasks.contains_key(&key) {
                return Err(StoreError::backend(
                    context,
                    format!("duplicate hook run id {}", task.hook_run_id),
                ));
            }
            staged.insert(key, task.clone());
        }

        rows.runs.insert(run_key, run.clone());
        rows.tasks.extend(staged);
        Ok(())
    }

    async fn update_commit_id(
        &self,
        repository_id: &str,
        run_id: &str,
        commit_id: &str,
    ) -> StoreResult<bool> {
        let mut rows = self.rows.write().map_err(poison_err)?;
        let key = (repository_id.to_string(), run_id.to_string());
        match rows.runs.get_mut(&key) {
            Some(run) => {
                run.commit_id = commit_id.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_run(&self, repository_id: &str, run_id: &str) -> StoreResult<Option<RunResult>> {
        let rows = self.rows.read().map_err(poison_err)?;
        let key = (repository_id.to_string(), run_id.to_string());
        Ok(rows.runs.get(&key).cloned())
    }

    async fn get_task(
        &self,
        repository_id: &str,
        run_id: &str,
        hook_run_id: &str,
    ) -> StoreResult<Option<TaskResult>> {
        let rows = self.rows.read().map_err(poison_err)?;
        let key = (
            repository_id.to_string(),
            run_id.to_string(),
            hook_run_id.to_string(),
        );
        Ok(rows.tasks.get(&key).cloned())
    }

    async fn list_runs(
        &self,
        repository_id: &str,
        branch_id: Option<&str>,
        after: &str,
        limit: usize,
    ) -> StoreResult<Vec<RunResult>> {
        let rows = self.rows.read().map_err(poison_err)?;
        let page = rows
            .runs
            .iter()
            .filter(|((repo, run_id), _)| repo == repository_id && run_id.as_str() > after)
            .map(|(_, run)| run)
            .filter(|run| branch_id.map_or(true, |b| run.branch_id == b))
            .take(limit)
            .cloned()
            .collect();
        Ok(page)
    }

    async fn list_tasks(
        &self,
        repository_id: &str,
        run_id: &str,
        after: &str,
        limit: usize,
    ) -> StoreResult<Vec<TaskResult>> {
        let rows = self.rows.read().map_err(poison_err)?;
        let page = rows
            .tasks
            .iter()
            .filter(|((repo, run, hook_run_id), _)| {
                repo == repository_id && run == run_id && hook_run_id.as_str() > after
            })
            .map(|(_, task)| task)
            .take(limit)
            .cloned()
            .collect();
        Ok(page)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
