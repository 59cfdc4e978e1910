//! The actions service: trigger, match, allocate, execute, persist, query.
//!
//! [`ActionsService::run`] is the single entry point for an event. It always
//! returns the run id it generated, together with the outcome:
//!
//! 1. load action definitions from the caller's source and match them
//!    against the event; no match is a silent success with nothing persisted;
//! 2. allocate one task per declared hook, failing fast on any hook that
//!    cannot be built;
//! 3. execute every task concurrently, each isolated from its siblings;
//! 4. persist the run and all task outcomes atomically, even if hooks failed.
//!
//! A persistence error takes precedence over hook failures in the returned
//! result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use strata_core::action::{match_actions, MatchSpec};
use strata_core::event::Event;
use strata_core::ids::new_run_id;
use strata_core::results::{RunResult, TaskResult};
use strata_core::store::{RunStore, StoreError, StoreResult};
use tokio::task::{Id as TaskId, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::{ActionsError, TaskError, TaskErrors};
use crate::hooks::{HookError, HookFactory};
use crate::iterator::{RunResultIterator, TaskResultIterator};
use crate::output::{HookOutputWriter, OutputWriter};
use crate::source::{load_actions, ActionSource};
use crate::task::{allocate_tasks, Task};

/// Rows fetched per page by the result iterators.
pub const DEFAULT_FETCH_SIZE: usize = 1024;

/// Per-run collaborators supplied by the caller.
#[derive(Clone)]
pub struct Deps {
    /// Where action definitions come from. `None` means no actions.
    pub source: Option<Arc<dyn ActionSource>>,
    /// Where hooks write their output.
    pub output: Arc<dyn OutputWriter>,
}

/// Run `op` unless `cancel` fires first.
pub(crate) async fn with_cancel<T>(
    cancel: &CancellationToken,
    op: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
        result = op => result,
    }
}

/// Executes actions for events and serves their recorded outcomes.
pub struct ActionsService {
    store: Arc<dyn RunStore>,
    hooks: HookFactory,
    fetch_size: usize,
}

impl ActionsService {
    /// Create a service with the built-in hook types.
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self {
            store,
            hooks: HookFactory::with_defaults(),
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }

    /// Replace the hook factory.
    pub fn with_hook_factory(mut self, hooks: HookFactory) -> Self {
        self.hooks = hooks;
        self
    }

    /// Override the iterator page size (minimum 1).
    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Run
    // -----------------------------------------------------------------------

    /// Execute every action matching `event`.
    ///
    /// The returned run id is generated before any other work, so it is
    /// available even when the run fails early.
    pub async fn run(
        &self,
        event: &Event,
        deps: &Deps,
        cancel: &CancellationToken,
    ) -> (String, Result<(), ActionsError>) {
        let run_id = new_run_id();
        let result = self.run_inner(&run_id, event, deps, cancel).await;
        match &result {
            Ok(()) => tracing::debug!(
                run_id = %run_id,
                repository_id = %event.repository_id,
                event_type = %event.event_type,
                "Actions run finished"
            ),
            Err(e) => tracing::warn!(
                run_id = %run_id,
                repository_id = %event.repository_id,
                event_type = %event.event_type,
                error = %e,
                "Actions run failed"
            ),
        }
        (run_id, result)
    }

    async fn run_inner(
        &self,
        run_id: &str,
        event: &Event,
        deps: &Deps,
        cancel: &CancellationToken,
    ) -> Result<(), ActionsError> {
        let actions = match &deps.source {
            Some(source) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ActionsError::Cancelled),
                loaded = load_actions(source.as_ref()) => loaded?,
            },
            None => Vec::new(),
        };

        let spec = MatchSpec {
            event_type: event.event_type,
            branch_id: event.branch_id.clone(),
        };
        let matched = match_actions(&actions, &spec).map_err(ActionsError::Match)?;
        if matched.is_empty() {
            tracing::debug!(run_id, "No actions matched event");
            return Ok(());
        }

        let tasks = allocate_tasks(run_id, &matched, &self.hooks)?;
        tracing::info!(
            run_id,
            actions = matched.len(),
            tasks = tasks.len(),
            "Executing actions"
        );

        let event = Arc::new(event.clone());
        let tasks = execute_tasks(&event, tasks, &deps.output, cancel).await;

        let passed = tasks.iter().all(Task::passed);
        self.persist(run_id, &event, &tasks, passed, cancel).await?;
        collect_errors(tasks).map_err(ActionsError::Execution)
    }

    // -----------------------------------------------------------------------
    // Persist
    // -----------------------------------------------------------------------

    /// Record a run and its task outcomes in one atomic write.
    ///
    /// Does nothing when there are no tasks.
    pub async fn persist(
        &self,
        run_id: &str,
        event: &Event,
        tasks: &[Task],
        passed: bool,
        cancel: &CancellationToken,
    ) -> Result<(), ActionsError> {
        let Some(end_time) = tasks.iter().map(|t| t.end_time).max() else {
            return Ok(());
        };

        let run = RunResult {
            run_id: run_id.to_string(),
            branch_id: event.branch_id.clone(),
            source_ref: event.source_ref.clone(),
            event_type: event.event_type,
            start_time: event.event_time,
            end_time,
            passed,
            commit_id: String::new(),
        };
        let rows: Vec<TaskResult> = tasks.iter().map(Task::to_result).collect();

        with_cancel(cancel, self.store.insert_run(&event.repository_id, &run, &rows))
            .await
            .map_err(|e| {
                tracing::error!(run_id, error = %e, "Failed to persist run");
                ActionsError::store(format!("persist run {run_id}"), e)
            })
    }

    // -----------------------------------------------------------------------
    // Commit link
    // -----------------------------------------------------------------------

    /// Attach the commit produced by the event to a recorded run.
    ///
    /// Calling again overwrites the previous value.
    pub async fn update_commit_id(
        &self,
        repository_id: &str,
        run_id: &str,
        commit_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ActionsError> {
        let updated = with_cancel(
            cancel,
            self.store.update_commit_id(repository_id, run_id, commit_id),
        )
        .await
        .map_err(|e| ActionsError::store("update run commit_id", e))?;
        if !updated {
            return Err(ActionsError::NotFound);
        }
        tracing::debug!(repository_id, run_id, commit_id, "Linked commit to run");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read
    // -----------------------------------------------------------------------

    pub async fn get_run_result(
        &self,
        repository_id: &str,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RunResult, ActionsError> {
        with_cancel(cancel, self.store.get_run(repository_id, run_id))
            .await
            .map_err(|e| ActionsError::store("get run result", e))?
            .ok_or(ActionsError::NotFound)
    }

    pub async fn get_task_result(
        &self,
        repository_id: &str,
        run_id: &str,
        hook_run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<TaskResult, ActionsError> {
        with_cancel(cancel, self.store.get_task(repository_id, run_id, hook_run_id))
            .await
            .map_err(|e| ActionsError::store("get task result", e))?
            .ok_or(ActionsError::NotFound)
    }

    /// Iterate over a repository's runs after `after`, optionally for one
    /// branch only.
    pub fn list_runs(
        &self,
        repository_id: &str,
        branch_id: Option<&str>,
        after: &str,
        cancel: &CancellationToken,
    ) -> RunResultIterator {
        RunResultIterator::new(
            Arc::clone(&self.store),
            repository_id,
            branch_id,
            after,
            self.fetch_size,
            cancel.clone(),
        )
    }

    /// Iterate over the hook outcomes of a run after `after`.
    pub fn list_run_tasks(
        &self,
        repository_id: &str,
        run_id: &str,
        after: &str,
        cancel: &CancellationToken,
    ) -> TaskResultIterator {
        TaskResultIterator::new(
            Arc::clone(&self.store),
            repository_id,
            run_id,
            after,
            self.fetch_size,
            cancel.clone(),
        )
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run every task concurrently and wait for all of them.
///
/// Returns the tasks in allocation order with their timings and errors
/// recorded. Every task gets an outcome: a hook that panics or whose tokio
/// task is aborted is recorded as failed. Dropping the returned future
/// aborts the hooks still running.
async fn execute_tasks(
    event: &Arc<Event>,
    mut tasks: Vec<Task>,
    output: &Arc<dyn OutputWriter>,
    cancel: &CancellationToken,
) -> Vec<Task> {
    let mut set = JoinSet::new();
    let mut slots: HashMap<TaskId, usize> = HashMap::with_capacity(tasks.len());
    for (index, task) in tasks.iter_mut().enumerate() {
        let writer = HookOutputWriter::new(
            task.run_id.clone(),
            task.hook_run_id.clone(),
            task.action.name.clone(),
            task.hook_id.clone(),
            Arc::clone(output),
        );
        let hook = Arc::clone(&task.hook);
        let event = Arc::clone(event);
        let cancel = cancel.clone();

        task.start_time = Utc::now();
        let handle = set.spawn(async move {
            tokio::select! {
                result = hook.run(&event, &writer) => result,
                _ = cancel.cancelled() => Err(HookError::Cancelled),
            }
        });
        slots.insert(handle.id(), index);
    }

    while let Some(joined) = set.join_next_with_id().await {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => {
                let id = e.id();
                let error = if e.is_panic() {
                    HookError::Panicked(panic_message(e.into_panic()))
                } else {
                    HookError::Failed(e.to_string())
                };
                (id, Err(error))
            }
        };
        match slots.get(&id) {
            Some(&index) => finish_task(&mut tasks[index], result),
            None => tracing::error!(task_id = %id, "Joined unknown hook task"),
        }
    }
    tasks
}

/// Aggregate the failures of executed tasks, keeping allocation order.
fn collect_errors(tasks: Vec<Task>) -> Result<(), TaskErrors> {
    let errors: Vec<TaskError> = tasks
        .into_iter()
        .filter_map(|task| {
            let source = task.error?;
            Some(TaskError {
                run_id: task.run_id,
                action: task.action.name.clone(),
                hook_id: task.hook_id,
                hook_run_id: task.hook_run_id,
                source,
            })
        })
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TaskErrors::new(errors))
    }
}

/// Record the end of a task and its outcome.
fn finish_task(task: &mut Task, result: Result<(), HookError>) {
    task.end_time = Utc::now();
    match &result {
        Ok(()) => tracing::debug!(
            run_id = %task.run_id,
            action = %task.action.name,
            hook_id = %task.hook_id,
            "Hook succeeded"
        ),
        Err(e) => tracing::warn!(
            run_id = %task.run_id,
            action = %task.action.name,
            hook_id = %task.hook_id,
            error = %e,
            "Hook failed"
        ),
    }
    task.error = result.err();
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
