//! Task allocation.
//!
//! A [`Task`] binds one declared hook of one matched action to a run. Tasks
//! live only for the duration of a run: they are executed, turned into
//! [`TaskResult`] rows, and dropped.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use strata_core::action::Action;
use strata_core::ids::new_run_id;
use strata_core::results::TaskResult;
use strata_core::types::Timestamp;

use crate::error::ActionsError;
use crate::hooks::{Hook, HookError, HookFactory};

/// One hook execution within a run.
pub struct Task {
    pub run_id: String,
    pub hook_run_id: String,
    pub action: Arc<Action>,
    pub hook_id: String,
    pub hook: Arc<dyn Hook>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// `None` once the hook has succeeded.
    pub error: Option<HookError>,
}

impl Task {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }

    /// The persisted form of this task.
    pub fn to_result(&self) -> TaskResult {
        TaskResult {
            run_id: self.run_id.clone(),
            hook_run_id: self.hook_run_id.clone(),
            hook_id: self.hook_id.clone(),
            action_name: self.action.name.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            passed: self.passed(),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("run_id", &self.run_id)
            .field("hook_run_id", &self.hook_run_id)
            .field("action", &self.action.name)
            .field("hook_id", &self.hook_id)
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Expand matched actions into one task per declared hook.
///
/// Tasks follow action order, then hook declaration order. If any hook
/// cannot be built, no task is returned.
pub fn allocate_tasks(
    run_id: &str,
    actions: &[Arc<Action>],
    factory: &HookFactory,
) -> Result<Vec<Task>, ActionsError> {
    let now = Utc::now();
    let mut tasks = Vec::new();
    for action in actions {
        for declared in &action.hooks {
            let hook = factory
                .build(declared)
                .map_err(|source| ActionsError::HookConfig {
                    action: action.name.clone(),
                    hook_id: declared.id.clone(),
                    source,
                })?;
            tasks.push(Task {
                run_id: run_id.to_string(),
                hook_run_id: new_run_id(),
                action: Arc::clone(action),
                hook_id: declared.id.clone(),
                hook,
                start_time: now,
                end_time: now,
                error: None,
            });
        }
    }
    Ok(tasks)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
