//! Durable outcome records of runs and hooks.

use serde::{Deserialize, Serialize};

use crate::event::EventType;
use crate::types::Timestamp;

/// Prefix under which hook output logs are written.
pub const HOOK_OUTPUT_PREFIX: &str = "_strata/actions/log";

/// Summary of one event's execution (`actions_runs`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub branch_id: String,
    pub source_ref: String,
    pub event_type: EventType,
    pub start_time: Timestamp,
    /// Latest end time over the run's hooks.
    pub end_time: Timestamp,
    pub passed: bool,
    /// Commit produced by the event; empty until linked.
    pub commit_id: String,
}

/// Outcome of a single hook within a run (`actions_run_hooks`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub run_id: String,
    pub hook_run_id: String,
    pub hook_id: String,
    pub action_name: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub passed: bool,
}

impl TaskResult {
    /// Location of the output written by this hook.
    pub fn log_path(&self) -> String {
        hook_output_path(&self.run_id, &self.action_name, &self.hook_id)
    }
}

/// Path of the output log for a hook of a run.
pub fn hook_output_path(run_id: &str, action_name: &str, hook_id: &str) -> String {
    format!("{HOOK_OUTPUT_PREFIX}/{run_id}/{action_name}/{hook_id}.log")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn output_path_layout() {
        assert_eq!(
            hook_output_path("run1", "check data", "validate"),
            "_strata/actions/log/run1/check data/validate.log"
        );
    }

    #[test]
    fn task_log_path_matches_output_path() {
        let now = Utc::now();
        let task = TaskResult {
            run_id: "r".to_string(),
            hook_run_id: "hr".to_string(),
            hook_id: "h".to_string(),
            action_name: "a".to_string(),
            start_time: now,
            end_time: now,
            passed: true,
        };
        assert_eq!(task.log_path(), hook_output_path("r", "a", "h"));
    }
}
