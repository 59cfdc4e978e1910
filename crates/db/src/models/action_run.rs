//! Row structs for `actions_runs` and `actions_run_hooks`.
//!
//! Rows carry `event_type` as stored text; conversion into the core result
//! records validates it.

use sqlx::FromRow;
use strata_core::error::CoreError;
use strata_core::event::EventType;
use strata_core::results::{RunResult, TaskResult};
use strata_core::types::Timestamp;

// ---------------------------------------------------------------------------
// Entity: actions_runs
// ---------------------------------------------------------------------------

/// A row from the `actions_runs` table.
#[derive(Debug, Clone, FromRow)]
pub struct ActionRunRow {
    pub run_id: String,
    pub event_type: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub branch_id: String,
    pub source_ref: String,
    pub commit_id: String,
    pub passed: bool,
}

impl TryFrom<ActionRunRow> for RunResult {
    type Error = CoreError;

    fn try_from(row: ActionRunRow) -> Result<Self, Self::Error> {
        Ok(RunResult {
            run_id: row.run_id,
            branch_id: row.branch_id,
            source_ref: row.source_ref,
            event_type: EventType::from_str(&row.event_type)?,
            start_time: row.start_time,
            end_time: row.end_time,
            passed: row.passed,
            commit_id: row.commit_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Entity: actions_run_hooks
// ---------------------------------------------------------------------------

/// A row from the `actions_run_hooks` table.
#[derive(Debug, Clone, FromRow)]
pub struct ActionRunHookRow {
    pub run_id: String,
    pub hook_run_id: String,
    pub hook_id: String,
    pub action_name: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub passed: bool,
}

impl From<ActionRunHookRow> for TaskResult {
    fn from(row: ActionRunHookRow) -> Self {
        TaskResult {
            run_id: row.run_id,
            hook_run_id: row.hook_run_id,
            hook_id: row.hook_id,
            action_name: row.action_name,
            start_time: row.start_time,
            end_time: row.end_time,
            passed: row.passed,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
