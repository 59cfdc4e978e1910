//! Service-level error types.

use std::fmt;

use strata_core::error::CoreError;
use strata_core::store::StoreError;

use crate::hooks::{HookConfigError, HookError};
use crate::source::SourceError;

/// Errors returned by [`ActionsService`](crate::service::ActionsService).
#[derive(Debug, thiserror::Error)]
pub enum ActionsError {
    /// A point lookup or commit link matched no row.
    #[error("Not found")]
    NotFound,

    /// Action definitions could not be listed, read, or parsed.
    #[error("Failed to load actions: {0}")]
    Source(#[from] SourceError),

    /// A loaded definition could not be evaluated against the event.
    #[error("Failed to match actions: {0}")]
    Match(#[source] CoreError),

    /// A hook could not be built from its declaration. Nothing was executed.
    #[error("Failed to build hook '{hook_id}' of action '{action}': {source}")]
    HookConfig {
        action: String,
        hook_id: String,
        #[source]
        source: HookConfigError,
    },

    /// One or more hooks of a run failed.
    #[error("{0}")]
    Execution(TaskErrors),

    /// The run store failed.
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
}

impl ActionsError {
    /// Wrap a store error; a cancelled store call becomes [`ActionsError::Cancelled`].
    pub(crate) fn store(context: impl Into<String>, source: StoreError) -> Self {
        match source {
            StoreError::Cancelled => Self::Cancelled,
            source => Self::Store {
                context: context.into(),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

// ---------------------------------------------------------------------------
// Task errors
// ---------------------------------------------------------------------------

/// Failure of a single hook, with the identifiers needed to locate it.
#[derive(Debug, thiserror::Error)]
#[error("run {run_id} action '{action}' hook '{hook_id}': {source}")]
pub struct TaskError {
    pub run_id: String,
    pub action: String,
    pub hook_id: String,
    pub hook_run_id: String,
    #[source]
    pub source: HookError,
}

/// Aggregated failures of the hooks of one run, in allocation order.
#[derive(Debug, Default)]
pub struct TaskErrors(Vec<TaskError>);

impl TaskErrors {
    pub fn new(errors: Vec<TaskError>) -> Self {
        Self(errors)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskError> {
        self.0.iter()
    }
}

impl fmt::Display for TaskErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => f.write_str("no hook failed"),
            [single] => write!(f, "1 hook failed: {single}"),
            errors => {
                write!(f, "{} hooks failed: ", errors.len())?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{err}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for TaskErrors {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.first().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn task_error(hook_id: &str, msg: &str) -> TaskError {
        TaskError {
            run_id: "r1".to_string(),
            action: "check".to_string(),
            hook_id: hook_id.to_string(),
            hook_run_id: format!("hr-{hook_id}"),
            source: HookError::Failed(msg.to_string()),
        }
    }

    #[test]
    fn task_error_names_run_action_and_hook() {
        let err = task_error("h2", "timeout");
        assert_eq!(
            err.to_string(),
            "run r1 action 'check' hook 'h2': Hook failed: timeout"
        );
    }

    #[test]
    fn task_errors_joins_every_cause() {
        let errs = TaskErrors::new(vec![task_error("h1", "boom"), task_error("h2", "timeout")]);
        let msg = errs.to_string();
        assert!(msg.starts_with("2 hooks failed: "));
        assert!(msg.contains("boom"));
        assert!(msg.contains("timeout"));
        assert!(msg.find("h1").unwrap() < msg.find("h2").unwrap());
    }

    #[test]
    fn cancelled_store_error_maps_to_cancelled() {
        let err = ActionsError::store("get run result", StoreError::Cancelled);
        assert!(matches!(err, ActionsError::Cancelled));
    }

    #[test]
    fn store_error_keeps_context() {
        let err = ActionsError::store(
            "get run result",
            StoreError::backend("select", "connection reset"),
        );
        assert_eq!(err.to_string(), "get run result: select: connection reset");
    }
}
