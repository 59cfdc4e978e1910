//! Lifecycle events that trigger action runs.
//!
//! An [`Event`] is produced by the caller (commit, merge, ...) and is never
//! persisted directly: it seeds a run and is handed, read-only, to every hook
//! executed for that run.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// The lifecycle point an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    PreCommit,
    PostCommit,
    PreMerge,
    PostMerge,
}

impl EventType {
    /// Return the wire-format string for this variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreCommit => "pre-commit",
            Self::PostCommit => "post-commit",
            Self::PreMerge => "pre-merge",
            Self::PostMerge => "post-merge",
        }
    }

    /// Parse from a wire-format string.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "pre-commit" => Ok(Self::PreCommit),
            "post-commit" => Ok(Self::PostCommit),
            "pre-merge" => Ok(Self::PreMerge),
            "post-merge" => Ok(Self::PostMerge),
            _ => Err(CoreError::Validation(format!(
                "Invalid event_type: '{s}'. Must be one of: pre-commit, post-commit, \
                 pre-merge, post-merge"
            ))),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Immutable description of the lifecycle occurrence that starts a run.
///
/// Constructed via [`Event::new`] and enriched with
/// [`with_commit`](Event::with_commit), [`with_metadata`](Event::with_metadata)
/// and [`with_time`](Event::with_time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,

    /// When the event happened (UTC). Becomes the run's start time.
    #[serde(default = "Utc::now")]
    pub event_time: Timestamp,

    pub repository_id: String,
    pub branch_id: String,

    /// The reference the operation was performed from (branch, commit, ...).
    pub source_ref: String,

    #[serde(default)]
    pub commit_message: String,

    #[serde(default)]
    pub committer: String,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(
        event_type: EventType,
        repository_id: impl Into<String>,
        branch_id: impl Into<String>,
        source_ref: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            event_time: Utc::now(),
            repository_id: repository_id.into(),
            branch_id: branch_id.into(),
            source_ref: source_ref.into(),
            commit_message: String::new(),
            committer: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach commit details to the event.
    pub fn with_commit(mut self, message: impl Into<String>, committer: impl Into<String>) -> Self {
        self.commit_message = message.into();
        self.committer = committer.into();
        self
    }

    /// Add a single metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Override the event time.
    pub fn with_time(mut self, time: Timestamp) -> Self {
        self.event_time = time;
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
