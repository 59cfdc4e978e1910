//! Action definitions, validation, and event matching.
//!
//! An [`Action`] is a named configuration document declaring which events it
//! reacts to (`on`) and the ordered list of hooks to execute. Documents are
//! YAML:
//!
//! ```yaml
//! name: check data
//! on:
//!   pre-commit:
//!     branches:
//!       - main
//!       - release/*
//! hooks:
//!   - id: validate
//!     type: webhook
//!     properties:
//!       url: https://validator.example.com/check
//! ```
//!
//! Actions are read-only once loaded; a run shares them behind `Arc`.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, LazyLock};

use globset::GlobBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::event::EventType;

/// Allowed characters for hook identifiers.
static HOOK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Definition types
// ---------------------------------------------------------------------------

/// A loaded action definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Event types this action reacts to, each with an optional branch filter.
    pub on: BTreeMap<EventType, Option<ActionOn>>,

    pub hooks: Vec<ActionHook>,
}

/// Trigger filter for a single event type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOn {
    /// Branch glob patterns. Empty means every branch.
    #[serde(default)]
    pub branches: Vec<String>,
}

/// A single hook declaration inside an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionHook {
    /// Identifier, unique within the owning action.
    pub id: String,

    /// Type tag selecting the hook implementation (e.g. `webhook`, `shell`).
    #[serde(rename = "type")]
    pub hook_type: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Implementation-specific configuration.
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// What an action is matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpec {
    pub event_type: EventType,
    pub branch_id: String,
}

// ---------------------------------------------------------------------------
// Parsing and validation
// ---------------------------------------------------------------------------

/// Parse and validate a YAML action document.
///
/// `name` identifies the document (usually its file name) in error messages.
pub fn parse_action(name: &str, data: &[u8]) -> Result<Action, CoreError> {
    let action: Action = serde_yaml::from_slice(data).map_err(|source| CoreError::Parse {
        name: name.to_string(),
        source,
    })?;
    action.validate()?;
    Ok(action)
}

impl Action {
    /// Check the structural rules every action must satisfy.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |reason: String| CoreError::InvalidAction {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is required".to_string()));
        }
        if self.on.is_empty() {
            return Err(invalid("at least one event type is required in 'on'".to_string()));
        }
        for on in self.on.values().flatten() {
            for pattern in &on.branches {
                compile_branch_pattern(pattern).map_err(|e| invalid(e.to_string()))?;
            }
        }
        if self.hooks.is_empty() {
            return Err(invalid("at least one hook is required".to_string()));
        }

        let mut seen = HashSet::new();
        for hook in &self.hooks {
            if !HOOK_ID_RE.is_match(&hook.id) {
                return Err(invalid(format!(
                    "hook id '{}' must match {}",
                    hook.id,
                    HOOK_ID_RE.as_str()
                )));
            }
            if hook.hook_type.trim().is_empty() {
                return Err(invalid(format!("hook '{}' is missing a type", hook.id)));
            }
            if !seen.insert(hook.id.as_str()) {
                return Err(invalid(format!("duplicate hook id '{}'", hook.id)));
            }
        }
        Ok(())
    }

    /// Whether this action applies to the given event type and branch.
    pub fn matches(&self, spec: &MatchSpec) -> Result<bool, CoreError> {
        let Some(on) = self.on.get(&spec.event_type) else {
            return Ok(false);
        };
        let branches = match on {
            Some(on) if !on.branches.is_empty() => &on.branches,
            _ => return Ok(true),
        };
        for pattern in branches {
            let matcher = compile_branch_pattern(pattern)?;
            if matcher.is_match(&spec.branch_id) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Compile a branch glob where `*` does not cross `/`.
fn compile_branch_pattern(pattern: &str) -> Result<globset::GlobMatcher, CoreError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| CoreError::Validation(format!("invalid branch pattern '{pattern}': {e}")))
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Return the actions that apply to `spec`, preserving input order.
pub fn match_actions(
    actions: &[Arc<Action>],
    spec: &MatchSpec,
) -> Result<Vec<Arc<Action>>, CoreError> {
    let mut matched = Vec::new();
    for action in actions {
        if action.matches(spec)? {
            matched.push(Arc::clone(action));
        }
    }
    Ok(matched)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
