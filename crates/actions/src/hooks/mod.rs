//! Runnable hooks and the factory that builds them from declarations.
//!
//! A [`Hook`] is one executable integration (an HTTP call, a script, ...).
//! [`HookFactory`] maps a declaration's type tag to a constructor, so new
//! hook kinds are added by registering a constructor rather than touching
//! the coordinator.
//!
//! Built-in kinds:
//! - `webhook`: [`webhook::WebhookHook`]
//! - `shell`: [`shell::ShellHook`]

pub mod shell;
pub mod webhook;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use strata_core::action::ActionHook;
use strata_core::event::Event;

use crate::output::{HookOutputWriter, OutputError};

pub use shell::ShellHook;
pub use webhook::WebhookHook;

/// An executable hook bound to its configuration.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Execute the hook for `event`, writing any output through `output`.
    async fn run(&self, event: &Event, output: &HookOutputWriter) -> Result<(), HookError>;
}

/// Failure of a single hook execution.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Hook failed: {0}")]
    Failed(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    #[error("Script timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Script failed with exit code {exit_code}: {stderr}")]
    ExitStatus { exit_code: i32, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("Hook panicked: {0}")]
    Panicked(String),

    #[error("Hook cancelled")]
    Cancelled,
}

/// A hook declaration that cannot be turned into a runnable hook.
#[derive(Debug, thiserror::Error)]
pub enum HookConfigError {
    #[error("Unknown hook type '{0}'")]
    UnknownType(String),

    #[error("Invalid hook properties: {0}")]
    InvalidProperties(String),
}

/// Deserialize a declaration's `properties` into a typed config.
pub fn parse_properties<T: DeserializeOwned>(hook: &ActionHook) -> Result<T, HookConfigError> {
    serde_json::from_value(serde_json::Value::Object(hook.properties.clone()))
        .map_err(|e| HookConfigError::InvalidProperties(e.to_string()))
}

// ---------------------------------------------------------------------------
// HookFactory
// ---------------------------------------------------------------------------

/// Builds a runnable hook from its declaration.
pub type HookConstructor =
    Arc<dyn Fn(&ActionHook) -> Result<Arc<dyn Hook>, HookConfigError> + Send + Sync>;

/// Registry of hook constructors keyed by type tag.
#[derive(Clone)]
pub struct HookFactory {
    constructors: HashMap<String, HookConstructor>,
}

impl HookFactory {
    /// A factory with no registered hook types.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A factory with the built-in `webhook` and `shell` types.
    pub fn with_defaults() -> Self {
        let client = reqwest::Client::new();
        let mut factory = Self::empty();
        factory.register(webhook::HOOK_TYPE, move |hook| {
            let hook = WebhookHook::from_declaration(client.clone(), hook)?;
            Ok(Arc::new(hook) as Arc<dyn Hook>)
        });
        factory.register(shell::HOOK_TYPE, |hook| {
            let hook = ShellHook::from_declaration(hook)?;
            Ok(Arc::new(hook) as Arc<dyn Hook>)
        });
        factory
    }

    /// Register (or replace) the constructor for `hook_type`.
    pub fn register<F>(&mut self, hook_type: impl Into<String>, constructor: F)
    where
        F: Fn(&ActionHook) -> Result<Arc<dyn Hook>, HookConfigError> + Send + Sync + 'static,
    {
        self.constructors
            .insert(hook_type.into(), Arc::new(constructor));
    }

    /// Build the runnable hook for a declaration.
    pub fn build(&self, hook: &ActionHook) -> Result<Arc<dyn Hook>, HookConfigError> {
        let constructor = self
            .constructors
            .get(&hook.hook_type)
            .ok_or_else(|| HookConfigError::UnknownType(hook.hook_type.clone()))?;
        (constructor.as_ref())(hook)
    }

    pub fn is_registered(&self, hook_type: &str) -> bool {
        self.constructors.contains_key(hook_type)
    }
}

impl Default for HookFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for HookFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.constructors.keys().collect();
        types.sort();
        f.debug_struct("HookFactory").field("types", &types).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    struct Noop;

    #[async_trait]
    impl Hook for Noop {
        async fn run(&self, _event: &Event, _output: &HookOutputWriter) -> Result<(), HookError> {
            Ok(())
        }
    }

    fn declaration(hook_type: &str, properties: serde_json::Value) -> ActionHook {
        let properties = match properties {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        ActionHook {
            id: "h1".to_string(),
            hook_type: hook_type.to_string(),
            description: None,
            properties,
        }
    }

    #[test]
    fn defaults_register_builtin_types() {
        let factory = HookFactory::with_defaults();
        assert!(factory.is_registered("webhook"));
        assert!(factory.is_registered("shell"));
        assert!(!factory.is_registered("airflow"));
    }

    #[test]
    fn unknown_type_is_config_error() {
        let factory = HookFactory::with_defaults();
        let result = factory.build(&declaration("airflow", json!({})));
        assert_matches!(result.err(), Some(HookConfigError::UnknownType(t)) if t == "airflow");
    }

    #[test]
    fn builds_builtin_webhook() {
        let factory = HookFactory::with_defaults();
        let hook = declaration("webhook", json!({ "url": "http://localhost:8080/hook" }));
        assert!(factory.build(&hook).is_ok());
    }

    #[test]
    fn invalid_builtin_properties_are_rejected() {
        let factory = HookFactory::with_defaults();
        let result = factory.build(&declaration("webhook", json!({ "timeout_secs": 5 })));
        assert_matches!(result.err(), Some(HookConfigError::InvalidProperties(_)));
    }

    #[test]
    fn registered_type_is_built() {
        let mut factory = HookFactory::empty();
        factory.register("noop", |_| Ok(Arc::new(Noop) as Arc<dyn Hook>));
        assert!(factory.build(&declaration("noop", json!({}))).is_ok());
        assert_matches!(
            factory.build(&declaration("webhook", json!({}))).err(),
            Some(HookConfigError::UnknownType(_))
        );
    }
}
