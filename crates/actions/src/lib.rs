//! Executes actions for lifecycle events and records their outcomes.
//!
//! - [`service`]: the [`ActionsService`] entry points (run, commit link,
//!   lookups, listing).
//! - [`hooks`]: the [`Hook`](hooks::Hook) capability, the
//!   [`HookFactory`](hooks::HookFactory), and the built-in webhook and shell
//!   hooks.
//! - [`task`]: task allocation.
//! - [`source`]: where action definitions come from.
//! - [`output`]: hook output sinks.
//! - [`iterator`]: paginated result iterators.
//! - [`config`]: environment configuration.

pub mod config;
pub mod error;
pub mod hooks;
pub mod iterator;
pub mod output;
pub mod service;
pub mod source;
pub mod task;

pub use error::{ActionsError, TaskError, TaskErrors};
pub use service::{ActionsService, Deps};
