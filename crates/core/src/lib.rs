//! Domain core of the Strata actions engine.
//!
//! Pure building blocks shared by the persistence layer and the actions
//! service:
//!
//! - [`event`]: lifecycle events that trigger runs.
//! - [`action`]: action definitions, validation, and event matching.
//! - [`results`]: durable run and hook outcome records.
//! - [`store`]: the [`RunStore`](store::RunStore) persistence boundary and
//!   its in-memory implementation.
//! - [`ids`]: run identifier generation.

pub mod action;
pub mod error;
pub mod event;
pub mod ids;
pub mod results;
pub mod store;
pub mod types;
