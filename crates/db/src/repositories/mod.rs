//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that accept
//! `&PgPool` as the first argument.

pub mod action_run_repo;

pub use action_run_repo::ActionRunRepo;
