//! Run and hook-run identifier generation.
//!
//! Identifiers are UUIDv7 strings: time-ordered, collision resistant, and
//! generated without any shared state. Lexicographic order of the hyphenated
//! lowercase form follows creation time, which is what the run listing relies
//! on when it orders by `run_id`.

use uuid::Uuid;

/// Generate a new run (or hook-run) identifier.
pub fn new_run_id() -> String {
    Uuid::now_v7().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
