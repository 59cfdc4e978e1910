//! Row models for the actions tables.

pub mod action_run;
