//! Deterministic, pure budget logic.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod append_only;
pub mod cadence;
pub mod calendar;
pub mod config;
pub mod estimator;
pub mod event_arc;
pub mod fallback_guard;
pub mod invariants;
pub mod ledger;
pub mod selector;
pub mod types;
