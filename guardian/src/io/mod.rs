//! I/O helpers for guardian commands.

pub mod atomic;
pub mod cadence_store;
pub mod config;
pub mod decision_log;
pub mod event_arcs;
pub mod init;
pub mod lease;
pub mod ledger_store;
pub mod notifications;
