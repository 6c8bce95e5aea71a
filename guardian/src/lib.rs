//! Budget guardian for an automated short-video pipeline.
//!
//! Chooses, per episode, the richest production plan that keeps monthly
//! spend inside a hard cap, degrading along a fixed ladder
//! (`full` → `saver` → `minimal` → `fallback_dm`) and delaying episodes
//! rather than spamming fallbacks. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (estimation, selection, guard,
//!   cadence, ledger document). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config and ledger files, leases,
//!   notifications). Isolated to keep core logic pure.
//!
//! Orchestration modules ([`decide`], [`admin`], [`status`], [`validate`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod admin;
pub mod core;
pub mod decide;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;

pub use error::GuardianError;
