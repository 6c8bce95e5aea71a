//! Stable exit codes for guardian CLI commands.

/// Command succeeded or a plan was committed.
pub const OK: i32 = 0;
/// Command failed due to invalid config/ledger/arguments or other errors.
pub const INVALID: i32 = 1;
/// `guardian decide` or `guardian outage` left the episode undecided this cycle.
pub const DELAYED: i32 = 2;
/// The episode already has a current plan.
pub const ALREADY_DECIDED: i32 = 3;
/// Month lease held elsewhere or the ledger moved underneath; retry later.
pub const BUSY: i32 = 4;
