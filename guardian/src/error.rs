//! Typed domain failures carried inside `anyhow::Error`.
//!
//! Callers recover the variant with `err.downcast_ref::<GuardianError>()` to
//! decide between retrying, reporting, or treating the call as a success.

use thiserror::Error;

use crate::core::types::PlanCode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardianError {
    /// Config or rate table is unusable; blocks all decisions until fixed.
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    /// A current plan already exists for the episode.
    #[error("episode '{episode_id}' already decided ({plan})")]
    AlreadyDecided { episode_id: String, plan: PlanCode },

    /// Another decision holds the month lease. Retry with backoff.
    #[error("decision lease for {month} is held by another decision")]
    LockBusy { month: String },

    /// The ledger changed between read and commit. Retry the whole decision.
    #[error("ledger changed during decision (read version {expected}, found {found})")]
    LedgerWriteConflict { expected: u64, found: u64 },

    /// No current plan exists for the episode.
    #[error("episode '{episode_id}' has no current plan")]
    NotDecided { episode_id: String },

    /// Writing would push committed spend past the month's hard cap.
    #[error("commit of {amount_cents}c would exceed cap for {month} ({spent_cents}c of {cap_cents}c spent)")]
    CapExceeded {
        month: String,
        amount_cents: i64,
        spent_cents: i64,
        cap_cents: i64,
    },

    /// An override to a fallback plan was denied by the fallback guard.
    #[error("fallback refused for '{episode_id}': {reason}")]
    FallbackRefused { episode_id: String, reason: String },

    #[error("invalid episode id '{0}'")]
    InvalidEpisodeId(String),
}

impl GuardianError {
    /// True for contention failures that a caller should retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GuardianError::LockBusy { .. } | GuardianError::LedgerWriteConflict { .. }
        )
    }
}

/// Extract a `GuardianError` from an `anyhow` chain, if present.
pub fn guardian_error(err: &anyhow::Error) -> Option<&GuardianError> {
    err.chain().find_map(|cause| cause.downcast_ref::<GuardianError>())
}
