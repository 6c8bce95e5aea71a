//! Weekly cadence state stored under `.guardian/state/cadence.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::atomic::write_json_atomic;
use super::lease::WriteLock;
use crate::core::cadence::{CadenceChange, CadenceState};
use crate::core::config::CadenceConfig;

/// Load cadence state; `None` when no week has been tracked yet.
pub fn load_cadence(path: &Path) -> Result<Option<CadenceState>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read cadence {}", path.display()))?;
    let state: CadenceState = serde_json::from_str(&contents)
        .with_context(|| format!("parse cadence {}", path.display()))?;
    Ok(Some(state))
}

/// Atomically write cadence state to disk (temp file + rename).
pub fn write_cadence(path: &Path, state: &CadenceState) -> Result<()> {
    debug!(path = %path.display(), week = %state.week, target = state.target, "writing cadence");
    write_json_atomic(path, state)
}

/// Read-modify-write access to the cadence file under its own lock.
#[derive(Debug, Clone)]
pub struct CadenceStore {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Result of a cadence operation: the state after it plus every change made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CadenceUpdate {
    pub state: CadenceState,
    pub changes: Vec<CadenceChange>,
}

impl CadenceStore {
    pub fn new(path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_path: lock_path.into(),
        }
    }

    /// State for the week containing `now` without touching the file.
    pub fn peek(
        &self,
        now: DateTime<Utc>,
        cfg: &CadenceConfig,
        arc_override: Option<u32>,
    ) -> Result<CadenceState> {
        Ok(match load_cadence(&self.path)? {
            Some(mut state) => {
                state.roll_week(now, cfg, arc_override);
                state
            }
            None => CadenceState::for_week(now, cfg, arc_override),
        })
    }

    /// State for the week containing `now`, rolling a stale week over.
    pub fn current(
        &self,
        now: DateTime<Utc>,
        cfg: &CadenceConfig,
        arc_override: Option<u32>,
    ) -> Result<CadenceUpdate> {
        self.update(now, cfg, arc_override, |_| None)
    }

    /// Step the current week's target down (budget pressure).
    pub fn step_down(
        &self,
        now: DateTime<Utc>,
        cfg: &CadenceConfig,
        arc_override: Option<u32>,
    ) -> Result<CadenceUpdate> {
        self.update(now, cfg, arc_override, |state| Some(state.step_down(cfg)))
    }

    /// Restore the week-start target.
    pub fn reset(
        &self,
        now: DateTime<Utc>,
        cfg: &CadenceConfig,
        arc_override: Option<u32>,
    ) -> Result<CadenceUpdate> {
        self.update(now, cfg, arc_override, |state| {
            Some(state.reset(cfg, arc_override))
        })
    }

    fn update<F>(
        &self,
        now: DateTime<Utc>,
        cfg: &CadenceConfig,
        arc_override: Option<u32>,
        apply: F,
    ) -> Result<CadenceUpdate>
    where
        F: FnOnce(&mut CadenceState) -> Option<CadenceChange>,
    {
        let _lock = WriteLock::acquire(&self.lock_path)?;
        let loaded = load_cadence(&self.path)?;
        let mut changes = Vec::new();
        let mut state = match loaded.clone() {
            Some(mut state) => {
                changes.extend(state.roll_week(now, cfg, arc_override));
                state
            }
            None => CadenceState::for_week(now, cfg, arc_override),
        };
        changes.extend(apply(&mut state));
        for change in &changes {
            info!(
                week = %change.week,
                from = change.from,
                to = change.to,
                reason = ?change.reason,
                "cadence changed"
            );
        }
        if loaded.as_ref() != Some(&state) {
            write_cadence(&self.path, &state)?;
        }
        Ok(CadenceUpdate { state, changes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cadence::CadenceReason;

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().expect("timestamp")
    }

    fn store(root: &Path) -> CadenceStore {
        CadenceStore::new(root.join("cadence.json"), root.join("cadence.lock"))
    }

    #[test]
    fn first_access_creates_week_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let update = store(temp.path())
            .current(at("2026-10-20T10:00:00Z"), &CadenceConfig::default(), None)
            .expect("current");
        assert_eq!(update.state.target, 5);
        assert!(update.changes.is_empty());
        let persisted = load_cadence(&temp.path().join("cadence.json")).expect("load");
        assert_eq!(persisted, Some(update.state));
    }

    #[test]
    fn step_down_persists_and_rolls_over_next_week() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(temp.path());
        let cfg = CadenceConfig::default();
        let stepped = store
            .step_down(at("2026-10-20T10:00:00Z"), &cfg, None)
            .expect("step");
        assert_eq!(stepped.state.target, 3);
        assert_eq!(stepped.changes[0].reason, CadenceReason::BudgetPressure);

        let rolled = store
            .current(at("2026-10-27T10:00:00Z"), &cfg, None)
            .expect("next week");
        assert_eq!(rolled.state.target, 5);
        assert_eq!(rolled.changes[0].reason, CadenceReason::WeekRollover);
    }

    #[test]
    fn peek_rolls_over_without_writing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(temp.path());
        let cfg = CadenceConfig::default();
        let path = temp.path().join("cadence.json");

        let fresh = store.peek(at("2026-10-20T10:00:00Z"), &cfg, None).expect("peek");
        assert_eq!(fresh.target, 5);
        assert!(!path.exists());

        let stepped = store
            .step_down(at("2026-10-20T10:00:00Z"), &cfg, None)
            .expect("step");
        let peeked = store.peek(at("2026-10-27T10:00:00Z"), &cfg, None).expect("peek");
        assert_eq!(peeked.target, 5);
        assert_eq!(load_cadence(&path).expect("load"), Some(stepped.state));
    }

    #[test]
    fn reset_restores_base_target() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(temp.path());
        let cfg = CadenceConfig::default();
        store
            .step_down(at("2026-10-20T10:00:00Z"), &cfg, None)
            .expect("step");
        let reset = store
            .reset(at("2026-10-21T10:00:00Z"), &cfg, Some(6))
            .expect("reset");
        assert_eq!(reset.state.target, 6);
    }
}
