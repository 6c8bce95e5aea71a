//! Weekly production target: step-down under pressure, reset at rollover.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::calendar::week_key;
use crate::core::config::CadenceConfig;

/// Persisted weekly target (`.guardian/state/cadence.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceState {
    /// ISO week the target applies to.
    pub week: String,
    /// Episodes the scheduler should attempt this week.
    pub target: u32,
    /// Target the week started with (default or event-arc override).
    pub base_target: u32,
    pub step_downs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceReason {
    WeekRollover,
    BudgetPressure,
    ManualReset,
}

/// A cadence mutation, reported to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceChange {
    pub week: String,
    pub from: u32,
    pub to: u32,
    pub reason: CadenceReason,
}

impl CadenceState {
    /// Fresh state for the week containing `now`.
    ///
    /// An event-arc override can only raise the target; it is advisory and
    /// never bypasses per-episode feasibility.
    pub fn for_week(now: DateTime<Utc>, cfg: &CadenceConfig, arc_override: Option<u32>) -> Self {
        let base = week_start_target(cfg, arc_override);
        Self {
            week: week_key(now),
            target: base,
            base_target: base,
            step_downs: 0,
        }
    }

    /// Lower the target by one step, never below the floor.
    pub fn step_down(&mut self, cfg: &CadenceConfig) -> CadenceChange {
        let from = self.target;
        let to = from
            .saturating_sub(cfg.step_down)
            .max(cfg.min_shorts_per_week);
        self.target = to;
        if to < from {
            self.step_downs += 1;
        }
        CadenceChange {
            week: self.week.clone(),
            from,
            to,
            reason: CadenceReason::BudgetPressure,
        }
    }

    /// Reset to the week-start target if `now` falls in a later week.
    pub fn roll_week(
        &mut self,
        now: DateTime<Utc>,
        cfg: &CadenceConfig,
        arc_override: Option<u32>,
    ) -> Option<CadenceChange> {
        let week = week_key(now);
        if week == self.week {
            return None;
        }
        let from = self.target;
        *self = Self::for_week(now, cfg, arc_override);
        Some(CadenceChange {
            week,
            from,
            to: self.target,
            reason: CadenceReason::WeekRollover,
        })
    }

    /// Restore the week-start target without waiting for rollover.
    pub fn reset(&mut self, cfg: &CadenceConfig, arc_override: Option<u32>) -> CadenceChange {
        let from = self.target;
        let base = week_start_target(cfg, arc_override);
        self.target = base;
        self.base_target = base;
        self.step_downs = 0;
        CadenceChange {
            week: self.week.clone(),
            from,
            to: base,
            reason: CadenceReason::ManualReset,
        }
    }
}

fn week_start_target(cfg: &CadenceConfig, arc_override: Option<u32>) -> u32 {
    let base = cfg.default_shorts_per_week.max(cfg.min_shorts_per_week);
    arc_override.map_or(base, |raised| raised.max(base))
}
