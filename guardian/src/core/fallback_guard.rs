//! Fallback quota checks over recent committed decisions.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::PolicyConfig;
use crate::core::types::PlanCode;

/// Size of the rolling episode window the fallback quota applies to.
pub const FALLBACK_WINDOW: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMark {
    pub plan: PlanCode,
    pub decided_at: DateTime<Utc>,
}

/// Bounded log of the most recent committed decisions, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackHistory {
    recent: VecDeque<DecisionMark>,
    last_fallback_at: Option<DateTime<Utc>>,
}

impl FallbackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a committed decision, evicting the oldest beyond the window.
    pub fn record(&mut self, plan: PlanCode, decided_at: DateTime<Utc>) {
        if self.recent.len() == FALLBACK_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(DecisionMark { plan, decided_at });
        if plan.is_fallback() && self.last_fallback_at.is_none_or(|last| decided_at > last) {
            self.last_fallback_at = Some(decided_at);
        }
    }

    /// Build from decisions in commit order. `last_fallback_at` is supplied
    /// separately when the most recent fallback predates the window.
    pub fn from_marks(
        marks: impl IntoIterator<Item = DecisionMark>,
        last_fallback_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut history = Self {
            recent: VecDeque::with_capacity(FALLBACK_WINDOW),
            last_fallback_at,
        };
        for mark in marks {
            history.record(mark.plan, mark.decided_at);
        }
        history
    }

    pub fn recent(&self) -> impl Iterator<Item = &DecisionMark> {
        self.recent.iter()
    }

    pub fn fallback_count(&self) -> usize {
        self.recent.iter().filter(|mark| mark.plan.is_fallback()).count()
    }

    pub fn previous(&self) -> Option<&DecisionMark> {
        self.recent.back()
    }

    pub fn last_fallback_at(&self) -> Option<DateTime<Utc>> {
        self.last_fallback_at
    }
}

/// Why a fallback request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FallbackDenial {
    WindowQuota { count: u32, max: u32 },
    TooSoon { hours_since_last: i64, min_days: u32 },
    ConsecutiveFallback,
}

impl std::fmt::Display for FallbackDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackDenial::WindowQuota { count, max } => write!(
                f,
                "{count} fallbacks in last {FALLBACK_WINDOW} episodes (max {max})"
            ),
            FallbackDenial::TooSoon {
                hours_since_last,
                min_days,
            } => write!(
                f,
                "last fallback {hours_since_last}h ago (min {min_days} days)"
            ),
            FallbackDenial::ConsecutiveFallback => {
                f.write_str("previous committed episode was a fallback")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardVerdict {
    pub denials: Vec<FallbackDenial>,
}

impl GuardVerdict {
    pub fn allowed(&self) -> bool {
        self.denials.is_empty()
    }
}

/// Decide whether a fallback may be committed at `now`. Pure read.
pub fn allow_fallback(
    history: &FallbackHistory,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> GuardVerdict {
    let mut denials = Vec::new();

    let count = history.fallback_count() as u32;
    if count >= policy.max_fallback_per_7eps {
        denials.push(FallbackDenial::WindowQuota {
            count,
            max: policy.max_fallback_per_7eps,
        });
    }

    if let Some(last) = history.last_fallback_at() {
        let elapsed = now - last;
        if elapsed < Duration::days(i64::from(policy.min_days_between_fallback)) {
            denials.push(FallbackDenial::TooSoon {
                hours_since_last: elapsed.num_hours(),
                min_days: policy.min_days_between_fallback,
            });
        }
    }

    if history.previous().is_some_and(|mark| mark.plan.is_fallback()) {
        denials.push(FallbackDenial::ConsecutiveFallback);
    }

    GuardVerdict { denials }
}
