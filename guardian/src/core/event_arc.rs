//! Event arc windows: read-only input that boosts score and may raise cadence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::MAX_SHORTS_PER_WEEK;

/// One `[[arc]]` entry of `.guardian/state/event_arcs.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventArc {
    pub name: String,
    pub starts_at: DateTime<Utc>,
    /// Exclusive.
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub priority: bool,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Weekly target while the arc runs; only ever raises the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadence_override: Option<u32>,
}

fn default_active() -> bool {
    true
}

impl EventArc {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.active && self.starts_at <= at && at < self.ends_at
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventArcRegistry {
    #[serde(rename = "arc")]
    pub arcs: Vec<EventArc>,
}

impl EventArcRegistry {
    /// Earliest-starting active priority arc covering `at`.
    pub fn priority_arc_at(&self, at: DateTime<Utc>) -> Option<&EventArc> {
        self.arcs
            .iter()
            .filter(|arc| arc.priority && arc.covers(at))
            .min_by(|a, b| a.starts_at.cmp(&b.starts_at).then_with(|| a.name.cmp(&b.name)))
    }

    /// Largest cadence override among active arcs covering `at`.
    pub fn cadence_override_at(&self, at: DateTime<Utc>) -> Option<u32> {
        self.arcs
            .iter()
            .filter(|arc| arc.covers(at))
            .filter_map(|arc| arc.cadence_override)
            .max()
    }

    pub fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for arc in &self.arcs {
            if arc.name.trim().is_empty() {
                errors.push("event arc with empty name".to_string());
            }
            if arc.ends_at <= arc.starts_at {
                errors.push(format!("event arc '{}': ends_at must be after starts_at", arc.name));
            }
            match arc.cadence_override {
                Some(0) => errors.push(format!(
                    "event arc '{}': cadence_override must be > 0",
                    arc.name
                )),
                Some(target) if target > MAX_SHORTS_PER_WEEK => errors.push(format!(
                    "event arc '{}': cadence_override must be <= {MAX_SHORTS_PER_WEEK}",
                    arc.name
                )),
                _ => {}
            }
        }
        errors
    }
}
