//! Append-only admin notifications (`.guardian/notifications.jsonl`).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::calendar::MonthKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BudgetExhausted,
    FallbackQuotaExceeded,
    SoftStopReached,
    CadenceReduced,
    ReallocationApplied,
    PlanOverridden,
    PlanRevoked,
    OutageFallback,
}

/// One JSON line consumed by whoever watches the budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub episode_id: String,
    pub reason: String,
    pub proposed_action: String,
    pub month: MonthKey,
    pub at: DateTime<Utc>,
}

/// Append notifications as JSON lines, one write per line.
pub fn append_notifications(path: &Path, notifications: &[Notification]) -> Result<()> {
    if notifications.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    for notification in notifications {
        warn!(
            kind = ?notification.kind,
            episode_id = %notification.episode_id,
            month = %notification.month,
            reason = %notification.reason,
            "budget notification"
        );
        let mut line = serde_json::to_string(notification).context("serialize notification")?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", path.display()))?;
    }
    Ok(())
}

/// Read all notifications; a missing file means none.
pub fn read_notifications(path: &Path) -> Result<Vec<Notification>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {} line {}", path.display(), index + 1))
        })
        .collect()
}
