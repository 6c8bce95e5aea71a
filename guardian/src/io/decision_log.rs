//! Per-episode evaluation records under `.guardian/decisions/<month>/`.
//!
//! Every selection (committed or delayed) is kept, so an episode that was
//! delayed and later decided shows its full history in one file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::atomic::write_json_atomic;
use crate::core::calendar::MonthKey;
use crate::core::selector::SelectionReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTrigger {
    Schedule,
    Outage,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord<'a> {
    pub episode_id: &'a str,
    pub month: MonthKey,
    pub trigger: DecisionTrigger,
    pub evaluated_at: DateTime<Utc>,
    /// Ledger version the selection read.
    pub ledger_version: u64,
    pub committed: bool,
    pub report: &'a SelectionReport,
}

pub fn decision_record_path(decisions_dir: &Path, month: MonthKey, episode_id: &str) -> PathBuf {
    decisions_dir
        .join(month.to_string())
        .join(format!("{episode_id}.json"))
}

/// Append a record to the episode's evaluation file.
pub fn append_decision_record(
    decisions_dir: &Path,
    record: &DecisionRecord<'_>,
) -> Result<PathBuf> {
    let path = decision_record_path(decisions_dir, record.month, record.episode_id);
    let mut records = read_decision_records(&path)?;
    records.push(serde_json::to_value(record).context("serialize decision record")?);
    write_json_atomic(&path, &records)?;
    Ok(path)
}

/// Records for one episode file, oldest first.
pub fn read_decision_records(path: &Path) -> Result<Vec<Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}
