//! Read-only reporting for `guardian snapshot` and `guardian estimate`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::calendar::MonthKey;
use crate::core::estimator::estimate;
use crate::core::fallback_guard::DecisionMark;
use crate::core::ledger::{BudgetSnapshot, MonthLimits};
use crate::core::selector::{BudgetPosition, budget_position};
use crate::core::types::CostEstimate;
use crate::io::config::load_config;
use crate::io::init::GuardianPaths;

/// Budget view for one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    pub month: MonthKey,
    pub ledger_version: u64,
    pub snapshot: BudgetSnapshot,
    pub limits: MonthLimits,
    pub position: BudgetPosition,
    /// Reserve this month could still lend to the previous month.
    pub lendable_cents: i64,
    pub current_plans: usize,
    pub recent_decisions: Vec<DecisionMark>,
    pub last_fallback_at: Option<DateTime<Utc>>,
}

pub fn budget_status(root: &Path, month: MonthKey) -> Result<BudgetStatus> {
    let paths = GuardianPaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    let doc = paths
        .ledger_store()
        .load()
        .with_context(|| "load ledger for snapshot")?;
    let snapshot = doc.snapshot(month);
    let limits = doc.limits(month, &cfg);
    let history = doc.fallback_history();
    Ok(BudgetStatus {
        month,
        ledger_version: doc.version,
        position: budget_position(limits, &snapshot, cfg.soft_stop_percent, false),
        lendable_cents: doc.lendable_slack(month, &cfg),
        current_plans: doc
            .current_plans()
            .into_iter()
            .filter(|plan| plan.month == month)
            .count(),
        recent_decisions: history.recent().copied().collect(),
        last_fallback_at: history.last_fallback_at(),
        snapshot,
        limits,
    })
}

/// Cost of every configured plan, richest first.
pub fn estimate_ladder(root: &Path) -> Result<Vec<CostEstimate>> {
    let paths = GuardianPaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    cfg.ladder()
        .into_iter()
        .map(|plan| Ok(estimate(plan, &cfg.rates)?))
        .collect()
}
