//! Test-only helpers for building episodes and scratch guardian workspaces.

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::core::calendar::MonthKey;
use crate::core::config::BudgetConfig;
use crate::core::estimator::estimate;
use crate::core::ledger::{CommitRequest, LedgerDocument, UsageRecord};
use crate::core::types::{Decider, EpisodeAttributes, EpisodeKind, PlanCode, ResourceKind};
use crate::decide::DecisionRequest;
use crate::io::config::{load_config, write_config};
use crate::io::init::{GuardianPaths, InitOptions, init_guardian};
use crate::io::ledger_store::write_ledger;

/// Parse an RFC 3339 timestamp; panics on malformed input.
pub fn ts(value: &str) -> DateTime<Utc> {
    value
        .parse()
        .unwrap_or_else(|err| panic!("bad timestamp '{value}': {err}"))
}

/// A standard-importance short scheduled at `scheduled_at`.
pub fn episode(id: &str, scheduled_at: DateTime<Utc>) -> EpisodeAttributes {
    EpisodeAttributes {
        episode_id: id.to_string(),
        kind: EpisodeKind::Short,
        importance: 5,
        is_event_arc: false,
        scheduled_at,
        deadline: None,
    }
}

/// Scheduled decision for `id` evaluated (and scheduled) at `now`.
pub fn request(id: &str, now: DateTime<Utc>) -> DecisionRequest {
    DecisionRequest {
        episode: episode(id, now),
        now,
        episodes_remaining: None,
        budget_override: false,
    }
}

/// Same as [`request`] with an explicit `episodes_remaining`.
pub fn request_with_remaining(id: &str, now: DateTime<Utc>, remaining: u32) -> DecisionRequest {
    DecisionRequest {
        episodes_remaining: Some(remaining),
        ..request(id, now)
    }
}

/// An initialized `.guardian/` in a temp dir, removed on drop.
pub struct TestWorkspace {
    _temp: TempDir,
    pub paths: GuardianPaths,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let paths = init_guardian(temp.path(), &InitOptions { force: false })
            .unwrap_or_else(|err| panic!("init guardian: {err:#}"));
        Self { _temp: temp, paths }
    }

    pub fn with_config(cfg: &BudgetConfig) -> Self {
        let workspace = Self::new();
        workspace.write_config(cfg);
        workspace
    }

    pub fn root(&self) -> &std::path::Path {
        &self.paths.root
    }

    pub fn write_config(&self, cfg: &BudgetConfig) {
        write_config(&self.paths.config_path, cfg)
            .unwrap_or_else(|err| panic!("write config: {err:#}"));
    }

    pub fn write_event_arcs(&self, toml: &str) {
        std::fs::write(&self.paths.event_arcs_path, toml)
            .unwrap_or_else(|err| panic!("write event arcs: {err}"));
    }

    pub fn config(&self) -> BudgetConfig {
        load_config(&self.paths.config_path).unwrap_or_else(|err| panic!("load config: {err:#}"))
    }

    pub fn ledger(&self) -> LedgerDocument {
        self.paths
            .ledger_store()
            .load()
            .unwrap_or_else(|err| panic!("load ledger: {err:#}"))
    }

    /// Record `cents` of render usage against `month` directly in the ledger.
    pub fn seed_spend(&self, month: MonthKey, cents: u64, at: DateTime<Utc>) {
        let mut doc = self.ledger();
        doc.record_usage(
            UsageRecord {
                month,
                episode_id: "seed",
                resource: ResourceKind::RenderMinutes,
                quantity: cents,
                unit_cost_millicents: 1_000,
                now: at,
            },
            &self.config(),
        )
        .unwrap_or_else(|err| panic!("seed spend: {err}"));
        write_ledger(&self.paths.ledger_path, &doc)
            .unwrap_or_else(|err| panic!("write ledger: {err:#}"));
    }

    /// Write a selector-committed `plan` for `episode_id` straight into the
    /// ledger, bypassing selection and the fallback guard.
    pub fn seed_plan(&self, episode_id: &str, plan: PlanCode, at: DateTime<Utc>) {
        let cfg = self.config();
        let definition = cfg
            .plan(plan)
            .unwrap_or_else(|| panic!("plan '{plan}' is not configured"));
        let cost = estimate(definition, &cfg.rates).unwrap_or_else(|err| panic!("estimate: {err}"));
        let mut doc = self.ledger();
        doc.commit(
            CommitRequest {
                month: MonthKey::of(at),
                episode_id,
                estimate: &cost,
                decider: Decider::Selector,
                rationale: format!("seeded {plan}"),
                now: at,
                supersede: false,
                reallocation: None,
                episodes_remaining: 1,
            },
            &cfg,
        )
        .unwrap_or_else(|err| panic!("seed plan: {err}"));
        write_ledger(&self.paths.ledger_path, &doc)
            .unwrap_or_else(|err| panic!("write ledger: {err:#}"));
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
