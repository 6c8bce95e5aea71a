//! In-memory ledger document: append-only spend entries, plan records, and
//! per-month snapshots.
//!
//! Every mutation here is applied to a working copy and persisted as a whole
//! by [`crate::io::ledger_store`], so a failed mutation is never observable.
//! Mutations validate before they touch the document.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::calendar::MonthKey;
use crate::core::config::{BudgetConfig, percent_ceil};
use crate::core::fallback_guard::{DecisionMark, FALLBACK_WINDOW, FallbackHistory};
use crate::core::types::{CostEstimate, Decider, PlanCode, ResourceKind};
use crate::error::GuardianError;

pub const LEDGER_SCHEMA_VERSION: u32 = 1;

/// Aggregate spend view for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub month: MonthKey,
    /// Always equal to the sum of the month's entries.
    pub spent_cents: i64,
    /// Advisory projection; never used for gating.
    pub forecast_cents: i64,
    /// Pulled forward from the next month's reserve.
    pub borrowed_cents: i64,
    /// Lent out of this month's reserve to the previous month.
    pub reserve_lent_cents: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BudgetSnapshot {
    pub fn empty(month: MonthKey) -> Self {
        Self {
            month,
            spent_cents: 0,
            forecast_cents: 0,
            borrowed_cents: 0,
            reserve_lent_cents: 0,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: u64,
    pub episode_id: String,
    pub resource: ResourceKind,
    /// Negative on compensating entries.
    pub quantity: i64,
    pub unit_cost_millicents: u64,
    pub total_cents: i64,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensates: Option<u64>,
}

/// A committed plan choice for one episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeCostPlan {
    pub seq: u64,
    pub episode_id: String,
    pub month: MonthKey,
    pub plan: PlanCode,
    pub estimate_cents: i64,
    pub decider: Decider,
    pub rationale: String,
    pub decided_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<u64>,
    pub entry_seqs: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub seq: u64,
    pub episode_id: String,
    pub revokes: u64,
    pub decider: Decider,
    pub reason: String,
    pub revoked_at: DateTime<Utc>,
    pub entry_seqs: Vec<u64>,
}

/// Slack pulled from `from_month`'s reserve into the month it is stored in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reallocation {
    pub seq: u64,
    pub from_month: MonthKey,
    pub amount_cents: i64,
    pub episode_id: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthLedger {
    pub snapshot: BudgetSnapshot,
    #[serde(default)]
    pub entries: Vec<LedgerEntry>,
    #[serde(default)]
    pub plans: Vec<EpisodeCostPlan>,
    #[serde(default)]
    pub revocations: Vec<Revocation>,
    #[serde(default)]
    pub reallocations: Vec<Reallocation>,
}

impl MonthLedger {
    fn new(month: MonthKey) -> Self {
        Self {
            snapshot: BudgetSnapshot::empty(month),
            entries: Vec::new(),
            plans: Vec::new(),
            revocations: Vec::new(),
            reallocations: Vec::new(),
        }
    }
}

/// Whole ledger (`.guardian/state/ledger.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDocument {
    pub schema_version: u32,
    /// Bumped on every committed write; used to detect concurrent writers.
    pub version: u64,
    /// Next sequence number for entries and records.
    pub next_seq: u64,
    pub months: BTreeMap<MonthKey, MonthLedger>,
}

impl Default for LedgerDocument {
    fn default() -> Self {
        Self {
            schema_version: LEDGER_SCHEMA_VERSION,
            version: 0,
            next_seq: 1,
            months: BTreeMap::new(),
        }
    }
}

/// Effective caps for a month after reallocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthLimits {
    pub base_cap_cents: i64,
    pub cap_cents: i64,
    pub reserve_cents: i64,
}

/// Reserve slack pulled forward as part of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReallocationPull {
    pub from_month: MonthKey,
    pub amount_cents: i64,
}

/// Inputs for [`LedgerDocument::commit`].
#[derive(Debug, Clone)]
pub struct CommitRequest<'a> {
    pub month: MonthKey,
    pub episode_id: &'a str,
    pub estimate: &'a CostEstimate,
    pub decider: Decider,
    pub rationale: String,
    pub now: DateTime<Utc>,
    /// Write a superseding record instead of failing with `AlreadyDecided`.
    pub supersede: bool,
    pub reallocation: Option<ReallocationPull>,
    /// Episodes left in the month, including this one (forecast input).
    pub episodes_remaining: u32,
}

/// Metered consumption reported outside a plan commit (e.g. a re-render).
#[derive(Debug, Clone)]
pub struct UsageRecord<'a> {
    pub month: MonthKey,
    pub episode_id: &'a str,
    pub resource: ResourceKind,
    pub quantity: u64,
    pub unit_cost_millicents: u64,
    pub now: DateTime<Utc>,
}

impl LedgerDocument {
    pub fn month(&self, month: MonthKey) -> Option<&MonthLedger> {
        self.months.get(&month)
    }

    pub fn snapshot(&self, month: MonthKey) -> BudgetSnapshot {
        self.month(month)
            .map(|ledger| ledger.snapshot.clone())
            .unwrap_or_else(|| BudgetSnapshot::empty(month))
    }

    pub fn limits(&self, month: MonthKey, cfg: &BudgetConfig) -> MonthLimits {
        let snapshot = self.snapshot(month);
        let base = cfg.monthly_cap_cents;
        MonthLimits {
            base_cap_cents: base,
            cap_cents: base + snapshot.borrowed_cents - snapshot.reserve_lent_cents,
            reserve_cents: (cfg.reserve_for(base) - snapshot.reserve_lent_cents).max(0),
        }
    }

    /// Reserve slack `month` can still lend without dropping below its floor.
    pub fn lendable_slack(&self, month: MonthKey, cfg: &BudgetConfig) -> i64 {
        if !cfg.reallocation.enabled {
            return 0;
        }
        let snapshot = self.snapshot(month);
        let limits = self.limits(month, cfg);
        let base_reserve = cfg.reserve_for(limits.base_cap_cents);
        let floor = percent_ceil(base_reserve, cfg.reallocation.floor_percent);
        let reserve_slack = base_reserve - snapshot.reserve_lent_cents - floor;
        let remaining_slack = limits.cap_cents - snapshot.spent_cents - floor;
        reserve_slack
            .min(remaining_slack)
            .min(cfg.reallocation.max_pull_cents)
            .max(0)
    }

    /// All plan records in commit order, superseded and revoked included.
    pub fn plan_records(&self) -> Vec<&EpisodeCostPlan> {
        let mut plans: Vec<&EpisodeCostPlan> = self
            .months
            .values()
            .flat_map(|ledger| ledger.plans.iter())
            .collect();
        plans.sort_by_key(|plan| plan.seq);
        plans
    }

    fn revoked_seqs(&self) -> HashSet<u64> {
        self.months
            .values()
            .flat_map(|ledger| ledger.revocations.iter().map(|rev| rev.revokes))
            .collect()
    }

    fn superseded_seqs(&self) -> HashSet<u64> {
        self.months
            .values()
            .flat_map(|ledger| ledger.plans.iter().filter_map(|plan| plan.supersedes))
            .collect()
    }

    /// Current (neither superseded nor revoked) plans in commit order.
    pub fn current_plans(&self) -> Vec<&EpisodeCostPlan> {
        let mut inactive = self.revoked_seqs();
        inactive.extend(self.superseded_seqs());
        self.plan_records()
            .into_iter()
            .filter(|plan| !inactive.contains(&plan.seq))
            .collect()
    }

    pub fn current_plan(&self, episode_id: &str) -> Option<&EpisodeCostPlan> {
        let latest = self
            .plan_records()
            .into_iter()
            .filter(|plan| plan.episode_id == episode_id)
            .max_by_key(|plan| plan.seq)?;
        if self.revoked_seqs().contains(&latest.seq) {
            return None;
        }
        Some(latest)
    }

    /// Guard history from current plans: the last seven plus the most recent
    /// fallback, wherever it falls.
    pub fn fallback_history(&self) -> FallbackHistory {
        let current = self.current_plans();
        let last_fallback_at = current
            .iter()
            .filter(|plan| plan.plan.is_fallback())
            .map(|plan| plan.decided_at)
            .max();
        let skip = current.len().saturating_sub(FALLBACK_WINDOW);
        FallbackHistory::from_marks(
            current.into_iter().skip(skip).map(|plan| DecisionMark {
                plan: plan.plan,
                decided_at: plan.decided_at,
            }),
            last_fallback_at,
        )
    }

    fn entry(&self, seq: u64) -> Option<&LedgerEntry> {
        self.months
            .values()
            .flat_map(|ledger| ledger.entries.iter())
            .find(|entry| entry.seq == seq)
    }

    fn month_mut(&mut self, month: MonthKey) -> &mut MonthLedger {
        self.months
            .entry(month)
            .or_insert_with(|| MonthLedger::new(month))
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn check_cap(
        &self,
        month: MonthKey,
        cfg: &BudgetConfig,
        delta_cents: i64,
        borrowed_cents: i64,
    ) -> Result<(), GuardianError> {
        let snapshot = self.snapshot(month);
        let cap = self.limits(month, cfg).cap_cents + borrowed_cents;
        if delta_cents > 0 && snapshot.spent_cents + delta_cents > cap {
            return Err(GuardianError::CapExceeded {
                month: month.to_string(),
                amount_cents: delta_cents,
                spent_cents: snapshot.spent_cents,
                cap_cents: cap,
            });
        }
        Ok(())
    }

    /// Append compensating entries reversing `entry_seqs` into `month`.
    fn compensate(
        &mut self,
        month: MonthKey,
        entry_seqs: &[u64],
        now: DateTime<Utc>,
    ) -> Vec<u64> {
        let originals: Vec<LedgerEntry> = entry_seqs
            .iter()
            .filter_map(|seq| self.entry(*seq).cloned())
            .collect();
        let mut seqs = Vec::with_capacity(originals.len());
        for original in originals {
            let seq = self.take_seq();
            let ledger = self.month_mut(month);
            ledger.snapshot.spent_cents -= original.total_cents;
            ledger.entries.push(LedgerEntry {
                seq,
                episode_id: original.episode_id,
                resource: original.resource,
                quantity: -original.quantity,
                unit_cost_millicents: original.unit_cost_millicents,
                total_cents: -original.total_cents,
                recorded_at: now,
                compensates: Some(original.seq),
            });
            seqs.push(seq);
        }
        seqs
    }

    /// Commit a plan choice: one entry per cost line, snapshot update, and
    /// optional reallocation and supersession, all-or-nothing.
    pub fn commit(
        &mut self,
        request: CommitRequest<'_>,
        cfg: &BudgetConfig,
    ) -> Result<EpisodeCostPlan, GuardianError> {
        let month = request.month;
        let existing = self.current_plan(request.episode_id).cloned();
        if let (Some(existing), false) = (&existing, request.supersede) {
            return Err(GuardianError::AlreadyDecided {
                episode_id: request.episode_id.to_string(),
                plan: existing.plan,
            });
        }

        let refund_same_month = existing
            .as_ref()
            .filter(|old| old.month == month)
            .map_or(0, |old| self.sum_entries(&old.entry_seqs));
        let borrowed = request.reallocation.map_or(0, |pull| pull.amount_cents);
        self.check_cap(
            month,
            cfg,
            request.estimate.total_cents - refund_same_month,
            borrowed,
        )?;

        if let Some(pull) = request.reallocation {
            let seq = self.take_seq();
            let lender = self.month_mut(pull.from_month);
            lender.snapshot.reserve_lent_cents += pull.amount_cents;
            lender.snapshot.updated_at = Some(request.now);
            let borrower = self.month_mut(month);
            borrower.snapshot.borrowed_cents += pull.amount_cents;
            borrower.reallocations.push(Reallocation {
                seq,
                from_month: pull.from_month,
                amount_cents: pull.amount_cents,
                episode_id: request.episode_id.to_string(),
                recorded_at: request.now,
            });
        }

        if let Some(old) = &existing {
            self.compensate(old.month, &old.entry_seqs, request.now);
            self.month_mut(old.month).snapshot.updated_at = Some(request.now);
        }

        let mut entry_seqs = Vec::with_capacity(request.estimate.breakdown.len());
        for line in &request.estimate.breakdown {
            let seq = self.take_seq();
            let ledger = self.month_mut(month);
            ledger.snapshot.spent_cents += line.subtotal_cents;
            ledger.entries.push(LedgerEntry {
                seq,
                episode_id: request.episode_id.to_string(),
                resource: line.resource,
                quantity: line.quantity as i64,
                unit_cost_millicents: line.unit_cost_millicents,
                total_cents: line.subtotal_cents,
                recorded_at: request.now,
                compensates: None,
            });
            entry_seqs.push(seq);
        }

        let seq = self.take_seq();
        let record = EpisodeCostPlan {
            seq,
            episode_id: request.episode_id.to_string(),
            month,
            plan: request.estimate.plan,
            estimate_cents: request.estimate.total_cents,
            decider: request.decider,
            rationale: request.rationale,
            decided_at: request.now,
            supersedes: existing.map(|old| old.seq),
            entry_seqs,
        };
        self.month_mut(month).plans.push(record.clone());
        self.refresh_forecast(month, cfg, request.episodes_remaining, request.now);
        self.version += 1;
        Ok(record)
    }

    /// Reverse an episode's current plan with compensating entries.
    pub fn revoke(
        &mut self,
        episode_id: &str,
        decider: Decider,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Revocation, GuardianError> {
        let current = self
            .current_plan(episode_id)
            .cloned()
            .ok_or_else(|| GuardianError::NotDecided {
                episode_id: episode_id.to_string(),
            })?;
        let entry_seqs = self.compensate(current.month, &current.entry_seqs, now);
        let seq = self.take_seq();
        let revocation = Revocation {
            seq,
            episode_id: episode_id.to_string(),
            revokes: current.seq,
            decider,
            reason,
            revoked_at: now,
            entry_seqs,
        };
        let ledger = self.month_mut(current.month);
        ledger.snapshot.updated_at = Some(now);
        ledger.revocations.push(revocation.clone());
        self.version += 1;
        Ok(revocation)
    }

    /// Append a metered usage entry. Refused if it would breach the hard cap.
    pub fn record_usage(
        &mut self,
        usage: UsageRecord<'_>,
        cfg: &BudgetConfig,
    ) -> Result<LedgerEntry, GuardianError> {
        let millicents = u128::from(usage.quantity) * u128::from(usage.unit_cost_millicents);
        let total_cents = i64::try_from(millicents.div_ceil(1_000)).map_err(|_| {
            GuardianError::ConfigInvalid(format!("usage cost for {} overflows", usage.resource))
        })?;
        self.check_cap(usage.month, cfg, total_cents, 0)?;
        let seq = self.take_seq();
        let entry = LedgerEntry {
            seq,
            episode_id: usage.episode_id.to_string(),
            resource: usage.resource,
            quantity: usage.quantity as i64,
            unit_cost_millicents: usage.unit_cost_millicents,
            total_cents,
            recorded_at: usage.now,
            compensates: None,
        };
        let ledger = self.month_mut(usage.month);
        ledger.snapshot.spent_cents += total_cents;
        ledger.snapshot.updated_at = Some(usage.now);
        ledger.entries.push(entry.clone());
        self.version += 1;
        Ok(entry)
    }

    fn sum_entries(&self, seqs: &[u64]) -> i64 {
        seqs.iter()
            .filter_map(|seq| self.entry(*seq))
            .map(|entry| entry.total_cents)
            .sum()
    }

    /// Mean estimate of the month's trailing current plans.
    pub fn trailing_average_estimate(&self, month: MonthKey, window: usize) -> Option<i64> {
        let estimates: Vec<i64> = self
            .current_plans()
            .into_iter()
            .filter(|plan| plan.month == month)
            .map(|plan| plan.estimate_cents)
            .collect();
        let tail = &estimates[estimates.len().saturating_sub(window)..];
        if tail.is_empty() {
            return None;
        }
        Some(tail.iter().sum::<i64>().div_euclid(tail.len() as i64))
    }

    fn refresh_forecast(
        &mut self,
        month: MonthKey,
        cfg: &BudgetConfig,
        episodes_remaining: u32,
        now: DateTime<Utc>,
    ) {
        let average = self
            .trailing_average_estimate(month, cfg.forecast_window)
            .unwrap_or(0);
        let ledger = self.month_mut(month);
        let after_this = i64::from(episodes_remaining.saturating_sub(1));
        ledger.snapshot.forecast_cents = ledger.snapshot.spent_cents + average * after_this;
        ledger.snapshot.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::estimator::estimate;
    use crate::core::types::PlanCode;

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().expect("timestamp")
    }

    fn october() -> MonthKey {
        "2026-10".parse().expect("month")
    }

    fn plan_estimate(cfg: &BudgetConfig, code: PlanCode) -> CostEstimate {
        estimate(cfg.plan(code).expect("plan"), &cfg.rates).expect("estimate")
    }

    fn request<'a>(episode_id: &'a str, est: &'a CostEstimate) -> CommitRequest<'a> {
        CommitRequest {
            month: october(),
            episode_id,
            estimate: est,
            decider: Decider::Selector,
            rationale: "test".to_string(),
            now: at("2026-10-05T10:00:00Z"),
            supersede: false,
            reallocation: None,
            episodes_remaining: 4,
        }
    }

    #[test]
    fn commit_appends_one_entry_per_component() {
        let cfg = BudgetConfig::default();
        let est = plan_estimate(&cfg, PlanCode::Saver);
        let mut doc = LedgerDocument::default();
        let record = doc.commit(request("ep-1", &est), &cfg).expect("commit");

        let month = doc.month(october()).expect("month");
        assert_eq!(month.entries.len(), est.breakdown.len());
        assert_eq!(record.entry_seqs.len(), est.breakdown.len());
        assert_eq!(month.snapshot.spent_cents, 200);
        // 200 spent + 3 more episodes at the 200 average.
        assert_eq!(month.snapshot.forecast_cents, 800);
        assert_eq!(doc.version, 1);
    }

    #[test]
    fn duplicate_commit_is_already_decided_without_change() {
        let cfg = BudgetConfig::default();
        let est = plan_estimate(&cfg, PlanCode::Minimal);
        let mut doc = LedgerDocument::default();
        doc.commit(request("ep-1", &est), &cfg).expect("commit");
        let before = doc.clone();

        let err = doc
            .commit(request("ep-1", &est), &cfg)
            .expect_err("duplicate");
        assert_eq!(
            err,
            GuardianError::AlreadyDecided {
                episode_id: "ep-1".to_string(),
                plan: PlanCode::Minimal
            }
        );
        assert_eq!(doc, before);
    }

    #[test]
    fn supersede_compensates_old_entries() {
        let cfg = BudgetConfig::default();
        let full = plan_estimate(&cfg, PlanCode::Full);
        let saver = plan_estimate(&cfg, PlanCode::Saver);
        let mut doc = LedgerDocument::default();
        let first = doc.commit(request("ep-1", &full), &cfg).expect("commit");

        let mut second = request("ep-1", &saver);
        second.supersede = true;
        second.decider = Decider::Admin {
            name: "ops".to_string(),
        };
        let record = doc.commit(second, &cfg).expect("supersede");

        assert_eq!(record.supersedes, Some(first.seq));
        assert_eq!(doc.snapshot(october()).spent_cents, 200);
        let compensations: Vec<&LedgerEntry> = doc
            .month(october())
            .expect("month")
            .entries
            .iter()
            .filter(|entry| entry.compensates.is_some())
            .collect();
        assert_eq!(compensations.len(), full.breakdown.len());
        assert!(compensations.iter().all(|entry| entry.total_cents < 0));
        assert_eq!(doc.current_plan("ep-1").map(|p| p.plan), Some(PlanCode::Saver));
    }

    #[test]
    fn commit_refuses_to_breach_hard_cap() {
        let mut cfg = BudgetConfig::default();
        cfg.monthly_cap_cents = 500;
        let full = plan_estimate(&cfg, PlanCode::Full);
        let mut doc = LedgerDocument::default();
        let err = doc.commit(request("ep-1", &full), &cfg).expect_err("cap");
        assert!(matches!(err, GuardianError::CapExceeded { cap_cents: 500, .. }));
        assert_eq!(doc, LedgerDocument::default());
    }

    #[test]
    fn reallocation_moves_reserve_between_months() {
        let cfg = BudgetConfig::default();
        let november = october().next();
        assert_eq!(LedgerDocument::default().lendable_slack(november, &cfg), 1_500);

        let est = plan_estimate(&cfg, PlanCode::Saver);
        let mut doc = LedgerDocument::default();
        let mut req = request("ep-1", &est);
        req.reallocation = Some(ReallocationPull {
            from_month: november,
            amount_cents: 120,
        });
        doc.commit(req, &cfg).expect("commit");

        assert_eq!(doc.snapshot(october()).borrowed_cents, 120);
        assert_eq!(doc.snapshot(november).reserve_lent_cents, 120);
        assert_eq!(doc.limits(october(), &cfg).cap_cents, 15_120);
        assert_eq!(doc.limits(november, &cfg).cap_cents, 14_880);
        assert_eq!(doc.limits(november, &cfg).reserve_cents, 2_880);
        assert_eq!(doc.lendable_slack(november, &cfg), 1_380);
    }

    #[test]
    fn revoke_restores_spend_and_clears_current_plan() {
        let cfg = BudgetConfig::default();
        let est = plan_estimate(&cfg, PlanCode::Full);
        let mut doc = LedgerDocument::default();
        doc.commit(request("ep-1", &est), &cfg).expect("commit");

        let revocation = doc
            .revoke(
                "ep-1",
                Decider::Admin {
                    name: "ops".to_string(),
                },
                "render cancelled".to_string(),
                at("2026-10-06T10:00:00Z"),
            )
            .expect("revoke");
        assert_eq!(revocation.entry_seqs.len(), est.breakdown.len());
        assert_eq!(doc.snapshot(october()).spent_cents, 0);
        assert!(doc.current_plan("ep-1").is_none());

        let err = doc
            .revoke("ep-1", Decider::Selector, "again".into(), at("2026-10-07T10:00:00Z"))
            .expect_err("nothing to revoke");
        assert!(matches!(err, GuardianError::NotDecided { .. }));
    }

    #[test]
    fn fallback_history_uses_current_plans_in_commit_order() {
        let cfg = BudgetConfig::default();
        let fallback = plan_estimate(&cfg, PlanCode::FallbackDm);
        let saver = plan_estimate(&cfg, PlanCode::Saver);
        let mut doc = LedgerDocument::default();
        doc.commit(request("ep-1", &fallback), &cfg).expect("ep-1");
        let mut req = request("ep-2", &saver);
        req.now = at("2026-10-08T10:00:00Z");
        doc.commit(req, &cfg).expect("ep-2");

        let history = doc.fallback_history();
        let plans: Vec<PlanCode> = history.recent().map(|mark| mark.plan).collect();
        assert_eq!(plans, vec![PlanCode::FallbackDm, PlanCode::Saver]);
        assert_eq!(history.last_fallback_at(), Some(at("2026-10-05T10:00:00Z")));
    }

    #[test]
    fn usage_entries_count_toward_spend() {
        let cfg = BudgetConfig::default();
        let mut doc = LedgerDocument::default();
        doc.record_usage(
            UsageRecord {
                month: october(),
                episode_id: "ep-9",
                resource: ResourceKind::RenderMinutes,
                quantity: 3,
                unit_cost_millicents: 4_500,
                now: at("2026-10-02T10:00:00Z"),
            },
            &cfg,
        )
        .expect("usage");
        assert_eq!(doc.snapshot(october()).spent_cents, 14);
    }
}
