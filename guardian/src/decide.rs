//! Orchestration for one episode decision: lease, select, commit, report.
//!
//! Config and the event arc registry are re-read on every call. The month
//! lease is held from the ledger read until the commit (or delay bookkeeping)
//! is durable; reallocation additionally takes the next month's lease.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::cadence::CadenceChange;
use crate::core::calendar::{MonthKey, episodes_remaining_in_month};
use crate::core::config::{BudgetConfig, OutageFallbackPolicy};
use crate::core::event_arc::EventArcRegistry;
use crate::core::fallback_guard::FallbackHistory;
use crate::core::ledger::{
    BudgetSnapshot, CommitRequest, EpisodeCostPlan, LedgerDocument, ReallocationPull,
};
use crate::core::selector::{
    DelayReason, SelectionContext, SelectionReport, Verdict, select_outage_fallback, select_plan,
};
use crate::core::types::{CostEstimate, Decider, EpisodeAttributes};
use crate::error::{GuardianError, guardian_error};
use crate::io::cadence_store::CadenceUpdate;
use crate::io::config::load_config;
use crate::io::decision_log::{DecisionRecord, DecisionTrigger, append_decision_record};
use crate::io::event_arcs::load_event_arcs;
use crate::io::init::GuardianPaths;
use crate::io::lease::MonthLease;
use crate::io::notifications::{Notification, NotificationKind, append_notifications};

static EPISODE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("episode id pattern compiles")
});

/// Episode ids become file names under `decisions/`, so keep them tame.
pub fn validate_episode_id(episode_id: &str) -> Result<(), GuardianError> {
    if EPISODE_ID_RE.is_match(episode_id) {
        Ok(())
    } else {
        Err(GuardianError::InvalidEpisodeId(episode_id.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub episode: EpisodeAttributes,
    pub now: DateTime<Utc>,
    /// Episodes left this month including this one. Derived from the
    /// calendar and the current weekly target when absent.
    pub episodes_remaining: Option<u32>,
    /// Ignore reserve and soft stop. The hard cap still applies.
    pub budget_override: bool,
}

#[derive(Debug, Clone)]
pub struct OutageRequest {
    pub episode: EpisodeAttributes,
    pub now: DateTime<Utc>,
    /// What failed, e.g. "tts provider timeout".
    pub reason: String,
    pub episodes_remaining: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommittedDecision {
    pub plan: EpisodeCostPlan,
    pub estimate: CostEstimate,
    pub snapshot: BudgetSnapshot,
    pub reallocated_cents: i64,
    pub rationale: String,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DelayedDecision {
    pub episode_id: String,
    pub month: MonthKey,
    pub reason: DelayReason,
    pub rationale: String,
    /// Weekly target after the step-down.
    pub weekly_target: u32,
    pub cadence_changes: Vec<CadenceChange>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Committed(CommittedDecision),
    Delayed(DelayedDecision),
}

impl DecisionOutcome {
    pub fn committed(&self) -> Option<&CommittedDecision> {
        match self {
            DecisionOutcome::Committed(decision) => Some(decision),
            DecisionOutcome::Delayed(_) => None,
        }
    }

    pub fn delayed(&self) -> Option<&DelayedDecision> {
        match self {
            DecisionOutcome::Delayed(decision) => Some(decision),
            DecisionOutcome::Committed(_) => None,
        }
    }
}

/// Inputs shared by the scheduled and outage paths, read under the lease.
struct Session {
    cfg: BudgetConfig,
    arcs: EventArcRegistry,
    month: MonthKey,
    doc: LedgerDocument,
    arc_override: Option<u32>,
    episodes_remaining: u32,
    _lease: MonthLease,
}

impl Session {
    fn open(
        paths: &GuardianPaths,
        episode: &EpisodeAttributes,
        now: DateTime<Utc>,
        episodes_remaining: Option<u32>,
    ) -> Result<Self> {
        validate_episode_id(&episode.episode_id)?;
        let cfg = load_config(&paths.config_path)?;
        let arcs = load_event_arcs(&paths.event_arcs_path)?;
        let month = MonthKey::of(now);
        let lease = MonthLease::try_acquire(&paths.locks_dir, month)?;
        let doc = paths.ledger_store().load()?;
        let arc_override = arcs.cadence_override_at(now);
        let episodes_remaining = match episodes_remaining {
            Some(remaining) => remaining,
            None => {
                let cadence = paths.cadence_store().peek(now, &cfg.cadence, arc_override)?;
                episodes_remaining_in_month(now, cadence.target)
            }
        }
        .max(1);
        debug!(
            %month,
            episode_id = %episode.episode_id,
            ledger_version = doc.version,
            episodes_remaining,
            "decision session opened"
        );
        Ok(Self {
            cfg,
            arcs,
            month,
            doc,
            arc_override,
            episodes_remaining,
            _lease: lease,
        })
    }

    fn context<'a>(
        &'a self,
        episode: &'a EpisodeAttributes,
        snapshot: &'a BudgetSnapshot,
        history: &'a FallbackHistory,
        budget_override: bool,
        now: DateTime<Utc>,
    ) -> SelectionContext<'a> {
        SelectionContext {
            config: &self.cfg,
            snapshot,
            limits: self.doc.limits(self.month, &self.cfg),
            episode,
            in_priority_arc: self.arcs.priority_arc_at(episode.scheduled_at).is_some(),
            episodes_remaining: self.episodes_remaining,
            budget_override,
            history,
            now,
        }
    }
}

/// Decide one scheduled episode.
///
/// Returns `Committed` with the durable plan record, or `Delayed` after the
/// cadence step-down and notifications. Contention surfaces as retryable
/// `LockBusy` / `LedgerWriteConflict` errors; nothing is written in that case.
pub fn decide(paths: &GuardianPaths, request: &DecisionRequest) -> Result<DecisionOutcome> {
    let episode = &request.episode;
    let session = Session::open(paths, episode, request.now, request.episodes_remaining)?;
    if let Some(existing) = session.doc.current_plan(&episode.episode_id) {
        return Err(GuardianError::AlreadyDecided {
            episode_id: episode.episode_id.clone(),
            plan: existing.plan,
        }
        .into());
    }

    let snapshot = session.doc.snapshot(session.month);
    let history = session.doc.fallback_history();
    let ctx = session.context(episode, &snapshot, &history, request.budget_override, request.now);

    let next_month = session.month.next();
    let mut next_lease: Option<MonthLease> = None;
    let report = select_plan(&ctx, |gap| {
        let lease = MonthLease::try_acquire(&paths.locks_dir, next_month)?;
        let slack = session.doc.lendable_slack(next_month, &session.cfg);
        debug!(%next_month, gap, slack, "reallocation requested");
        next_lease = Some(lease);
        Ok(slack.min(gap))
    })?;

    let mut notifications = Vec::new();
    if report.position.soft_stop_reached {
        notifications.push(notification(
            NotificationKind::SoftStopReached,
            &session,
            episode,
            request.now,
            format!(
                "spent {}c of {}c crossed soft stop at {}%",
                report.position.spent_cents,
                report.position.cap_cents,
                session.cfg.soft_stop_percent
            ),
            "richer plans rejected; review budget or override".to_string(),
        ));
    }

    let outcome = finish(
        paths,
        &session,
        episode,
        &report,
        Finish {
            trigger: DecisionTrigger::Schedule,
            decider: Decider::Selector,
            rationale: report.rationale.clone(),
            supersede: false,
            now: request.now,
        },
        notifications,
    );
    drop(next_lease);
    outcome
}

/// Handle a render failure or provider outage by requesting `fallback_dm`.
///
/// A current non-fallback plan for the episode is superseded. Quotas apply
/// unless `policy.outage_fallback = "exempt"`; the hard cap always does.
pub fn report_outage(paths: &GuardianPaths, request: &OutageRequest) -> Result<DecisionOutcome> {
    let episode = &request.episode;
    let session = Session::open(paths, episode, request.now, request.episodes_remaining)?;
    let existing = session.doc.current_plan(&episode.episode_id);
    if let Some(existing) = existing {
        if existing.plan.is_fallback() {
            return Err(GuardianError::AlreadyDecided {
                episode_id: episode.episode_id.clone(),
                plan: existing.plan,
            }
            .into());
        }
    }

    let snapshot = session.doc.snapshot(session.month);
    let history = session.doc.fallback_history();
    let ctx = session.context(episode, &snapshot, &history, false, request.now);
    let enforce = session.cfg.policy.outage_fallback == OutageFallbackPolicy::EnforceQuotas;
    let report = select_outage_fallback(&ctx, enforce)?;
    warn!(
        episode_id = %episode.episode_id,
        reason = %request.reason,
        enforce_quotas = enforce,
        "outage fallback requested"
    );

    let mut notifications = Vec::new();
    if report.chosen().is_some() {
        notifications.push(notification(
            NotificationKind::OutageFallback,
            &session,
            episode,
            request.now,
            request.reason.clone(),
            "publish fallback_dm; investigate the failing provider".to_string(),
        ));
    }
    finish(
        paths,
        &session,
        episode,
        &report,
        Finish {
            trigger: DecisionTrigger::Outage,
            decider: Decider::Outage,
            rationale: format!("outage: {}; {}", request.reason, report.rationale),
            supersede: existing.is_some(),
            now: request.now,
        },
        notifications,
    )
}

/// Retry [`decide`] on `LockBusy` / `LedgerWriteConflict`.
///
/// Sleeps `retry.backoff_ms × attempt` between attempts via `sleep`; config
/// (including the retry section) is re-read on every attempt.
pub fn decide_with_retry<S>(
    paths: &GuardianPaths,
    request: &DecisionRequest,
    mut sleep: S,
) -> Result<DecisionOutcome>
where
    S: FnMut(Duration),
{
    let mut attempt = 1;
    loop {
        let retry = load_config(&paths.config_path)?.retry;
        match decide(paths, request) {
            Err(err)
                if attempt < retry.max_attempts
                    && guardian_error(&err).is_some_and(GuardianError::is_retryable) =>
            {
                let backoff = Duration::from_millis(retry.backoff_ms * u64::from(attempt));
                debug!(attempt, ?backoff, error = %err, "retrying decision");
                sleep(backoff);
                attempt += 1;
            }
            result => return result,
        }
    }
}

struct Finish {
    trigger: DecisionTrigger,
    decider: Decider,
    rationale: String,
    supersede: bool,
    now: DateTime<Utc>,
}

fn finish(
    paths: &GuardianPaths,
    session: &Session,
    episode: &EpisodeAttributes,
    report: &SelectionReport,
    finish: Finish,
    mut notifications: Vec<Notification>,
) -> Result<DecisionOutcome> {
    let outcome = match &report.verdict {
        Verdict::Commit {
            estimate,
            reallocated_cents,
        } => {
            let reallocation = (*reallocated_cents > 0).then(|| ReallocationPull {
                from_month: session.month.next(),
                amount_cents: *reallocated_cents,
            });
            let (plan, doc) = paths.ledger_store().transact(session.doc.version, |doc| {
                let record = doc.commit(
                    CommitRequest {
                        month: session.month,
                        episode_id: &episode.episode_id,
                        estimate,
                        decider: finish.decider.clone(),
                        rationale: finish.rationale.clone(),
                        now: finish.now,
                        supersede: finish.supersede,
                        reallocation,
                        episodes_remaining: session.episodes_remaining,
                    },
                    &session.cfg,
                )?;
                Ok(record)
            })?;
            if let Some(pull) = reallocation {
                notifications.push(notification(
                    NotificationKind::ReallocationApplied,
                    session,
                    episode,
                    finish.now,
                    format!(
                        "borrowed {}c from {} reserve for {}",
                        pull.amount_cents, pull.from_month, plan.plan
                    ),
                    format!("expect {}c less headroom in {}", pull.amount_cents, pull.from_month),
                ));
            }
            info!(
                month = %session.month,
                episode_id = %episode.episode_id,
                plan = %plan.plan,
                estimate_cents = estimate.total_cents,
                usable_cents = report.position.usable_cents,
                "plan committed"
            );
            let rollover = paths
                .cadence_store()
                .current(finish.now, &session.cfg.cadence, session.arc_override);
            if let Err(err) = rollover {
                warn!(
                    episode_id = %episode.episode_id,
                    error = %format!("{err:#}"),
                    "cadence rollover not saved"
                );
            }
            DecisionOutcome::Committed(CommittedDecision {
                estimate: estimate.clone(),
                snapshot: doc.snapshot(session.month),
                reallocated_cents: *reallocated_cents,
                rationale: plan.rationale.clone(),
                plan,
                notifications: Vec::new(),
            })
        }
        Verdict::Delay { reason } => {
            let cadence = paths
                .cadence_store()
                .step_down(finish.now, &session.cfg.cadence, session.arc_override)?;
            delay_notifications(session, episode, reason, &cadence, finish.now, &mut notifications);
            warn!(
                month = %session.month,
                episode_id = %episode.episode_id,
                reason = reason.kind(),
                weekly_target = cadence.state.target,
                "episode delayed"
            );
            DecisionOutcome::Delayed(DelayedDecision {
                episode_id: episode.episode_id.clone(),
                month: session.month,
                reason: reason.clone(),
                rationale: finish.rationale.clone(),
                weekly_target: cadence.state.target,
                cadence_changes: cadence.changes,
                notifications: Vec::new(),
            })
        }
    };

    let committed = matches!(outcome, DecisionOutcome::Committed(_));
    let recorded = append_decision_record(
        &paths.decisions_dir,
        &DecisionRecord {
            episode_id: &episode.episode_id,
            month: session.month,
            trigger: finish.trigger,
            evaluated_at: finish.now,
            ledger_version: session.doc.version,
            committed,
            report,
        },
    )
    .map(|_| ());
    let notified = append_notifications(&paths.notifications_path, &notifications);
    // A committed plan is already durable; audit failures must not fail it.
    for audit in [recorded, notified] {
        match audit {
            Err(err) if committed => warn!(
                month = %session.month,
                episode_id = %episode.episode_id,
                error = %format!("{err:#}"),
                "decision committed but audit trail not written"
            ),
            result => result?,
        }
    }

    Ok(match outcome {
        DecisionOutcome::Committed(decision) => DecisionOutcome::Committed(CommittedDecision {
            notifications,
            ..decision
        }),
        DecisionOutcome::Delayed(decision) => DecisionOutcome::Delayed(DelayedDecision {
            notifications,
            ..decision
        }),
    })
}

fn delay_notifications(
    session: &Session,
    episode: &EpisodeAttributes,
    reason: &DelayReason,
    cadence: &CadenceUpdate,
    now: DateTime<Utc>,
    notifications: &mut Vec<Notification>,
) {
    let (kind, why) = match reason {
        DelayReason::BudgetExhausted {
            fallback_cents,
            limit_cents,
        } => (
            NotificationKind::BudgetExhausted,
            format!("fallback needs {fallback_cents}c but only {limit_cents}c is left"),
        ),
        DelayReason::FallbackQuotaExceeded { denials } => {
            let denials: Vec<String> = denials.iter().map(ToString::to_string).collect();
            (
                NotificationKind::FallbackQuotaExceeded,
                format!("fallback refused: {}", denials.join(", ")),
            )
        }
    };
    notifications.push(notification(
        kind,
        session,
        episode,
        now,
        why,
        "delay episode to a later cycle".to_string(),
    ));
    for change in &cadence.changes {
        if change.to < change.from {
            notifications.push(notification(
                NotificationKind::CadenceReduced,
                session,
                episode,
                now,
                format!("weekly target {} -> {} for {}", change.from, change.to, change.week),
                format!("schedule at most {} episodes this week", change.to),
            ));
        }
    }
}

fn notification(
    kind: NotificationKind,
    session: &Session,
    episode: &EpisodeAttributes,
    now: DateTime<Utc>,
    reason: String,
    proposed_action: String,
) -> Notification {
    Notification {
        kind,
        episode_id: episode.episode_id.clone(),
        reason,
        proposed_action,
        month: session.month,
        at: now,
    }
}
