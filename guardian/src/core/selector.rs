//! Deterministic plan selection over the degradation ladder.
//!
//! Feasibility gating always precedes ranking: the event-arc boost and the
//! pacing penalty only reorder plans that already fit the usable budget.

use std::fmt::Write as _;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::config::{BudgetConfig, ScoringConfig};
use crate::core::estimator::estimate;
use crate::core::fallback_guard::{FallbackDenial, FallbackHistory, GuardVerdict, allow_fallback};
use crate::core::ledger::{BudgetSnapshot, MonthLimits};
use crate::core::types::{CostEstimate, EpisodeAttributes, PlanCode, ResourceQuantities};

/// Everything the selector reads. Built fresh for every decision.
#[derive(Debug, Clone)]
pub struct SelectionContext<'a> {
    pub config: &'a BudgetConfig,
    pub snapshot: &'a BudgetSnapshot,
    pub limits: MonthLimits,
    pub episode: &'a EpisodeAttributes,
    /// Episode timestamp falls inside an active priority event arc.
    pub in_priority_arc: bool,
    /// Episodes left this month, including this one.
    pub episodes_remaining: u32,
    /// Ignore the reserve and the soft stop (never the hard cap).
    pub budget_override: bool,
    pub history: &'a FallbackHistory,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetPosition {
    pub cap_cents: i64,
    pub reserve_cents: i64,
    pub spent_cents: i64,
    pub remaining_cents: i64,
    pub usable_cents: i64,
    pub soft_stop_reached: bool,
}

/// Compute remaining and usable budget for the month.
pub fn budget_position(
    limits: MonthLimits,
    snapshot: &BudgetSnapshot,
    soft_stop_percent: u32,
    budget_override: bool,
) -> BudgetPosition {
    let cap = limits.cap_cents;
    let remaining = cap - snapshot.spent_cents;
    let reserve = if budget_override {
        0
    } else {
        limits.reserve_cents
    };
    let soft_stop_reached = !budget_override
        && cap > 0
        && i128::from(snapshot.spent_cents) * 100
            >= i128::from(cap) * i128::from(soft_stop_percent);
    BudgetPosition {
        cap_cents: cap,
        reserve_cents: reserve,
        spent_cents: snapshot.spent_cents,
        remaining_cents: remaining,
        usable_cents: (remaining - reserve).max(0),
        soft_stop_reached,
    }
}

/// Fixed monotonic score of a plan's resource quantities.
pub fn richness_score(resources: &ResourceQuantities, scoring: &ScoringConfig) -> f64 {
    resources.llm_tokens as f64 / 1_000.0 * scoring.llm_kilotoken_weight
        + resources.tts_minutes as f64 * scoring.tts_minute_weight
        + resources.image_generations as f64 * scoring.image_weight
        + resources.render_minutes as f64 * scoring.render_minute_weight
        + resources.variants as f64 * scoring.variant_weight
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEvaluation {
    pub plan: PlanCode,
    pub estimate: CostEstimate,
    pub score: f64,
    pub boosted_score: f64,
    pub pacing_penalty: f64,
    /// `boosted_score - pacing_penalty`; only compared among feasible plans.
    pub rank: f64,
    pub feasible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct PlanBoard {
    usable_cents: i64,
    fallback_limit_cents: i64,
    evaluations: Vec<PlanEvaluation>,
}

impl PlanBoard {
    /// Highest-ranked feasible non-fallback plan; ties go to the richer plan.
    fn best_non_fallback(&self) -> Option<&PlanEvaluation> {
        let mut best: Option<&PlanEvaluation> = None;
        for evaluation in &self.evaluations {
            if evaluation.plan.is_fallback() || !evaluation.feasible {
                continue;
            }
            if best.is_none_or(|current| evaluation.rank > current.rank) {
                best = Some(evaluation);
            }
        }
        best
    }

    /// Cents missing for the cheapest non-fallback plan to become feasible.
    fn reallocation_gap(&self) -> Option<i64> {
        self.evaluations
            .iter()
            .filter(|evaluation| !evaluation.plan.is_fallback())
            .map(|evaluation| evaluation.estimate.total_cents - self.usable_cents)
            .filter(|gap| *gap > 0)
            .min()
    }

    fn fallback(&self) -> Option<&PlanEvaluation> {
        self.evaluations
            .iter()
            .find(|evaluation| evaluation.plan.is_fallback())
    }
}

fn evaluate_plans(
    ctx: &SelectionContext<'_>,
    position: &BudgetPosition,
    extra_usable_cents: i64,
) -> Result<PlanBoard> {
    let cfg = ctx.config;
    let usable = position.usable_cents + extra_usable_cents;
    let fallback_limit = if cfg.policy.fallback_uses_reserve {
        position.remaining_cents.max(0)
    } else {
        position.usable_cents
    };
    let boost = boost_factor(ctx);
    let fair_share = usable as f64 / f64::from(ctx.episodes_remaining.max(1));

    let mut evaluations = Vec::new();
    for plan in cfg.ladder() {
        let estimate = estimate(plan, &cfg.rates)?;
        let score = richness_score(&plan.resources, &cfg.scoring);
        let boosted_score = score * boost;
        let over_pace = (estimate.total_cents as f64 - fair_share).max(0.0);
        let pacing_penalty = over_pace * cfg.scoring.pacing_penalty_per_cent;
        let limit = if plan.code.is_fallback() {
            fallback_limit
        } else {
            usable
        };
        evaluations.push(PlanEvaluation {
            plan: plan.code,
            feasible: estimate.total_cents <= limit,
            estimate,
            score,
            boosted_score,
            pacing_penalty,
            rank: boosted_score - pacing_penalty,
        });
    }
    Ok(PlanBoard {
        usable_cents: usable,
        fallback_limit_cents: fallback_limit,
        evaluations,
    })
}

fn boost_factor(ctx: &SelectionContext<'_>) -> f64 {
    if ctx.episode.is_event_arc && ctx.in_priority_arc {
        ctx.config.policy.event_arc_priority_weight
    } else {
        1.0
    }
}

/// Why an episode was left undecided this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DelayReason {
    /// Not even the fallback plan fits what is left.
    BudgetExhausted {
        fallback_cents: i64,
        limit_cents: i64,
    },
    /// Fallback is the only option but the guard refuses it.
    FallbackQuotaExceeded { denials: Vec<FallbackDenial> },
}

impl DelayReason {
    pub fn kind(&self) -> &'static str {
        match self {
            DelayReason::BudgetExhausted { .. } => "budget_exhausted",
            DelayReason::FallbackQuotaExceeded { .. } => "fallback_quota_exceeded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Verdict {
    Commit {
        estimate: CostEstimate,
        /// Cents to pull from next month's reserve with this commit.
        reallocated_cents: i64,
    },
    Delay {
        reason: DelayReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReallocationAttempt {
    pub gap_cents: i64,
    pub granted_cents: i64,
}

/// Full account of one selection, suitable for audit records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionReport {
    pub episode_id: String,
    pub position: BudgetPosition,
    pub boost_applied: bool,
    pub evaluations: Vec<PlanEvaluation>,
    pub reallocation: Option<ReallocationAttempt>,
    pub guard: Option<GuardVerdict>,
    pub verdict: Verdict,
    pub rationale: String,
}

impl SelectionReport {
    pub fn chosen(&self) -> Option<PlanCode> {
        match &self.verdict {
            Verdict::Commit { estimate, .. } => Some(estimate.plan),
            Verdict::Delay { .. } => None,
        }
    }
}

/// Choose a plan or a delay for one episode.
///
/// `pull` is asked for up to `gap` cents of next month's reserve when no
/// non-fallback plan fits; it returns the cents actually available (which may
/// be less, or zero). Nothing is pulled unless the resulting decision commits.
pub fn select_plan<F>(ctx: &SelectionContext<'_>, mut pull: F) -> Result<SelectionReport>
where
    F: FnMut(i64) -> Result<i64>,
{
    let position = budget_position(
        ctx.limits,
        ctx.snapshot,
        ctx.config.soft_stop_percent,
        ctx.budget_override,
    );
    let mut board = evaluate_plans(ctx, &position, 0)?;
    let mut reallocation = None;

    if !position.soft_stop_reached {
        if let Some(best) = board.best_non_fallback() {
            let estimate = best.estimate.clone();
            return Ok(report(ctx, position, board, None, None, estimate, 0));
        }
        let gap = board
            .reallocation_gap()
            .filter(|_| ctx.config.reallocation.enabled);
        if let Some(gap) = gap {
            let granted = pull(gap)?.clamp(0, gap);
            reallocation = Some(ReallocationAttempt {
                gap_cents: gap,
                granted_cents: granted,
            });
            if granted > 0 {
                let adjusted = evaluate_plans(ctx, &position, granted)?;
                if let Some(best) = adjusted.best_non_fallback() {
                    let estimate = best.estimate.clone();
                    let needed = (estimate.total_cents - position.usable_cents).max(0);
                    return Ok(report(
                        ctx,
                        position,
                        adjusted,
                        reallocation,
                        None,
                        estimate,
                        needed,
                    ));
                }
                board = adjusted;
            }
        }
    }

    let verdict = guard_fallback(ctx, &board, true);
    Ok(finish_fallback(ctx, position, board, reallocation, verdict))
}

/// Fallback forced by a render failure or provider outage.
///
/// Skips the richer plans entirely. Quotas apply unless `enforce_quotas` is
/// false; the fallback must still fit the budget.
pub fn select_outage_fallback(
    ctx: &SelectionContext<'_>,
    enforce_quotas: bool,
) -> Result<SelectionReport> {
    let position = budget_position(
        ctx.limits,
        ctx.snapshot,
        ctx.config.soft_stop_percent,
        ctx.budget_override,
    );
    let board = evaluate_plans(ctx, &position, 0)?;
    let verdict = guard_fallback(ctx, &board, enforce_quotas);
    Ok(finish_fallback(ctx, position, board, None, verdict))
}

type FallbackVerdict = (Option<GuardVerdict>, Result<CostEstimate, DelayReason>);

fn guard_fallback(ctx: &SelectionContext<'_>, board: &PlanBoard, enforce: bool) -> FallbackVerdict {
    let guard = allow_fallback(ctx.history, &ctx.config.policy, ctx.now);
    let Some(fallback) = board.fallback() else {
        // Config validation guarantees a fallback rung; treat absence as exhaustion.
        return (
            Some(guard),
            Err(DelayReason::BudgetExhausted {
                fallback_cents: 0,
                limit_cents: board.fallback_limit_cents,
            }),
        );
    };
    if !fallback.feasible {
        return (
            Some(guard),
            Err(DelayReason::BudgetExhausted {
                fallback_cents: fallback.estimate.total_cents,
                limit_cents: board.fallback_limit_cents,
            }),
        );
    }
    if enforce && !guard.allowed() {
        let denials = guard.denials.clone();
        return (Some(guard), Err(DelayReason::FallbackQuotaExceeded { denials }));
    }
    (Some(guard), Ok(fallback.estimate.clone()))
}

fn finish_fallback(
    ctx: &SelectionContext<'_>,
    position: BudgetPosition,
    board: PlanBoard,
    reallocation: Option<ReallocationAttempt>,
    (guard, outcome): FallbackVerdict,
) -> SelectionReport {
    match outcome {
        Ok(estimate) => report(ctx, position, board, reallocation, guard, estimate, 0),
        Err(reason) => {
            let verdict = Verdict::Delay { reason };
            let rationale = rationale(
                ctx,
                &position,
                &board,
                reallocation,
                guard.as_ref(),
                &verdict,
            );
            SelectionReport {
                episode_id: ctx.episode.episode_id.clone(),
                position,
                boost_applied: boost_factor(ctx) > 1.0,
                evaluations: board.evaluations,
                reallocation,
                guard,
                verdict,
                rationale,
            }
        }
    }
}

fn report(
    ctx: &SelectionContext<'_>,
    position: BudgetPosition,
    board: PlanBoard,
    reallocation: Option<ReallocationAttempt>,
    guard: Option<GuardVerdict>,
    estimate: CostEstimate,
    reallocated_cents: i64,
) -> SelectionReport {
    let verdict = Verdict::Commit {
        estimate,
        reallocated_cents,
    };
    let rationale = rationale(ctx, &position, &board, reallocation, guard.as_ref(), &verdict);
    SelectionReport {
        episode_id: ctx.episode.episode_id.clone(),
        position,
        boost_applied: boost_factor(ctx) > 1.0,
        evaluations: board.evaluations,
        reallocation,
        guard,
        verdict,
        rationale,
    }
}

/// Human-readable, deterministic account of the decision.
fn rationale(
    ctx: &SelectionContext<'_>,
    position: &BudgetPosition,
    board: &PlanBoard,
    reallocation: Option<ReallocationAttempt>,
    guard: Option<&GuardVerdict>,
    verdict: &Verdict,
) -> String {
    let mut out = String::new();
    match verdict {
        Verdict::Commit { estimate, .. } => {
            let _ = write!(out, "chose {} at {}c", estimate.plan, estimate.total_cents);
        }
        Verdict::Delay { reason } => {
            let _ = write!(out, "delayed ({})", reason.kind());
        }
    }
    let _ = write!(
        out,
        "; usable {}c, remaining {}c, spent {}c of {}c",
        board.usable_cents, position.remaining_cents, position.spent_cents, position.cap_cents
    );
    if position.soft_stop_reached {
        let _ = write!(out, "; soft stop at {}%", ctx.config.soft_stop_percent);
    }
    if ctx.budget_override {
        out.push_str("; budget override");
    }
    if boost_factor(ctx) > 1.0 {
        let _ = write!(out, "; event-arc boost x{:.2}", boost_factor(ctx));
    }
    if let Some(attempt) = reallocation {
        let _ = write!(
            out,
            "; reallocation granted {}c of {}c gap",
            attempt.granted_cents, attempt.gap_cents
        );
    }
    out.push_str("; plans:");
    for evaluation in &board.evaluations {
        let _ = write!(
            out,
            " {}={}c/{}/{:.2}",
            evaluation.plan,
            evaluation.estimate.total_cents,
            if evaluation.feasible { "ok" } else { "over" },
            evaluation.rank
        );
    }
    if let Some(guard) = guard {
        if guard.allowed() {
            out.push_str("; guard allowed fallback");
        } else {
            let denials: Vec<String> = guard.denials.iter().map(ToString::to_string).collect();
            let _ = write!(out, "; guard denied: {}", denials.join(", "));
        }
    }
    out
}
