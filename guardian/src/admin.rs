//! Administrative ledger operations: override, revoke, metered usage.
//!
//! All of these take the affected month's lease and go through the same
//! versioned ledger write as automatic decisions.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core::calendar::{MonthKey, episodes_remaining_in_month};
use crate::core::estimator::estimate;
use crate::core::fallback_guard::allow_fallback;
use crate::core::ledger::{CommitRequest, LedgerEntry, Revocation, UsageRecord};
use crate::core::types::{Decider, PlanCode, QualityTier, ResourceKind};
use crate::decide::{CommittedDecision, validate_episode_id};
use crate::error::GuardianError;
use crate::io::cadence_store::load_cadence;
use crate::io::config::load_config;
use crate::io::init::GuardianPaths;
use crate::io::lease::MonthLease;
use crate::io::notifications::{Notification, NotificationKind, append_notifications};

#[derive(Debug, Clone)]
pub struct OverrideRequest {
    pub episode_id: String,
    pub plan: PlanCode,
    pub admin: String,
    pub reason: String,
    pub now: DateTime<Utc>,
}

/// Commit an admin-chosen plan, superseding the episode's current plan.
///
/// Reserve and soft stop are ignored; the month's hard cap is not, and a
/// fallback plan still has to pass the fallback guard.
pub fn override_plan(
    paths: &GuardianPaths,
    request: &OverrideRequest,
) -> Result<CommittedDecision> {
    validate_episode_id(&request.episode_id)?;
    let cfg = load_config(&paths.config_path)?;
    let month = MonthKey::of(request.now);
    let _lease = MonthLease::try_acquire(&paths.locks_dir, month)?;
    let store = paths.ledger_store();
    let doc = store.load()?;

    let definition = cfg.plan(request.plan).ok_or_else(|| {
        GuardianError::ConfigInvalid(format!("plan '{}' is not configured", request.plan))
    })?;
    if request.plan.is_fallback() {
        let verdict = allow_fallback(&doc.fallback_history(), &cfg.policy, request.now);
        if !verdict.allowed() {
            let reason = verdict
                .denials
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            warn!(
                %month,
                episode_id = %request.episode_id,
                admin = %request.admin,
                %reason,
                "fallback override refused"
            );
            return Err(GuardianError::FallbackRefused {
                episode_id: request.episode_id.clone(),
                reason,
            }
            .into());
        }
    }
    let estimate = estimate(definition, &cfg.rates)?;
    let target = load_cadence(&paths.cadence_path)?
        .map_or(cfg.cadence.default_shorts_per_week, |state| state.target);
    let rationale = format!(
        "override by {}: {} ({} at {}c)",
        request.admin, request.reason, request.plan, estimate.total_cents
    );

    let (plan, doc) = store.transact(doc.version, |doc| {
        let record = doc.commit(
            CommitRequest {
                month,
                episode_id: &request.episode_id,
                estimate: &estimate,
                decider: Decider::Admin {
                    name: request.admin.clone(),
                },
                rationale: rationale.clone(),
                now: request.now,
                supersede: true,
                reallocation: None,
                episodes_remaining: episodes_remaining_in_month(request.now, target),
            },
            &cfg,
        )?;
        Ok(record)
    })?;

    let notifications = vec![Notification {
        kind: NotificationKind::PlanOverridden,
        episode_id: request.episode_id.clone(),
        reason: rationale.clone(),
        proposed_action: "none".to_string(),
        month,
        at: request.now,
    }];
    append_notifications(&paths.notifications_path, &notifications)?;
    info!(
        %month,
        episode_id = %request.episode_id,
        plan = %plan.plan,
        admin = %request.admin,
        superseded = ?plan.supersedes,
        "plan overridden"
    );
    Ok(CommittedDecision {
        snapshot: doc.snapshot(month),
        estimate,
        reallocated_cents: 0,
        rationale,
        plan,
        notifications,
    })
}

#[derive(Debug, Clone)]
pub struct RevokeRequest {
    pub episode_id: String,
    pub admin: String,
    pub reason: String,
    pub now: DateTime<Utc>,
}

/// Reverse an episode's current plan; the episode becomes undecided.
pub fn revoke_decision(paths: &GuardianPaths, request: &RevokeRequest) -> Result<Revocation> {
    validate_episode_id(&request.episode_id)?;
    let store = paths.ledger_store();
    let doc = store.load()?;
    let current = doc
        .current_plan(&request.episode_id)
        .ok_or_else(|| GuardianError::NotDecided {
            episode_id: request.episode_id.clone(),
        })?;
    let month = current.month;
    let _lease = MonthLease::try_acquire(&paths.locks_dir, month)?;

    let (revocation, _) = store.transact(doc.version, |doc| {
        let revocation = doc.revoke(
            &request.episode_id,
            Decider::Admin {
                name: request.admin.clone(),
            },
            request.reason.clone(),
            request.now,
        )?;
        Ok(revocation)
    })?;

    append_notifications(
        &paths.notifications_path,
        &[Notification {
            kind: NotificationKind::PlanRevoked,
            episode_id: request.episode_id.clone(),
            reason: format!("revoked by {}: {}", request.admin, request.reason),
            proposed_action: "decide the episode again".to_string(),
            month,
            at: request.now,
        }],
    )?;
    warn!(%month, episode_id = %request.episode_id, revokes = revocation.revokes, "plan revoked");
    Ok(revocation)
}

#[derive(Debug, Clone)]
pub struct UsageRequest {
    pub episode_id: String,
    pub resource: ResourceKind,
    pub quantity: u64,
    /// Rate row used to price the usage.
    pub tier: QualityTier,
    pub now: DateTime<Utc>,
}

/// Record metered consumption outside a plan commit (e.g. a re-render).
pub fn record_usage(paths: &GuardianPaths, request: &UsageRequest) -> Result<LedgerEntry> {
    validate_episode_id(&request.episode_id)?;
    let cfg = load_config(&paths.config_path)?;
    let unit_cost = cfg
        .rates
        .rate(request.tier, request.resource)
        .ok_or_else(|| {
            GuardianError::ConfigInvalid(format!(
                "missing {} rate for {}",
                request.tier.as_str(),
                request.resource
            ))
        })?;
    let month = MonthKey::of(request.now);
    let _lease = MonthLease::try_acquire(&paths.locks_dir, month)?;
    let store = paths.ledger_store();
    let doc = store.load()?;

    let (entry, _) = store.transact(doc.version, |doc| {
        let entry = doc.record_usage(
            UsageRecord {
                month,
                episode_id: &request.episode_id,
                resource: request.resource,
                quantity: request.quantity,
                unit_cost_millicents: unit_cost,
                now: request.now,
            },
            &cfg,
        )?;
        Ok(entry)
    })?;
    info!(
        %month,
        episode_id = %request.episode_id,
        resource = %request.resource,
        total_cents = entry.total_cents,
        "usage recorded"
    );
    Ok(entry)
}
