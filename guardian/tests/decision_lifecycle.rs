//! End-to-end decision tests against a scratch `.guardian/` workspace.
//!
//! Each test drives the public entry points (`decide`, `report_outage`,
//! admin operations) and inspects the persisted ledger, cadence, decision
//! records, and notifications afterwards.

use std::time::Duration;

use guardian::admin::{
    OverrideRequest, RevokeRequest, UsageRequest, override_plan, record_usage, revoke_decision,
};
use guardian::core::calendar::MonthKey;
use guardian::core::cadence::CadenceReason;
use guardian::core::config::{BudgetConfig, OutageFallbackPolicy};
use guardian::core::fallback_guard::FallbackDenial;
use guardian::core::selector::DelayReason;
use guardian::core::types::{Decider, PlanCode, QualityTier, ResourceKind};
use guardian::decide::{DecisionOutcome, OutageRequest, decide, decide_with_retry, report_outage};
use guardian::error::{GuardianError, guardian_error};
use guardian::io::decision_log::{decision_record_path, read_decision_records};
use guardian::io::lease::MonthLease;
use guardian::io::notifications::{NotificationKind, read_notifications};
use guardian::test_support::{TestWorkspace, episode, request, request_with_remaining, ts};
use guardian::validate::validate_guardian;

fn october() -> MonthKey {
    "2026-10".parse().expect("month")
}

fn no_reallocation() -> BudgetConfig {
    let mut cfg = BudgetConfig::default();
    cfg.reallocation.enabled = false;
    cfg
}

fn committed_plan(outcome: &DecisionOutcome) -> PlanCode {
    outcome
        .committed()
        .unwrap_or_else(|| panic!("expected commit, got {outcome:?}"))
        .plan
        .plan
}

#[test]
fn ample_budget_commits_full_plan() {
    let ws = TestWorkspace::new();
    let outcome = decide(
        &ws.paths,
        &request_with_remaining("ep-1", ts("2026-10-05T12:00:00Z"), 20),
    )
    .expect("decide");

    assert_eq!(committed_plan(&outcome), PlanCode::Full);
    let decision = outcome.committed().expect("committed");
    assert_eq!(decision.snapshot.spent_cents, 556);
    assert_eq!(decision.plan.decider, Decider::Selector);
    assert!(decision.rationale.starts_with("chose full at 556c"));

    let doc = ws.ledger();
    assert_eq!(doc.version, 1);
    assert_eq!(doc.snapshot(october()).spent_cents, 556);

    let records_path = decision_record_path(&ws.paths.decisions_dir, october(), "ep-1");
    let records = read_decision_records(&records_path).expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["committed"], true);
    assert_eq!(records[0]["trigger"], "schedule");
    assert_eq!(records[0]["report"]["verdict"]["type"], "commit");
}

#[test]
fn tight_pacing_prefers_saver() {
    let ws = TestWorkspace::new();
    // 12000c usable over 60 episodes leaves a 200c fair share.
    let outcome = decide(
        &ws.paths,
        &request_with_remaining("ep-1", ts("2026-10-05T12:00:00Z"), 60),
    )
    .expect("decide");
    let mut cfg = BudgetConfig::default();
    cfg.scoring.pacing_penalty_per_cent = 0.3;
    ws.write_config(&cfg);
    let tighter = decide(
        &ws.paths,
        &request_with_remaining("ep-2", ts("2026-10-05T13:00:00Z"), 60),
    )
    .expect("decide");

    // Default penalty: full 176 - 0.1*356 = 140.4 still beats saver 98.
    assert_eq!(committed_plan(&outcome), PlanCode::Full);
    assert_eq!(committed_plan(&tighter), PlanCode::Saver);
}

#[test]
fn priority_event_arc_boost_restores_full_plan() {
    let mut cfg = BudgetConfig::default();
    cfg.scoring.pacing_penalty_per_cent = 0.3;
    cfg.policy.event_arc_priority_weight = 2.0;
    let ws = TestWorkspace::with_config(&cfg);
    ws.write_event_arcs(
        r#"
[[arc]]
name = "launch week"
starts_at = "2026-10-01T00:00:00Z"
ends_at = "2026-10-08T00:00:00Z"
priority = true
"#,
    );
    let now = ts("2026-10-05T12:00:00Z");

    let plain = request_with_remaining("ep-plain", now, 60);
    let mut flagged = request_with_remaining("ep-arc", now, 60);
    flagged.episode.is_event_arc = true;
    let mut outside = request_with_remaining("ep-late", ts("2026-10-05T14:00:00Z"), 60);
    outside.episode.is_event_arc = true;
    outside.episode.scheduled_at = ts("2026-10-09T12:00:00Z");

    let plain = decide(&ws.paths, &plain).expect("plain");
    let flagged = decide(&ws.paths, &flagged).expect("flagged");
    let outside = decide(&ws.paths, &outside).expect("outside");

    assert_eq!(committed_plan(&plain), PlanCode::Saver);
    assert_eq!(committed_plan(&flagged), PlanCode::Full);
    assert!(
        flagged
            .committed()
            .expect("committed")
            .rationale
            .contains("event-arc boost x2.00")
    );
    assert_eq!(committed_plan(&outside), PlanCode::Saver);
}

/// 15000c cap, 20% reserve, 12000c spent: nothing is usable, so the
/// selector goes straight to the fallback guard, which has no history.
#[test]
fn exhausted_usable_budget_commits_fallback_when_guard_allows() {
    let ws = TestWorkspace::with_config(&no_reallocation());
    ws.seed_spend(october(), 12_000, ts("2026-10-01T09:00:00Z"));

    let outcome = decide(&ws.paths, &request("ep-1", ts("2026-10-05T12:00:00Z"))).expect("decide");

    assert_eq!(committed_plan(&outcome), PlanCode::FallbackDm);
    let decision = outcome.committed().expect("committed");
    assert_eq!(decision.snapshot.spent_cents, 12_022);
    assert!(decision.rationale.contains("guard allowed fallback"));
}

#[test]
fn exhausted_usable_budget_delays_when_guard_denies() {
    let ws = TestWorkspace::with_config(&no_reallocation());
    ws.seed_spend(october(), 12_000, ts("2026-10-01T09:00:00Z"));
    ws.seed_plan("ep-0", PlanCode::FallbackDm, ts("2026-10-04T12:00:00Z"));
    let spent_before = ws.ledger().snapshot(october()).spent_cents;

    let outcome = decide(&ws.paths, &request("ep-1", ts("2026-10-05T12:00:00Z"))).expect("decide");

    let delayed = outcome.delayed().expect("delayed");
    let DelayReason::FallbackQuotaExceeded { denials } = &delayed.reason else {
        panic!("expected quota denial, got {:?}", delayed.reason);
    };
    assert!(denials.contains(&FallbackDenial::ConsecutiveFallback));
    assert!(
        denials
            .iter()
            .any(|denial| matches!(denial, FallbackDenial::TooSoon { min_days: 3, .. }))
    );
    assert_eq!(delayed.weekly_target, 3);
    assert_eq!(delayed.cadence_changes.len(), 1);
    assert_eq!(delayed.cadence_changes[0].reason, CadenceReason::BudgetPressure);

    let doc = ws.ledger();
    assert_eq!(doc.snapshot(october()).spent_cents, spent_before);
    assert!(doc.current_plan("ep-1").is_none());

    let kinds: Vec<NotificationKind> = delayed.notifications.iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::FallbackQuotaExceeded,
            NotificationKind::CadenceReduced
        ]
    );
    let on_disk = read_notifications(&ws.paths.notifications_path).expect("notifications");
    assert_eq!(on_disk, delayed.notifications);

    let records_path = decision_record_path(&ws.paths.decisions_dir, october(), "ep-1");
    let records = read_decision_records(&records_path).expect("records");
    assert_eq!(records[0]["committed"], false);
    assert_eq!(
        records[0]["report"]["verdict"]["reason"]["type"],
        "fallback_quota_exceeded"
    );
}

#[test]
fn fallback_over_hard_cap_is_budget_exhausted() {
    let mut cfg = no_reallocation();
    cfg.policy.fallback_uses_reserve = false;
    let ws = TestWorkspace::with_config(&cfg);
    ws.seed_spend(october(), 13_400, ts("2026-10-01T09:00:00Z"));

    let outcome = decide(&ws.paths, &request("ep-1", ts("2026-10-05T12:00:00Z"))).expect("decide");

    let delayed = outcome.delayed().expect("delayed");
    assert_eq!(
        delayed.reason,
        DelayReason::BudgetExhausted {
            fallback_cents: 22,
            limit_cents: 0
        }
    );
    assert_eq!(delayed.notifications[0].kind, NotificationKind::BudgetExhausted);
    assert_eq!(ws.ledger().snapshot(october()).spent_cents, 13_400);
}

/// Two fallbacks three days apart with a five-day minimum: a third fallback
/// is refused even though the budget could pay for it.
#[test]
fn fallback_spacing_is_enforced_on_outage_requests() {
    let mut cfg = BudgetConfig::default();
    cfg.policy.min_days_between_fallback = 5;
    let ws = TestWorkspace::with_config(&cfg);
    ws.seed_plan("ep-a", PlanCode::FallbackDm, ts("2026-10-01T12:00:00Z"));
    ws.seed_plan("ep-b", PlanCode::FallbackDm, ts("2026-10-04T12:00:00Z"));

    let now = ts("2026-10-06T12:00:00Z");
    let outcome = report_outage(
        &ws.paths,
        &OutageRequest {
            episode: episode("ep-c", now),
            now,
            reason: "tts provider timeout".to_string(),
            episodes_remaining: None,
        },
    )
    .expect("outage");

    let delayed = outcome.delayed().expect("delayed");
    let DelayReason::FallbackQuotaExceeded { denials } = &delayed.reason else {
        panic!("expected quota denial, got {:?}", delayed.reason);
    };
    assert!(denials.contains(&FallbackDenial::TooSoon {
        hours_since_last: 48,
        min_days: 5
    }));
    assert!(denials.contains(&FallbackDenial::WindowQuota { count: 2, max: 2 }));
    assert_eq!(ws.ledger().snapshot(october()).spent_cents, 44);
}

#[test]
fn exempt_outage_fallback_ignores_quotas() {
    let mut cfg = BudgetConfig::default();
    cfg.policy.outage_fallback = OutageFallbackPolicy::Exempt;
    let ws = TestWorkspace::with_config(&cfg);
    ws.seed_plan("ep-a", PlanCode::FallbackDm, ts("2026-10-04T12:00:00Z"));

    let now = ts("2026-10-05T12:00:00Z");
    let outcome = report_outage(
        &ws.paths,
        &OutageRequest {
            episode: episode("ep-b", now),
            now,
            reason: "render farm down".to_string(),
            episodes_remaining: None,
        },
    )
    .expect("outage");

    let decision = outcome.committed().expect("committed");
    assert_eq!(decision.plan.plan, PlanCode::FallbackDm);
    assert_eq!(decision.plan.decider, Decider::Outage);
    assert!(decision.rationale.starts_with("outage: render farm down"));
    assert_eq!(decision.notifications[0].kind, NotificationKind::OutageFallback);

    let records_path = decision_record_path(&ws.paths.decisions_dir, october(), "ep-b");
    let records = read_decision_records(&records_path).expect("records");
    assert_eq!(records[0]["trigger"], "outage");
}

#[test]
fn outage_supersedes_committed_plan() {
    let ws = TestWorkspace::new();
    let now = ts("2026-10-05T12:00:00Z");
    decide(&ws.paths, &request_with_remaining("ep-1", now, 20)).expect("decide");

    let later = ts("2026-10-05T18:00:00Z");
    let outcome = report_outage(
        &ws.paths,
        &OutageRequest {
            episode: episode("ep-1", now),
            now: later,
            reason: "render failed".to_string(),
            episodes_remaining: None,
        },
    )
    .expect("outage");

    let decision = outcome.committed().expect("committed");
    assert!(decision.plan.supersedes.is_some());
    assert_eq!(decision.snapshot.spent_cents, 22);

    let again = report_outage(
        &ws.paths,
        &OutageRequest {
            episode: episode("ep-1", now),
            now: later,
            reason: "render failed again".to_string(),
            episodes_remaining: None,
        },
    )
    .unwrap_err();
    assert!(matches!(
        guardian_error(&again),
        Some(GuardianError::AlreadyDecided {
            plan: PlanCode::FallbackDm,
            ..
        })
    ));
}

#[test]
fn duplicate_decision_is_rejected_without_new_spend() {
    let ws = TestWorkspace::new();
    let now = ts("2026-10-05T12:00:00Z");
    decide(&ws.paths, &request_with_remaining("ep-1", now, 20)).expect("first");
    let before = ws.ledger();

    let err = decide(&ws.paths, &request_with_remaining("ep-1", now, 20)).unwrap_err();

    assert_eq!(
        guardian_error(&err),
        Some(&GuardianError::AlreadyDecided {
            episode_id: "ep-1".to_string(),
            plan: PlanCode::Full
        })
    );
    let after = ws.ledger();
    assert_eq!(after.snapshot(october()), before.snapshot(october()));
    assert_eq!(after.version, before.version);
}

#[test]
fn rejected_decision_leaves_cadence_untouched() {
    let ws = TestWorkspace::new();
    ws.seed_plan("ep-1", PlanCode::Saver, ts("2026-10-05T09:00:00Z"));

    let err = decide(&ws.paths, &request("ep-1", ts("2026-10-05T12:00:00Z"))).unwrap_err();

    assert!(matches!(
        guardian_error(&err),
        Some(GuardianError::AlreadyDecided { .. })
    ));
    assert!(!ws.paths.cadence_path.exists());

    decide(&ws.paths, &request("ep-2", ts("2026-10-05T12:00:00Z"))).expect("decide");
    assert!(ws.paths.cadence_path.exists());
}

#[test]
fn committed_decision_survives_audit_write_failure() {
    let ws = TestWorkspace::new();
    std::fs::remove_dir_all(&ws.paths.decisions_dir).expect("remove decisions dir");
    std::fs::write(&ws.paths.decisions_dir, "not a directory").expect("block decisions dir");

    let outcome = decide(
        &ws.paths,
        &request_with_remaining("ep-1", ts("2026-10-05T12:00:00Z"), 20),
    )
    .expect("decide");

    assert_eq!(committed_plan(&outcome), PlanCode::Full);
    let doc = ws.ledger();
    assert_eq!(doc.current_plan("ep-1").map(|plan| plan.plan), Some(PlanCode::Full));
    assert_eq!(doc.snapshot(october()).spent_cents, 556);
}

#[test]
fn oversized_arc_cadence_override_is_config_invalid() {
    let ws = TestWorkspace::new();
    ws.write_event_arcs(
        "[[arc]]\nname = \"flood\"\nstarts_at = \"2026-10-01T00:00:00Z\"\nends_at = \"2026-11-01T00:00:00Z\"\ncadence_override = 200000000\n",
    );

    let err = decide(&ws.paths, &request("ep-1", ts("2026-10-01T00:00:00Z"))).unwrap_err();

    assert!(matches!(
        guardian_error(&err),
        Some(GuardianError::ConfigInvalid(message))
            if message.contains("cadence_override must be <= 70")
    ));
    assert_eq!(ws.ledger().version, 0);
}

#[test]
fn reallocation_borrows_only_the_gap() {
    let ws = TestWorkspace::new();
    ws.seed_spend(october(), 12_000, ts("2026-10-01T09:00:00Z"));

    let outcome = decide(&ws.paths, &request("ep-1", ts("2026-10-05T12:00:00Z"))).expect("decide");

    let decision = outcome.committed().expect("committed");
    assert_eq!(decision.plan.plan, PlanCode::Minimal);
    assert_eq!(decision.reallocated_cents, 55);
    assert_eq!(decision.snapshot.borrowed_cents, 55);
    assert_eq!(decision.notifications[0].kind, NotificationKind::ReallocationApplied);

    let doc = ws.ledger();
    let november = october().next();
    assert_eq!(doc.snapshot(november).reserve_lent_cents, 55);
    let limits = doc.limits(november, &BudgetConfig::default());
    assert_eq!(limits.cap_cents, 14_945);
    assert_eq!(limits.reserve_cents, 2_945);
    assert!(validate_guardian(ws.root()).is_ok());
}

#[test]
fn partial_reallocation_falls_back_without_borrowing() {
    let mut cfg = BudgetConfig::default();
    cfg.reallocation.max_pull_cents = 30;
    let ws = TestWorkspace::with_config(&cfg);
    ws.seed_spend(october(), 12_000, ts("2026-10-01T09:00:00Z"));

    let outcome = decide(&ws.paths, &request("ep-1", ts("2026-10-05T12:00:00Z"))).expect("decide");

    assert_eq!(committed_plan(&outcome), PlanCode::FallbackDm);
    let doc = ws.ledger();
    assert_eq!(doc.snapshot(october()).borrowed_cents, 0);
    assert_eq!(doc.snapshot(october().next()).reserve_lent_cents, 0);
}

#[test]
fn soft_stop_routes_to_fallback_and_notifies() {
    let ws = TestWorkspace::new();
    ws.seed_spend(october(), 13_600, ts("2026-10-01T09:00:00Z"));

    let outcome = decide(&ws.paths, &request("ep-1", ts("2026-10-20T12:00:00Z"))).expect("decide");

    let decision = outcome.committed().expect("committed");
    assert_eq!(decision.plan.plan, PlanCode::FallbackDm);
    assert_eq!(decision.reallocated_cents, 0);
    assert!(decision.rationale.contains("soft stop at 90%"));
    assert_eq!(decision.notifications[0].kind, NotificationKind::SoftStopReached);
}

#[test]
fn budget_override_ignores_reserve_and_soft_stop() {
    let ws = TestWorkspace::with_config(&no_reallocation());
    ws.seed_spend(october(), 13_600, ts("2026-10-01T09:00:00Z"));

    let mut req = request_with_remaining("ep-1", ts("2026-10-20T12:00:00Z"), 1);
    req.budget_override = true;
    let outcome = decide(&ws.paths, &req).expect("decide");

    assert_eq!(committed_plan(&outcome), PlanCode::Full);
    assert_eq!(ws.ledger().snapshot(october()).spent_cents, 14_156);
}

#[test]
fn admin_override_then_revoke_restores_spend() {
    let ws = TestWorkspace::new();
    let now = ts("2026-10-05T12:00:00Z");
    decide(&ws.paths, &request_with_remaining("ep-1", now, 20)).expect("decide");

    let overridden = override_plan(
        &ws.paths,
        &OverrideRequest {
            episode_id: "ep-1".to_string(),
            plan: PlanCode::Saver,
            admin: "ops".to_string(),
            reason: "sponsor asked for fewer variants".to_string(),
            now: ts("2026-10-05T13:00:00Z"),
        },
    )
    .expect("override");
    assert_eq!(overridden.plan.plan, PlanCode::Saver);
    assert!(overridden.plan.supersedes.is_some());
    assert_eq!(overridden.snapshot.spent_cents, 200);
    assert_eq!(
        overridden.plan.decider,
        Decider::Admin {
            name: "ops".to_string()
        }
    );

    let revocation = revoke_decision(
        &ws.paths,
        &RevokeRequest {
            episode_id: "ep-1".to_string(),
            admin: "ops".to_string(),
            reason: "episode cancelled".to_string(),
            now: ts("2026-10-05T14:00:00Z"),
        },
    )
    .expect("revoke");
    assert_eq!(revocation.revokes, overridden.plan.seq);

    let doc = ws.ledger();
    assert_eq!(doc.snapshot(october()).spent_cents, 0);
    assert!(doc.current_plan("ep-1").is_none());
    assert!(validate_guardian(ws.root()).is_ok());

    let redo = decide(
        &ws.paths,
        &request_with_remaining("ep-1", ts("2026-10-06T12:00:00Z"), 20),
    )
    .expect("decide again");
    assert_eq!(committed_plan(&redo), PlanCode::Full);

    let kinds: Vec<NotificationKind> = read_notifications(&ws.paths.notifications_path)
        .expect("notifications")
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::PlanOverridden, NotificationKind::PlanRevoked]
    );
}

/// Admin overrides to the fallback plan go through the same spacing rules as
/// automatic fallbacks.
#[test]
fn fallback_override_respects_fallback_guard() {
    let ws = TestWorkspace::new();
    let fallback_override = |id: &str, at: &str| {
        override_plan(
            &ws.paths,
            &OverrideRequest {
                episode_id: id.to_string(),
                plan: PlanCode::FallbackDm,
                admin: "ops".to_string(),
                reason: "voice talent unavailable".to_string(),
                now: ts(at),
            },
        )
    };

    let first = fallback_override("ep-1", "2026-10-05T12:00:00Z").expect("first override");
    assert_eq!(first.plan.plan, PlanCode::FallbackDm);

    let err = fallback_override("ep-2", "2026-10-05T13:00:00Z").unwrap_err();
    let Some(GuardianError::FallbackRefused { episode_id, reason }) = guardian_error(&err) else {
        panic!("expected fallback refusal, got {err:#}");
    };
    assert_eq!(episode_id, "ep-2");
    assert!(reason.contains(&FallbackDenial::ConsecutiveFallback.to_string()));

    let doc = ws.ledger();
    assert_eq!(doc.snapshot(october()).spent_cents, 22);
    assert!(doc.current_plan("ep-2").is_none());
    let fallbacks = doc
        .current_plans()
        .iter()
        .filter(|plan| plan.plan.is_fallback())
        .count();
    assert_eq!(fallbacks, 1);
    let notifications = read_notifications(&ws.paths.notifications_path).expect("notifications");
    assert_eq!(notifications.len(), 1);
}

#[test]
fn revoke_without_plan_is_not_decided() {
    let ws = TestWorkspace::new();
    let err = revoke_decision(
        &ws.paths,
        &RevokeRequest {
            episode_id: "ep-404".to_string(),
            admin: "ops".to_string(),
            reason: "typo".to_string(),
            now: ts("2026-10-05T12:00:00Z"),
        },
    )
    .unwrap_err();
    assert!(matches!(
        guardian_error(&err),
        Some(GuardianError::NotDecided { .. })
    ));
}

#[test]
fn metered_usage_counts_toward_cap() {
    let mut cfg = BudgetConfig::default();
    cfg.monthly_cap_cents = 1_000;
    let ws = TestWorkspace::with_config(&cfg);
    let usage = |quantity| UsageRequest {
        episode_id: "ep-1".to_string(),
        resource: ResourceKind::RenderMinutes,
        quantity,
        tier: QualityTier::Premium,
        now: ts("2026-10-05T12:00:00Z"),
    };

    // 150 premium render minutes at 5000 millicents each.
    let entry = record_usage(&ws.paths, &usage(150)).expect("usage");
    assert_eq!(entry.total_cents, 750);

    let err = record_usage(&ws.paths, &usage(60)).unwrap_err();
    assert!(matches!(
        guardian_error(&err),
        Some(GuardianError::CapExceeded { .. })
    ));
    assert_eq!(ws.ledger().snapshot(october()).spent_cents, 750);
}

#[test]
fn invalid_episode_id_is_rejected_before_any_write() {
    let ws = TestWorkspace::new();
    let err = decide(&ws.paths, &request("../escape", ts("2026-10-05T12:00:00Z"))).unwrap_err();
    assert!(matches!(
        guardian_error(&err),
        Some(GuardianError::InvalidEpisodeId(_))
    ));
    assert_eq!(ws.ledger().version, 0);
}

#[test]
fn retry_waits_for_lease_with_linear_backoff() {
    let ws = TestWorkspace::new();
    let now = ts("2026-10-05T12:00:00Z");
    let mut lease = Some(MonthLease::try_acquire(&ws.paths.locks_dir, october()).expect("lease"));
    let mut sleeps = Vec::new();

    let outcome = decide_with_retry(&ws.paths, &request_with_remaining("ep-1", now, 20), |wait| {
        sleeps.push(wait);
        lease.take();
    })
    .expect("decide");

    assert_eq!(committed_plan(&outcome), PlanCode::Full);
    assert_eq!(sleeps, vec![Duration::from_millis(200)]);
}

#[test]
fn retry_gives_up_after_max_attempts() {
    let ws = TestWorkspace::new();
    let _lease = MonthLease::try_acquire(&ws.paths.locks_dir, october()).expect("lease");
    let mut sleeps = Vec::new();

    let err = decide_with_retry(
        &ws.paths,
        &request("ep-1", ts("2026-10-05T12:00:00Z")),
        |wait| sleeps.push(wait),
    )
    .unwrap_err();

    assert!(matches!(
        guardian_error(&err),
        Some(GuardianError::LockBusy { .. })
    ));
    assert_eq!(
        sleeps,
        vec![Duration::from_millis(200), Duration::from_millis(400)]
    );
    assert_eq!(ws.ledger().version, 0);
}

/// Two decisions a day through a tight month: whatever mix of plans and
/// delays results, the ledger never breaks the cap or the fallback quotas.
#[test]
fn long_sequence_keeps_cap_and_fallback_quotas() {
    let mut cfg = no_reallocation();
    cfg.monthly_cap_cents = 3_000;
    let ws = TestWorkspace::with_config(&cfg);

    let mut committed = 0;
    let mut delayed = 0;
    for day in 1..=31 {
        for hour in [9, 17] {
            let now = ts(&format!("2026-10-{day:02}T{hour:02}:00:00Z"));
            let id = format!("ep-{day:02}-{hour:02}");
            match decide(&ws.paths, &request(&id, now)).expect("decide") {
                DecisionOutcome::Committed(_) => committed += 1,
                DecisionOutcome::Delayed(_) => delayed += 1,
            }
        }
    }
    assert!(committed > 0);
    assert!(delayed > 0);

    let doc = ws.ledger();
    assert!(doc.snapshot(october()).spent_cents <= 3_000);

    let plans = doc.current_plans();
    let fallbacks: Vec<_> = plans.iter().filter(|plan| plan.plan.is_fallback()).collect();
    assert!(!fallbacks.is_empty());
    for pair in plans.windows(2) {
        assert!(
            !(pair[0].plan.is_fallback() && pair[1].plan.is_fallback()),
            "consecutive fallbacks at seq {} and {}",
            pair[0].seq,
            pair[1].seq
        );
    }
    for window in plans.windows(7) {
        let count = window.iter().filter(|plan| plan.plan.is_fallback()).count();
        assert!(count <= 2, "{count} fallbacks in a 7-episode window");
    }
    for pair in fallbacks.windows(2) {
        let gap = pair[1].decided_at - pair[0].decided_at;
        assert!(gap >= chrono::Duration::days(3), "fallbacks only {gap} apart");
    }
    assert!(validate_guardian(ws.root()).is_ok());
}
