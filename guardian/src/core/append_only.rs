//! Append-only checks between two ledger versions.

use crate::core::ledger::{LedgerDocument, MonthLedger};

/// Validate that `next` only appends to `prev`.
///
/// For every month in `prev`, this check enforces:
/// - The month still exists in `next`.
/// - Existing entries, plans, revocations, and reallocations are unchanged
///   and keep their positions.
///
/// It also requires `version` and `next_seq` not to move backwards.
/// Returns a list of stable error messages (sorted by month).
pub fn check_append_only(prev: &LedgerDocument, next: &LedgerDocument) -> Vec<String> {
    let mut errors = Vec::new();

    if next.version < prev.version {
        errors.push(format!(
            "version moved backwards ({} -> {})",
            prev.version, next.version
        ));
    }
    if next.next_seq < prev.next_seq {
        errors.push(format!(
            "next_seq moved backwards ({} -> {})",
            prev.next_seq, next.next_seq
        ));
    }

    for (month, before) in &prev.months {
        let Some(after) = next.months.get(month) else {
            errors.push(format!("month {month} missing in next ledger"));
            continue;
        };
        check_prefix(month, "entry", &before.entries, &after.entries, &mut errors);
        check_prefix(month, "plan", &before.plans, &after.plans, &mut errors);
        check_prefix(
            month,
            "revocation",
            &before.revocations,
            &after.revocations,
            &mut errors,
        );
        check_prefix(
            month,
            "reallocation",
            &before.reallocations,
            &after.reallocations,
            &mut errors,
        );
        check_snapshot_month(month, before, after, &mut errors);
    }

    errors
}

fn check_prefix<T: PartialEq>(
    month: impl std::fmt::Display,
    label: &str,
    before: &[T],
    after: &[T],
    errors: &mut Vec<String>,
) {
    if after.len() < before.len() {
        errors.push(format!(
            "{month}: {label} records removed ({} -> {})",
            before.len(),
            after.len()
        ));
        return;
    }
    for (index, (old, new)) in before.iter().zip(after).enumerate() {
        if old != new {
            errors.push(format!("{month}: {label} #{index} changed"));
        }
    }
}

fn check_snapshot_month(
    month: impl std::fmt::Display,
    before: &MonthLedger,
    after: &MonthLedger,
    errors: &mut Vec<String>,
) {
    if before.snapshot.month != after.snapshot.month {
        errors.push(format!("{month}: snapshot month relabelled"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calendar::MonthKey;
    use crate::core::config::BudgetConfig;
    use crate::core::ledger::{CommitRequest, UsageRecord};
    use crate::core::types::{Decider, PlanCode, ResourceKind};

    fn october() -> MonthKey {
        "2026-10".parse().expect("month")
    }

    fn seeded() -> LedgerDocument {
        let cfg = BudgetConfig::default();
        let mut doc = LedgerDocument::default();
        doc.record_usage(
            UsageRecord {
                month: october(),
                episode_id: "ep-1",
                resource: ResourceKind::TtsMinutes,
                quantity: 2,
                unit_cost_millicents: 10_000,
                now: "2026-10-01T00:00:00Z".parse().expect("ts"),
            },
            &cfg,
        )
        .expect("usage");
        doc
    }

    /// Appending a commit on top of a ledger is not a violation.
    #[test]
    fn commit_is_append_only() {
        let cfg = BudgetConfig::default();
        let prev = seeded();
        let mut next = prev.clone();
        let est = crate::core::estimator::estimate(
            cfg.plan(PlanCode::Minimal).expect("minimal"),
            &cfg.rates,
        )
        .expect("estimate");
        next.commit(
            CommitRequest {
                month: october(),
                episode_id: "ep-2",
                estimate: &est,
                decider: Decider::Selector,
                rationale: "r".to_string(),
                now: "2026-10-02T00:00:00Z".parse().expect("ts"),
                supersede: false,
                reallocation: None,
                episodes_remaining: 1,
            },
            &cfg,
        )
        .expect("commit");
        assert!(check_append_only(&prev, &next).is_empty());
    }

    /// Editing a committed entry in place must be reported.
    #[test]
    fn reports_mutated_entry() {
        let prev = seeded();
        let mut next = prev.clone();
        next.months.get_mut(&october()).expect("month").entries[0].total_cents = 1;
        let errors = check_append_only(&prev, &next);
        assert_eq!(errors, vec!["2026-10: entry #0 changed".to_string()]);
    }

    /// Deleting records or whole months must be reported.
    #[test]
    fn reports_deletions() {
        let prev = seeded();
        let mut next = prev.clone();
        next.months.get_mut(&october()).expect("month").entries.clear();
        assert!(check_append_only(&prev, &next)[0].contains("entry records removed"));

        next.months.clear();
        assert!(check_append_only(&prev, &next)[0].contains("missing"));
    }

    #[test]
    fn reports_version_rollback() {
        let prev = seeded();
        let mut next = prev.clone();
        next.version = 0;
        assert!(check_append_only(&prev, &next)[0].contains("version moved backwards"));
    }
}
