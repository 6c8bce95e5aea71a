//! Semantic ledger invariants not expressible via JSON Schema.

use std::collections::{HashMap, HashSet};

use crate::core::calendar::MonthKey;
use crate::core::config::BudgetConfig;
use crate::core::ledger::LedgerDocument;

/// Check semantic invariants not expressible in JSON Schema:
/// - Snapshot month matches its key
/// - `spent_cents` equals the sum of the month's entries
/// - Borrow/lend totals match the recorded reallocations
/// - Sequence numbers are unique and below `next_seq`
/// - Plan, revocation, and compensation references resolve
/// - Spend stays within the month's effective cap (when `cfg` is given)
pub fn validate_ledger(doc: &LedgerDocument, cfg: Option<&BudgetConfig>) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut entry_totals: HashMap<u64, i64> = HashMap::new();
    let mut plan_seqs = HashSet::new();
    let mut lent: HashMap<MonthKey, i64> = HashMap::new();

    for (month, ledger) in &doc.months {
        if ledger.snapshot.month != *month {
            errors.push(format!(
                "{month}: snapshot labelled {}",
                ledger.snapshot.month
            ));
        }
        let sum: i64 = ledger.entries.iter().map(|entry| entry.total_cents).sum();
        if sum != ledger.snapshot.spent_cents {
            errors.push(format!(
                "{month}: spent_cents {} != sum of entries {sum}",
                ledger.snapshot.spent_cents
            ));
        }
        let borrowed: i64 = ledger.reallocations.iter().map(|r| r.amount_cents).sum();
        if borrowed != ledger.snapshot.borrowed_cents {
            errors.push(format!(
                "{month}: borrowed_cents {} != sum of reallocations {borrowed}",
                ledger.snapshot.borrowed_cents
            ));
        }
        for reallocation in &ledger.reallocations {
            *lent.entry(reallocation.from_month).or_default() += reallocation.amount_cents;
            check_seq(doc, &mut seen, reallocation.seq, month, &mut errors);
        }
        for entry in &ledger.entries {
            check_seq(doc, &mut seen, entry.seq, month, &mut errors);
            entry_totals.insert(entry.seq, entry.total_cents);
        }
        for plan in &ledger.plans {
            check_seq(doc, &mut seen, plan.seq, month, &mut errors);
            plan_seqs.insert(plan.seq);
            if plan.month != *month {
                errors.push(format!("{month}: plan {} filed under {}", plan.seq, plan.month));
            }
        }
        for revocation in &ledger.revocations {
            check_seq(doc, &mut seen, revocation.seq, month, &mut errors);
        }
    }

    for (month, ledger) in &doc.months {
        let expected = lent.get(month).copied().unwrap_or(0);
        if expected != ledger.snapshot.reserve_lent_cents {
            errors.push(format!(
                "{month}: reserve_lent_cents {} != lent total {expected}",
                ledger.snapshot.reserve_lent_cents
            ));
        }
        for entry in &ledger.entries {
            if let Some(original) = entry.compensates {
                match entry_totals.get(&original) {
                    None => errors.push(format!(
                        "{month}: entry {} compensates unknown entry {original}",
                        entry.seq
                    )),
                    Some(total) if *total != -entry.total_cents => errors.push(format!(
                        "{month}: entry {} does not negate entry {original}",
                        entry.seq
                    )),
                    Some(_) => {}
                }
            }
        }
        for plan in &ledger.plans {
            for seq in &plan.entry_seqs {
                if !entry_totals.contains_key(seq) {
                    errors.push(format!(
                        "{month}: plan {} references unknown entry {seq}",
                        plan.seq
                    ));
                }
            }
            if let Some(old) = plan.supersedes {
                if !plan_seqs.contains(&old) {
                    errors.push(format!(
                        "{month}: plan {} supersedes unknown plan {old}",
                        plan.seq
                    ));
                }
            }
        }
        for revocation in &ledger.revocations {
            if !plan_seqs.contains(&revocation.revokes) {
                errors.push(format!(
                    "{month}: revocation {} targets unknown plan {}",
                    revocation.seq, revocation.revokes
                ));
            }
        }
        if let Some(cfg) = cfg {
            let cap = doc.limits(*month, cfg).cap_cents;
            if ledger.snapshot.spent_cents > cap {
                errors.push(format!(
                    "{month}: spent {} exceeds cap {cap}",
                    ledger.snapshot.spent_cents
                ));
            }
        }
    }

    for month in lent.keys() {
        if !doc.months.contains_key(month) {
            errors.push(format!("{month}: lent reserve but has no ledger month"));
        }
    }

    errors
}

fn check_seq(
    doc: &LedgerDocument,
    seen: &mut HashSet<u64>,
    seq: u64,
    month: &MonthKey,
    errors: &mut Vec<String>,
) {
    if !seen.insert(seq) {
        errors.push(format!("{month}: duplicate seq {seq}"));
    }
    if seq >= doc.next_seq {
        errors.push(format!("{month}: seq {seq} not below next_seq {}", doc.next_seq));
    }
}
