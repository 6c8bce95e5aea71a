//! Validation helpers for `.guardian/` layout, config, and ledger.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::core::invariants::validate_ledger;
use crate::core::ledger::LedgerDocument;
use crate::io::config::load_config;
use crate::io::event_arcs::load_event_arcs;
use crate::io::init::GuardianPaths;

/// High-level validation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateOutcome {
    pub ledger_version: u64,
    pub months: usize,
    pub current_plans: usize,
}

/// Validate `.guardian/` layout, config, event arcs, and the ledger.
///
/// Ledger checks run against the configured caps, so lowering the cap
/// below what a month already spent is reported here.
pub fn validate_guardian(root: &Path) -> Result<ValidateOutcome> {
    let paths = GuardianPaths::new(root);

    ensure_dir(&paths.guardian_dir)?;
    ensure_dir(&paths.state_dir)?;
    ensure_file(&paths.config_path)?;
    ensure_file(&paths.ledger_path)?;

    let cfg = load_config(&paths.config_path).with_context(|| "load config.toml")?;
    load_event_arcs(&paths.event_arcs_path).with_context(|| "load event_arcs.toml")?;
    let doc = paths
        .ledger_store()
        .load()
        .with_context(|| "load ledger.json")?;

    let mut errors = validate_ledger(&doc, Some(&cfg));
    errors.extend(duplicate_current_plans(&doc));
    if !errors.is_empty() {
        return Err(anyhow!("ledger validation failed:\n- {}", errors.join("\n- ")));
    }

    Ok(ValidateOutcome {
        ledger_version: doc.version,
        months: doc.months.len(),
        current_plans: doc.current_plans().len(),
    })
}

/// Episodes with more than one plan that is neither superseded nor revoked.
fn duplicate_current_plans(doc: &LedgerDocument) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for plan in doc.current_plans() {
        *counts.entry(plan.episode_id.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(episode, count)| format!("episode '{episode}' has {count} current plans"))
        .collect()
}

fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("missing directory {}", path.display()));
    }
    if !path.is_dir() {
        return Err(anyhow!("expected directory {}", path.display()));
    }
    Ok(())
}

fn ensure_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("missing file {}", path.display()));
    }
    if !path.is_file() {
        return Err(anyhow!("expected file {}", path.display()));
    }
    Ok(())
}
