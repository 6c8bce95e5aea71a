//! Initialization helpers for `.guardian/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::cadence_store::CadenceStore;
use super::config::write_config;
use super::ledger_store::{LedgerStore, write_ledger};
use crate::core::calendar::MonthKey;
use crate::core::config::BudgetConfig;
use crate::core::ledger::LedgerDocument;

/// All canonical paths within `.guardian/` for a project root.
#[derive(Debug, Clone)]
pub struct GuardianPaths {
    pub root: PathBuf,
    pub guardian_dir: PathBuf,
    pub state_dir: PathBuf,
    pub locks_dir: PathBuf,
    pub decisions_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub event_arcs_path: PathBuf,
    pub cadence_path: PathBuf,
    pub ledger_path: PathBuf,
    pub notifications_path: PathBuf,
    pub ledger_lock_path: PathBuf,
    pub cadence_lock_path: PathBuf,
}

impl GuardianPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let guardian_dir = root.join(".guardian");
        let state_dir = guardian_dir.join("state");
        let locks_dir = guardian_dir.join("locks");
        Self {
            root,
            guardian_dir: guardian_dir.clone(),
            state_dir: state_dir.clone(),
            locks_dir: locks_dir.clone(),
            decisions_dir: guardian_dir.join("decisions"),
            gitignore_path: guardian_dir.join(".gitignore"),
            config_path: state_dir.join("config.toml"),
            event_arcs_path: state_dir.join("event_arcs.toml"),
            cadence_path: state_dir.join("cadence.json"),
            ledger_path: state_dir.join("ledger.json"),
            notifications_path: guardian_dir.join("notifications.jsonl"),
            ledger_lock_path: locks_dir.join("ledger.lock"),
            cadence_lock_path: locks_dir.join("cadence.lock"),
        }
    }

    pub fn month_lock_path(&self, month: MonthKey) -> PathBuf {
        super::lease::month_lock_path(&self.locks_dir, month)
    }

    pub fn ledger_store(&self) -> LedgerStore {
        LedgerStore::new(&self.ledger_path, &self.ledger_lock_path)
    }

    pub fn cadence_store(&self) -> CadenceStore {
        CadenceStore::new(&self.cadence_path, &self.cadence_lock_path)
    }
}

/// Options for `init_guardian`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing guardian-owned files (including the ledger).
    pub force: bool,
}

/// Create `.guardian/` scaffolding in `root`.
///
/// Fails if `.guardian/` already exists unless `options.force` is set.
pub fn init_guardian(root: &Path, options: &InitOptions) -> Result<GuardianPaths> {
    let paths = GuardianPaths::new(root);
    if paths.guardian_dir.exists() && !paths.guardian_dir.is_dir() {
        return Err(anyhow!(
            "guardian init: .guardian exists but is not a directory"
        ));
    }
    if paths.guardian_dir.exists() && !options.force {
        return Err(anyhow!(
            "guardian init: .guardian already exists (use --force to overwrite)"
        ));
    }

    create_dir(&paths.guardian_dir)?;
    create_dir(&paths.state_dir)?;
    create_dir(&paths.locks_dir)?;
    create_dir(&paths.decisions_dir)?;

    write_file(&paths.gitignore_path, GUARDIAN_GITIGNORE)?;
    write_config(&paths.config_path, &BudgetConfig::default())?;
    write_file(&paths.event_arcs_path, EVENT_ARCS_PLACEHOLDER)?;
    write_ledger(&paths.ledger_path, &LedgerDocument::default())?;
    if paths.cadence_path.exists() {
        fs::remove_file(&paths.cadence_path)
            .with_context(|| format!("remove {}", paths.cadence_path.display()))?;
    }

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const GUARDIAN_GITIGNORE: &str = "locks/\n";
const EVENT_ARCS_PLACEHOLDER: &str = "# Event arcs boost plan scores (never costs) inside their window.\n#\n# [[arc]]\n# name = \"season-finale\"\n# starts_at = \"2026-11-01T00:00:00Z\"\n# ends_at = \"2026-11-08T00:00:00Z\"\n# priority = true\n# cadence_override = 7\n";
