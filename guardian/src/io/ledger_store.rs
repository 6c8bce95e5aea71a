//! Ledger document persistence with schema + invariant validation.
//!
//! The whole ledger lives in one JSON document that is replaced atomically,
//! so a commit (entries, snapshot, plan record, reallocation) is either fully
//! visible or not at all.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::{debug, info};

use super::atomic::write_json_atomic;
use super::lease::WriteLock;
use crate::core::append_only::check_append_only;
use crate::core::invariants::validate_ledger;
use crate::core::ledger::LedgerDocument;
use crate::error::GuardianError;

pub const LEDGER_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/ledger/v1.schema.json"
));

#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_path: lock_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current ledger; an absent file is an empty ledger.
    pub fn load(&self) -> Result<LedgerDocument> {
        load_ledger(&self.path)
    }

    /// Apply `mutate` to the ledger if it is still at `expected_version`.
    ///
    /// Runs under the ledger write lock: re-reads the document, rejects a
    /// version change with [`GuardianError::LedgerWriteConflict`], applies the
    /// mutation to a copy, checks append-only and semantic invariants, and
    /// atomically replaces the file. A failing mutation leaves the file
    /// untouched.
    pub fn transact<T, F>(&self, expected_version: u64, mutate: F) -> Result<(T, LedgerDocument)>
    where
        F: FnOnce(&mut LedgerDocument) -> Result<T>,
    {
        let _lock = WriteLock::acquire(&self.lock_path)?;
        let current = self.load()?;
        if current.version != expected_version {
            debug!(
                expected = expected_version,
                found = current.version,
                "ledger version moved"
            );
            return Err(GuardianError::LedgerWriteConflict {
                expected: expected_version,
                found: current.version,
            }
            .into());
        }
        let mut next = current.clone();
        let output = mutate(&mut next)?;

        let mut errors = check_append_only(&current, &next);
        errors.extend(validate_ledger(&next, None));
        if !errors.is_empty() {
            return Err(anyhow!("ledger update rejected: {}", errors.join("; ")));
        }
        write_ledger(&self.path, &next)?;
        info!(version = next.version, "ledger committed");
        Ok((output, next))
    }
}

/// Load and validate a ledger file (schema + invariants).
pub fn load_ledger(path: &Path) -> Result<LedgerDocument> {
    if !path.exists() {
        return Ok(LedgerDocument::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read ledger {}", path.display()))?;
    parse_ledger(&contents).with_context(|| format!("load ledger {}", path.display()))
}

/// Parse ledger JSON, checking the embedded schema and semantic invariants.
pub fn parse_ledger(contents: &str) -> Result<LedgerDocument> {
    let value: Value = serde_json::from_str(contents).context("parse ledger json")?;
    validate_schema(&value)?;
    let doc: LedgerDocument =
        serde_json::from_value(value).context("deserialize ledger document")?;
    let errors = validate_ledger(&doc, None);
    if !errors.is_empty() {
        return Err(anyhow!("ledger invariants failed: {}", errors.join("; ")));
    }
    Ok(doc)
}

/// Write the ledger atomically (temp file + rename).
pub fn write_ledger(path: &Path, doc: &LedgerDocument) -> Result<()> {
    debug!(path = %path.display(), version = doc.version, "writing ledger");
    write_json_atomic(path, doc)
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(LEDGER_SCHEMA).context("parse ledger schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "ledger schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
