//! Budget configuration stored under `.guardian/state/config.toml`.
//!
//! Re-read at the start of every decision so edits take effect on the next
//! cycle without a restart.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::atomic::write_atomic;
use crate::core::config::BudgetConfig;
use crate::error::GuardianError;

/// Load config from a TOML file.
///
/// If the file is missing, returns `BudgetConfig::default()`. Parse and
/// validation failures surface as [`GuardianError::ConfigInvalid`].
pub fn load_config(path: &Path) -> Result<BudgetConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = BudgetConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BudgetConfig = toml::from_str(&contents).map_err(|err| {
        GuardianError::ConfigInvalid(format!("parse {}: {err}", path.display()))
    })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BudgetConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
