//! Event arc registry stored under `.guardian/state/event_arcs.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::event_arc::EventArcRegistry;
use crate::error::GuardianError;

/// Load the registry; a missing file means no arcs.
pub fn load_event_arcs(path: &Path) -> Result<EventArcRegistry> {
    if !path.exists() {
        return Ok(EventArcRegistry::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let registry: EventArcRegistry = toml::from_str(&contents).map_err(|err| {
        GuardianError::ConfigInvalid(format!("parse {}: {err}", path.display()))
    })?;
    let errors = registry.problems();
    if !errors.is_empty() {
        return Err(GuardianError::ConfigInvalid(errors.join("; ")).into());
    }
    Ok(registry)
}
