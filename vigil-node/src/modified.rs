//! Persistence of runtime attribute modifications.
//!
//! The state snapshot only carries runtime-state attributes. Runtime changes
//! to config attributes (a disabled check, a new check interval) are written
//! separately as a JSON array and replayed over the freshly loaded inventory
//! on the next start, which rebuilds each object's overlay.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};
use vigil_model::ObjectRegistry;
use vigil_storage::atomic::atomic_write;
use vigil_types::AttributePath;

/// One modified attribute path and its current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedAttribute {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    pub attr: String,
    pub value: Value,
}

pub fn collect_modified_attributes(registry: &ObjectRegistry) -> Vec<ModifiedAttribute> {
    let mut modified = Vec::new();
    registry.dump_modified_attributes(|entity, attr, value| {
        modified.push(ModifiedAttribute {
            type_name: entity.type_name().to_string(),
            name: entity.name().to_string(),
            attr: attr.to_string(),
            value: value.clone(),
        });
    });
    modified
}

/// Replaces `path` with the registry's current modifications.
pub async fn write_modified_attributes(registry: &ObjectRegistry, path: &Path) -> Result<usize> {
    let modified = collect_modified_attributes(registry);
    let bytes = serde_json::to_vec_pretty(&modified)?;
    atomic_write(path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Wrote {} modified attributes to {}", modified.len(), path.display());
    Ok(modified.len())
}

/// Re-applies stored modifications. Entries naming unknown objects or
/// paths the model rejects are skipped. Returns how many were applied.
pub async fn replay_modified_attributes(registry: &ObjectRegistry, path: &Path) -> Result<usize> {
    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let entries: Vec<ModifiedAttribute> = serde_json::from_slice(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut applied = 0;
    for entry in entries {
        let Some(entity) = registry.get(&entry.type_name, &entry.name) else {
            debug!(
                "Skipping modified attribute '{}' of missing {} '{}'",
                entry.attr, entry.type_name, entry.name
            );
            continue;
        };
        let result = AttributePath::parse(&entry.attr)
            .map_err(vigil_model::ModelError::from)
            .and_then(|attr| entity.modify_attribute(&attr, entry.value, registry));
        match result {
            Ok(()) => applied += 1,
            Err(e) => warn!(
                "Cannot restore '{}' of {} '{}': {}",
                entry.attr, entry.type_name, entry.name, e
            ),
        }
    }
    info!("Restored {} modified attributes", applied);
    Ok(applied)
}
