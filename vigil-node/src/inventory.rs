//! Object inventory loading.
//!
//! The inventory is a JSON array of compiled objects:
//!
//! ```json
//! [
//!   { "type": "Host", "name": "web-1", "attrs": { "zone": "sat", "check_command": "ping" } },
//!   { "type": "Service", "name": "web-1!http", "attrs": { "check_command": "http" } }
//! ]
//! ```
//!
//! Services may omit `host_name` and `short_name`; both are taken from the
//! `host!short` object name.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;
use vigil_model::{types, ObjectRegistry};

/// One compiled object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

pub fn parse_inventory(contents: &str) -> Result<Vec<InventoryItem>> {
    serde_json::from_str(contents).context("Inventory must be a JSON array of objects")
}

/// Registers every item, in order. Fails on the first object the model
/// refuses.
pub fn apply_inventory(registry: &ObjectRegistry, items: Vec<InventoryItem>) -> Result<usize> {
    let count = items.len();
    for mut item in items {
        if item.type_name == types::SERVICE {
            fill_service_identity(&mut item);
        }
        registry
            .create(&item.type_name, &item.name, &item.attrs)
            .with_context(|| format!("Failed to create {} '{}'", item.type_name, item.name))?;
    }
    Ok(count)
}

pub fn load_inventory(registry: &ObjectRegistry, path: &Path) -> Result<usize> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory {}", path.display()))?;
    let items = parse_inventory(&contents)?;
    let count = apply_inventory(registry, items)?;
    info!("Loaded {} objects from {}", count, path.display());
    Ok(count)
}

fn fill_service_identity(item: &mut InventoryItem) {
    let Some((host, short_name)) = item.name.split_once('!') else {
        return;
    };
    item.attrs
        .entry("host_name")
        .or_insert_with(|| Value::from(host));
    item.attrs
        .entry("short_name")
        .or_insert_with(|| Value::from(short_name));
}
