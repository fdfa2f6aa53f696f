//! Shared test helpers for node tests.

#![allow(dead_code)]

use serde_json::json;
use std::path::Path;
use vigil_node::config::NodeConfig;
use vigil_sync::Zone;

/// Writes a small inventory to `dir/objects.json` and returns its path.
pub fn write_inventory(dir: &Path) -> std::path::PathBuf {
    let inventory = json!([
        { "type": "CheckCommand", "name": "ping", "attrs": { "command": ["ping", "-c", "1", "$address$"] } },
        { "type": "Host", "name": "h1", "attrs": { "zone": "sat", "address": "192.0.2.1", "check_command": "ping" } },
        { "type": "Service", "name": "h1!ssh", "attrs": { "zone": "sat", "check_command": "ping" } },
        { "type": "Host", "name": "m1", "attrs": { "zone": "master", "check_command": "ping" } }
    ]);
    let path = dir.join("objects.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&inventory).unwrap()).unwrap();
    path
}

/// Two-zone cluster: `master-1` above `sat-1`.
pub fn zones() -> Vec<Zone> {
    vec![
        Zone::new("master", None, &["master-1"]),
        Zone::new("sat", Some("master"), &["sat-1"]),
    ]
}

/// Config for `endpoint` keeping its state under `dir/<endpoint>`.
pub fn config(dir: &Path, endpoint: &str) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.node.endpoint = endpoint.to_string();
    config.node.state_dir = dir.join(endpoint);
    config.node.inventory = Some(write_inventory(dir));
    config.zones = zones();
    config
}
