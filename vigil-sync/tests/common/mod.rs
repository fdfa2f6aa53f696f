//! Shared test helpers for sync tests.

#![allow(dead_code)]

use serde_json::{json, Map, Value};
use std::sync::Arc;
use vigil_model::{types, ObjectRegistry};
use vigil_sync::{Zone, ZoneTree};
use vigil_types::Origin;

/// Three-level cluster: `master` ← `sat` ← `agent`.
pub fn zones() -> Vec<Zone> {
    vec![
        Zone::new("master", None, &["master-1", "master-2"]),
        Zone::new("sat", Some("master"), &["sat-1", "sat-2"]),
        Zone::new("agent", Some("sat"), &["agent-1"]),
    ]
}

/// The zone tree as seen from `endpoint`.
pub fn tree(endpoint: &str) -> Arc<ZoneTree> {
    Arc::new(ZoneTree::new(endpoint, zones()).unwrap())
}

pub fn origin(endpoint: &str) -> Origin {
    let zone = match endpoint {
        e if e.starts_with("master") => "master",
        e if e.starts_with("sat") => "sat",
        _ => "agent",
    };
    Origin::from_zone(endpoint, zone)
}

fn attrs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Registry populated with objects spread across the cluster's zones.
///
/// - `h1` (zone `sat`) with service `disk`, notification `h1!disk!mail`
/// - `h2` (zone `sat`) checked by `agent-1`
/// - `agent-host` (zone `agent`)
/// - `m1` (zone `master`)
pub fn registry() -> Arc<ObjectRegistry> {
    let registry = ObjectRegistry::with_builtin_types();
    let create = |type_name: &str, name: &str, value: Value| {
        registry.create(type_name, name, &attrs(value)).unwrap();
    };

    create(types::CHECK_COMMAND, "ping", json!({ "command": ["ping", "-c", "1", "$address$"] }));
    create(types::CHECK_COMMAND, "disk-check", json!({ "command": "echo disk ok" }));
    create(types::EVENT_COMMAND, "restart", json!({ "command": "true" }));
    create(types::TIME_PERIOD, "24x7", json!({}));
    create(types::USER, "ops", json!({ "email": "ops@example.org" }));

    create(types::HOST, "h1", json!({ "zone": "sat", "check_command": "ping", "check_interval": 60 }));
    create(
        types::SERVICE,
        "h1!disk",
        json!({ "zone": "sat", "host_name": "h1", "short_name": "disk", "check_command": "disk-check" }),
    );
    create(
        types::NOTIFICATION,
        "h1!disk!mail",
        json!({ "zone": "sat", "host_name": "h1", "service_name": "disk" }),
    );
    create(
        types::HOST,
        "h2",
        json!({ "zone": "sat", "check_command": "ping", "command_endpoint": "agent-1" }),
    );
    create(types::HOST, "agent-host", json!({ "zone": "agent", "check_command": "ping" }));
    create(types::HOST, "m1", json!({ "zone": "master", "check_command": "ping" }));

    Arc::new(registry)
}
