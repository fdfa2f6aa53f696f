mod common;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use vigil_model::{types, ObjectRegistry};
use vigil_node::inventory::{apply_inventory, load_inventory, parse_inventory};

#[test]
fn inventory_file_is_loaded() {
    let dir = TempDir::new().unwrap();
    let path = common::write_inventory(dir.path());
    let registry = ObjectRegistry::with_builtin_types();

    let count = load_inventory(&registry, &path).unwrap();

    assert_eq!(count, 4);
    assert_eq!(registry.object_count(), 4);
    let h1 = registry.host("h1").unwrap();
    assert_eq!(h1.zone().as_deref(), Some("sat"));
    assert_eq!(h1.get_str("address").as_deref(), Some("192.0.2.1"));
}

#[test]
fn service_identity_comes_from_its_name() {
    let dir = TempDir::new().unwrap();
    let registry = ObjectRegistry::with_builtin_types();
    load_inventory(&registry, &common::write_inventory(dir.path())).unwrap();

    let ssh = registry.service("h1", "ssh").unwrap();
    assert_eq!(ssh.get_str("host_name").as_deref(), Some("h1"));
    assert_eq!(ssh.get_str("short_name").as_deref(), Some("ssh"));
}

#[test]
fn explicit_service_identity_is_kept() {
    let registry = ObjectRegistry::with_builtin_types();
    let items = parse_inventory(
        r#"[
            { "type": "Host", "name": "db" },
            { "type": "Service", "name": "db!pg", "attrs": { "host_name": "db", "short_name": "postgres" } }
        ]"#,
    )
    .unwrap();

    apply_inventory(&registry, items).unwrap();

    let service = registry.get(types::SERVICE, "db!pg").unwrap();
    assert_eq!(service.get_str("short_name").as_deref(), Some("postgres"));
}

#[test]
fn unknown_type_fails_with_object_name() {
    let registry = ObjectRegistry::with_builtin_types();
    let items = parse_inventory(r#"[{ "type": "Dashboard", "name": "ops" }]"#).unwrap();

    let err = apply_inventory(&registry, items).unwrap_err();

    assert!(format!("{err:#}").contains("Dashboard 'ops'"));
}

#[test]
fn malformed_inventory_is_rejected() {
    assert!(parse_inventory(r#"{ "type": "Host" }"#).is_err());
    assert!(parse_inventory(r#"[{ "name": "h" }]"#).is_err());
}

#[test]
fn missing_inventory_file_fails() {
    let dir = TempDir::new().unwrap();
    let registry = ObjectRegistry::with_builtin_types();

    assert!(load_inventory(&registry, &dir.path().join("none.json")).is_err());
}
