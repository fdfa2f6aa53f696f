use pretty_assertions::assert_eq;
use serde_json::{json, Map};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use vigil_model::{
    schema, types, Authority, Entity, LifecycleHooks, ModelError, ObjectLookup, ObjectRegistry,
};

fn attrs(value: serde_json::Value) -> Map<String, serde_json::Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[derive(Default)]
struct RecordingHooks {
    events: Mutex<Vec<String>>,
    state_loaded: AtomicUsize,
}

impl RecordingHooks {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl LifecycleHooks for RecordingHooks {
    fn on_active_changed(&self, entity: &Entity, active: bool) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{}:active={active}", entity.name()));
    }

    fn on_pause(&self, entity: &Entity) {
        self.events.lock().unwrap().push(format!("{}:pause", entity.name()));
    }

    fn on_resume(&self, entity: &Entity) {
        self.events.lock().unwrap().push(format!("{}:resume", entity.name()));
    }

    fn on_state_loaded(&self, entity: &Entity, restored: bool) {
        self.state_loaded.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(format!("{}:loaded={restored}", entity.name()));
    }
}

fn make_hooked_registry() -> (ObjectRegistry, Arc<RecordingHooks>) {
    let hooks = Arc::new(RecordingHooks::default());
    let registry = ObjectRegistry::new();
    registry.register_type(schema::host().with_hooks(hooks.clone()));
    (registry, hooks)
}

// ── Registration ─────────────────────────────────────────────────

#[test]
fn builtin_types_registered() {
    let registry = ObjectRegistry::with_builtin_types();
    let names: Vec<String> = registry.types().iter().map(|t| t.name().to_string()).collect();
    for expected in [
        types::HOST,
        types::SERVICE,
        types::NOTIFICATION,
        types::USER,
        types::CHECK_COMMAND,
        types::EVENT_COMMAND,
        types::NOTIFICATION_COMMAND,
        types::TIME_PERIOD,
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
}

#[test]
fn create_and_lookup() {
    let registry = ObjectRegistry::with_builtin_types();
    registry.create(types::HOST, "h1", &Map::new()).unwrap();

    assert!(registry.host("h1").is_some());
    assert!(registry.get(types::HOST, "h2").is_none());
    assert!(registry.object_exists(types::HOST, "h1"));
    assert_eq!(registry.object_count(), 1);
}

#[test]
fn duplicate_object_rejected() {
    let registry = ObjectRegistry::with_builtin_types();
    registry.create(types::HOST, "h1", &Map::new()).unwrap();

    let err = registry.create(types::HOST, "h1", &Map::new()).unwrap_err();
    assert!(matches!(err, ModelError::DuplicateObject { .. }));
}

#[test]
fn unknown_type_rejected() {
    let registry = ObjectRegistry::with_builtin_types();
    let err = registry.create("Gadget", "g1", &Map::new()).unwrap_err();
    assert!(matches!(err, ModelError::UnknownType(name) if name == "Gadget"));
}

#[test]
fn create_with_wrong_kind_rejected() {
    let registry = ObjectRegistry::with_builtin_types();
    let err = registry
        .create(types::HOST, "h1", &attrs(json!({ "check_interval": "often" })))
        .unwrap_err();
    assert!(matches!(err, ModelError::Validation { .. }));
    assert!(registry.host("h1").is_none());
}

#[test]
fn unregister_removes_object() {
    let registry = ObjectRegistry::with_builtin_types();
    registry.create(types::HOST, "h1", &Map::new()).unwrap();

    assert!(registry.unregister(types::HOST, "h1").is_some());
    assert!(registry.host("h1").is_none());
    assert!(registry.unregister(types::HOST, "h1").is_none());
}

#[test]
fn services_resolve_by_short_name() {
    let registry = ObjectRegistry::with_builtin_types();
    registry.create(types::HOST, "web", &Map::new()).unwrap();
    registry
        .create(
            types::SERVICE,
            "web!http",
            &attrs(json!({ "host_name": "web", "short_name": "http" })),
        )
        .unwrap();
    registry
        .create(
            types::SERVICE,
            "web!disk",
            &attrs(json!({ "host_name": "web", "short_name": "disk" })),
        )
        .unwrap();

    assert_eq!(registry.service("web", "http").unwrap().name(), "web!http");
    assert!(registry.service("web", "ssh").is_none());

    let names: Vec<String> = registry
        .services_of("web")
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    assert_eq!(names, vec!["web!disk".to_string(), "web!http".to_string()]);
}

// ── Lifecycle ────────────────────────────────────────────────────

#[test]
fn entities_start_paused() {
    let registry = ObjectRegistry::with_builtin_types();
    let h1 = registry.create(types::HOST, "h1", &Map::new()).unwrap();

    assert_eq!(h1.authority(), Authority::Paused);
    assert!(!h1.is_active());
    assert!(!h1.start_called());
}

#[test]
fn activate_starts_and_resumes() {
    let (registry, hooks) = make_hooked_registry();
    let h1 = registry.create(types::HOST, "h1", &Map::new()).unwrap();

    h1.activate();

    assert!(h1.is_active());
    assert!(h1.start_called());
    assert_eq!(h1.authority(), Authority::Active);
    assert_eq!(hooks.events(), vec!["h1:resume", "h1:active=true"]);
}

#[test]
fn activate_twice_is_noop() {
    let (registry, hooks) = make_hooked_registry();
    let h1 = registry.create(types::HOST, "h1", &Map::new()).unwrap();

    h1.activate();
    h1.activate();

    assert_eq!(hooks.events().len(), 2);
}

#[test]
fn deactivate_pauses_and_stops() {
    let (registry, hooks) = make_hooked_registry();
    let h1 = registry.create(types::HOST, "h1", &Map::new()).unwrap();

    h1.activate();
    h1.deactivate();

    assert!(!h1.is_active());
    assert!(h1.stop_called());
    assert!(h1.is_paused());
    assert_eq!(
        hooks.events(),
        vec!["h1:resume", "h1:active=true", "h1:pause", "h1:active=false"]
    );
}

#[test]
fn deactivate_revokes_authority_of_inactive_object() {
    let (registry, hooks) = make_hooked_registry();
    let h1 = registry.create(types::HOST, "h1", &Map::new()).unwrap();
    h1.set_authority(true);

    h1.deactivate();

    assert!(h1.is_paused());
    assert!(!h1.stop_called());
    assert_eq!(hooks.events(), vec!["h1:resume", "h1:pause"]);
}

#[test]
fn authority_transitions_are_idempotent() {
    let (registry, hooks) = make_hooked_registry();
    let h1 = registry.create(types::HOST, "h1", &Map::new()).unwrap();

    assert!(!h1.set_authority(false));
    assert!(h1.set_authority(true));
    assert!(!h1.set_authority(true));
    assert!(h1.set_authority(false));

    assert_eq!(hooks.events(), vec!["h1:resume", "h1:pause"]);
}

#[test]
fn state_loaded_fires_once() {
    let (registry, hooks) = make_hooked_registry();
    let h1 = registry.create(types::HOST, "h1", &Map::new()).unwrap();

    assert!(h1.set_state_loaded(true));
    assert!(!h1.set_state_loaded(false));

    assert!(h1.is_state_loaded());
    assert_eq!(hooks.state_loaded.load(Ordering::SeqCst), 1);
}

#[test]
fn complete_state_load_covers_untouched_objects() {
    let (registry, hooks) = make_hooked_registry();
    let h1 = registry.create(types::HOST, "h1", &Map::new()).unwrap();
    registry.create(types::HOST, "h2", &Map::new()).unwrap();
    registry.create(types::HOST, "h3", &Map::new()).unwrap();

    h1.set_state_loaded(true);
    let fresh = registry.complete_state_load();

    assert_eq!(fresh, 2);
    assert_eq!(hooks.state_loaded.load(Ordering::SeqCst), 3);
    assert!(hooks.events().contains(&"h2:loaded=false".to_string()));
}

#[test]
fn activate_and_stop_all_objects() {
    let registry = ObjectRegistry::with_builtin_types();
    let h1 = registry.create(types::HOST, "h1", &Map::new()).unwrap();
    let cmd = registry.create(types::CHECK_COMMAND, "ping", &Map::new()).unwrap();

    registry.activate_objects();
    assert!(h1.is_active() && cmd.is_active());

    registry.stop_objects();
    assert!(!h1.is_active() && !cmd.is_active());
    assert!(h1.stop_called() && cmd.stop_called());
}

// ── Extensions ───────────────────────────────────────────────────

#[test]
fn extensions_are_not_serialized() {
    let registry = ObjectRegistry::with_builtin_types();
    let h1 = registry.create(types::HOST, "h1", &Map::new()).unwrap();

    h1.set_extension("agent_check", json!(true));

    assert_eq!(h1.get_extension("agent_check"), Some(json!(true)));
    assert!(!h1.serialize(vigil_types::AttributeClass::ALL).contains_key("agent_check"));
}
