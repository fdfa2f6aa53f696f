mod common;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vigil_storage::RepositoryStore;
use vigil_sync::hub::mock::RecordingHub;
use vigil_sync::protocol::RepositoryParams;
use vigil_sync::topology::receive_repository;
use vigil_sync::{
    ApplyOutcome, DiscardReason, Envelope, EventMethod, EventRouter, RouterConfig, TopologyBroadcaster,
    TopologyConfig,
};

fn broadcaster(local: &str, hub: Arc<RecordingHub>, interval: Duration) -> TopologyBroadcaster {
    TopologyBroadcaster::new(
        common::registry(),
        common::tree(local),
        hub,
        TopologyConfig { interval },
    )
}

fn repository_envelope(endpoint: &str, repository: Value) -> Envelope {
    Envelope::new(
        EventMethod::UpdateRepository,
        json!({
            "seen": 1_800_000_000.0,
            "endpoint": endpoint,
            "zone": "agent",
            "parent_zone": "sat",
            "repository": repository
        })
        .as_object()
        .cloned()
        .unwrap(),
    )
}

// ── Broadcasting ─────────────────────────────────────────────────

#[test]
fn inventory_lists_hosts_with_service_short_names() {
    let topology = broadcaster("sat-1", Arc::new(RecordingHub::new("sat")), Duration::from_secs(30));

    let expected: BTreeMap<String, Vec<String>> = [
        ("agent-host", vec![]),
        ("h1", vec!["disk"]),
        ("h2", vec![]),
        ("m1", vec![]),
    ]
    .into_iter()
    .map(|(host, services)| (host.to_string(), services.into_iter().map(str::to_string).collect()))
    .collect();
    assert_eq!(topology.inventory(), expected);
}

#[test]
fn envelope_describes_the_sender() {
    let topology = broadcaster("sat-1", Arc::new(RecordingHub::new("sat")), Duration::from_secs(30));

    let envelope = topology.build_envelope().unwrap();

    assert_eq!(envelope.event_method().unwrap(), EventMethod::UpdateRepository);
    let params: RepositoryParams = serde_json::from_value(Value::Object(envelope.params)).unwrap();
    assert_eq!(params.endpoint, "sat-1");
    assert_eq!(params.zone, "sat");
    assert_eq!(params.parent_zone.as_deref(), Some("master"));
    assert_eq!(params.repository["h1"], vec!["disk".to_string()]);
    assert!(params.seen > 0.0);
}

#[test]
fn top_level_zone_has_no_parent() {
    let topology = broadcaster("master-1", Arc::new(RecordingHub::new("master")), Duration::from_secs(30));

    let envelope = topology.build_envelope().unwrap();

    assert!(!envelope.params.contains_key("parent_zone"));
}

#[tokio::test]
async fn broadcast_targets_own_zone_without_descendants() {
    let hub = Arc::new(RecordingHub::new("sat"));
    let topology = broadcaster("sat-1", hub.clone(), Duration::from_secs(30));

    topology.broadcast().await.unwrap();

    let relays = hub.relays();
    assert_eq!(relays.len(), 1);
    assert_eq!(relays[0].origin, None);
    assert_eq!(relays[0].zone, "sat");
    assert!(!relays[0].include_descendants);
    assert_eq!(relays[0].envelope.method, "event::UpdateRepository");
}

#[tokio::test(start_paused = true)]
async fn run_broadcasts_immediately_and_on_every_tick() {
    let hub = Arc::new(RecordingHub::new("sat"));
    let topology = Arc::new(broadcaster("sat-1", hub.clone(), Duration::from_secs(30)));

    let task = tokio::spawn(topology.run());
    tokio::time::sleep(Duration::from_secs(61)).await;
    task.abort();

    assert_eq!(hub.relays().len(), 3);
}

// ── Receiving ────────────────────────────────────────────────────

#[tokio::test]
async fn received_repository_is_stored_and_forwarded() {
    let dir = TempDir::new().unwrap();
    let store = RepositoryStore::new(dir.path());
    let hub = RecordingHub::new("sat");
    let origin = common::origin("agent-1");
    let envelope = repository_envelope("agent-1", json!({ "agent-host": ["load"] }));

    receive_repository(&store, &hub, "sat", &origin, &envelope.params)
        .await
        .unwrap();

    let stored = store.read("agent-1").await.unwrap().unwrap();
    assert_eq!(stored, Value::Object(envelope.params.clone()));

    let relays = hub.relays();
    assert_eq!(relays.len(), 1);
    assert_eq!(relays[0].origin, Some(origin));
    assert_eq!(relays[0].zone, "sat");
    assert!(relays[0].include_descendants);
    assert_eq!(relays[0].envelope, envelope);
}

#[tokio::test]
async fn newer_repository_replaces_older() {
    let dir = TempDir::new().unwrap();
    let store = RepositoryStore::new(dir.path());
    let hub = RecordingHub::new("sat");
    let origin = common::origin("agent-1");

    for services in [json!(["load"]), json!(["load", "swap"])] {
        let envelope = repository_envelope("agent-1", json!({ "agent-host": services }));
        receive_repository(&store, &hub, "sat", &origin, &envelope.params)
            .await
            .unwrap();
    }

    let stored = store.read("agent-1").await.unwrap().unwrap();
    assert_eq!(stored["repository"]["agent-host"], json!(["load", "swap"]));
}

#[tokio::test]
async fn router_stores_repository_updates() {
    let dir = TempDir::new().unwrap();
    let hub = Arc::new(RecordingHub::new("sat"));
    let router = EventRouter::new(
        common::registry(),
        common::tree("sat-1"),
        hub.clone(),
        RouterConfig::default(),
    )
    .with_repository(RepositoryStore::new(dir.path()));

    let outcome = router
        .handle_message(
            &common::origin("agent-1"),
            &repository_envelope("agent-1", json!({ "agent-host": [] })),
        )
        .await;

    assert_eq!(outcome, ApplyOutcome::RepositoryUpdated);
    assert!(RepositoryStore::new(dir.path()).path_for("agent-1").exists());
    assert_eq!(hub.relays().len(), 1);
}

#[tokio::test]
async fn repository_must_be_a_dictionary() {
    let dir = TempDir::new().unwrap();
    let hub = Arc::new(RecordingHub::new("sat"));
    let router = EventRouter::new(
        common::registry(),
        common::tree("sat-1"),
        hub.clone(),
        RouterConfig::default(),
    )
    .with_repository(RepositoryStore::new(dir.path()));
    let origin = common::origin("agent-1");

    let outcome = router
        .handle_message(&origin, &repository_envelope("agent-1", json!(["agent-host"])))
        .await;
    assert_eq!(outcome, ApplyOutcome::Discarded(DiscardReason::MalformedParams));

    let mut envelope = repository_envelope("agent-1", json!({}));
    envelope.params.remove("endpoint");
    let outcome = router.handle_message(&origin, &envelope).await;
    assert_eq!(outcome, ApplyOutcome::Discarded(DiscardReason::MalformedParams));

    assert!(hub.relays().is_empty());
}

#[tokio::test]
async fn router_without_store_ignores_repositories() {
    let hub = Arc::new(RecordingHub::new("sat"));
    let router = EventRouter::new(
        common::registry(),
        common::tree("sat-1"),
        hub.clone(),
        RouterConfig::default(),
    );

    let outcome = router
        .handle_message(
            &common::origin("agent-1"),
            &repository_envelope("agent-1", json!({})),
        )
        .await;

    assert_eq!(outcome, ApplyOutcome::Discarded(DiscardReason::Unsupported));
    assert!(hub.relays().is_empty());
}
