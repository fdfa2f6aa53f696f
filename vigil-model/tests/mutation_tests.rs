use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::thread;
use vigil_model::{
    types, Acknowledgement, AcknowledgementType, CheckResult, Comment, CommentType, Downtime, Entity,
    Feature, Mutation, ObjectRegistry, PerfdataEntry, ServiceState, ACKNOWLEDGEMENT_COMMENT_ID,
};
use vigil_types::{AttributeClass, Origin};

fn make_registry() -> (ObjectRegistry, Arc<Entity>) {
    let registry = ObjectRegistry::with_builtin_types();
    registry.create(types::EVENT_COMMAND, "restart", &Map::new()).unwrap();
    let h1 = registry.create(types::HOST, "h1", &Map::new()).unwrap();
    (registry, h1)
}

// ── Applying ─────────────────────────────────────────────────────

#[test]
fn check_result_sets_state_and_last_result() {
    let (registry, h1) = make_registry();
    let cr = CheckResult::new(ServiceState::Critical, "connection refused");

    assert!(registry.apply(&h1, Mutation::CheckResult(cr.clone()), None).unwrap());

    assert_eq!(h1.get_field("state").unwrap(), json!(2));
    let stored: CheckResult = serde_json::from_value(h1.get_field("last_check_result").unwrap()).unwrap();
    assert_eq!(stored, cr);
}

#[test]
fn feature_toggle_sets_flag() {
    let (registry, h1) = make_registry();

    registry
        .apply(
            &h1,
            Mutation::Feature {
                feature: Feature::ActiveChecks,
                enabled: false,
            },
            None,
        )
        .unwrap();

    assert_eq!(h1.get_bool("enable_active_checks"), Some(false));
    assert!(h1.is_attribute_modified("enable_active_checks"));
}

#[test]
fn every_feature_maps_to_a_field() {
    let (registry, h1) = make_registry();
    for feature in Feature::ALL {
        registry
            .apply(&h1, Mutation::Feature { feature, enabled: true }, None)
            .unwrap();
        assert_eq!(h1.get_bool(feature.field()), Some(true));
    }
}

#[test]
fn event_command_must_exist() {
    let (registry, h1) = make_registry();

    assert!(registry
        .apply(&h1, Mutation::EventCommand("missing".into()), None)
        .is_err());
    registry
        .apply(&h1, Mutation::EventCommand("restart".into()), None)
        .unwrap();

    assert_eq!(h1.get_str("event_command").as_deref(), Some("restart"));
}

#[test]
fn comments_add_and_remove() {
    let (registry, h1) = make_registry();
    let comment = Comment::new("alice", "investigating");
    let id = comment.id.clone();

    registry.apply(&h1, Mutation::AddComment(comment), None).unwrap();
    let comments = h1.get_field("comments").unwrap();
    assert_eq!(comments[&id]["author"], json!("alice"));

    assert!(registry.apply(&h1, Mutation::RemoveComment(id.clone()), None).unwrap());
    assert_eq!(h1.get_field("comments").unwrap(), json!({}));

    assert!(!registry.apply(&h1, Mutation::RemoveComment(id), None).unwrap());
}

#[test]
fn downtimes_add_and_remove() {
    let (registry, h1) = make_registry();
    let downtime = Downtime::new("bob", "patching", 100.0, 200.0);
    let id = downtime.id.clone();

    registry.apply(&h1, Mutation::AddDowntime(downtime), None).unwrap();
    assert_eq!(h1.get_field("downtimes").unwrap()[&id]["duration"], json!(100.0));

    registry.apply(&h1, Mutation::RemoveDowntime(id), None).unwrap();
    assert_eq!(h1.get_field("downtimes").unwrap(), json!({}));
}

#[test]
fn acknowledge_and_clear() {
    let (registry, h1) = make_registry();
    let ack = Acknowledgement {
        author: "carol".into(),
        comment: "known issue".into(),
        kind: AcknowledgementType::Sticky,
        notify: true,
        expiry: 500.0,
    };

    registry.apply(&h1, Mutation::Acknowledge(ack), None).unwrap();
    assert_eq!(h1.get_field("acknowledgement").unwrap(), json!(2));
    assert_eq!(h1.get_number("acknowledgement_expiry"), Some(500.0));
    assert_eq!(h1.get_str("acknowledgement_author").as_deref(), Some("carol"));
    assert_eq!(h1.get_str("acknowledgement_comment").as_deref(), Some("known issue"));

    let comment: Comment =
        serde_json::from_value(h1.get_field("comments").unwrap()[ACKNOWLEDGEMENT_COMMENT_ID].clone()).unwrap();
    assert_eq!(comment.author, "carol");
    assert_eq!(comment.text, "known issue");
    assert_eq!(comment.entry_type, CommentType::Acknowledgement);
    assert_eq!(comment.expire_time, 500.0);

    registry.apply(&h1, Mutation::ClearAcknowledgement, None).unwrap();
    assert_eq!(h1.get_field("acknowledgement").unwrap(), json!(0));
    assert_eq!(h1.get_str("acknowledgement_author"), None);
    assert_eq!(h1.get_field("comments").unwrap(), json!({}));
}

#[test]
fn acknowledgement_details_survive_state_round_trip() {
    let (registry, h1) = make_registry();
    let ack = Acknowledgement {
        author: "carol".into(),
        comment: "known issue".into(),
        kind: AcknowledgementType::Normal,
        notify: false,
        expiry: 0.0,
    };
    registry.apply(&h1, Mutation::Acknowledge(ack), None).unwrap();

    let (_other_registry, copy) = make_registry();
    copy.deserialize(&h1.serialize(AttributeClass::STATE), AttributeClass::STATE)
        .unwrap();

    assert_eq!(copy.get_str("acknowledgement_author").as_deref(), Some("carol"));
    assert_eq!(copy.get_str("acknowledgement_comment").as_deref(), Some("known issue"));
    assert_eq!(
        copy.get_field("comments").unwrap()[ACKNOWLEDGEMENT_COMMENT_ID]["text"],
        json!("known issue")
    );
}

#[test]
fn next_notification_on_notification_object() {
    let registry = ObjectRegistry::with_builtin_types();
    let n = registry
        .create(types::NOTIFICATION, "h1!mail", &Map::new())
        .unwrap();

    registry.apply(&n, Mutation::NextNotification(1234.0), None).unwrap();
    assert_eq!(n.get_number("next_notification"), Some(1234.0));
}

// ── Change notifications ─────────────────────────────────────────

#[tokio::test]
async fn apply_publishes_change_with_origin() {
    let (registry, h1) = make_registry();
    let mut rx = registry.subscribe();
    let origin = Origin::from_zone("sat-1", "satellite");

    registry
        .apply(&h1, Mutation::NextCheck(10.0), Some(origin.clone()))
        .unwrap();

    let change = rx.recv().await.unwrap();
    assert_eq!(change.entity.name(), "h1");
    assert_eq!(change.mutation, Mutation::NextCheck(10.0));
    assert_eq!(change.origin, Some(origin));
}

#[tokio::test]
async fn noop_mutation_publishes_nothing() {
    let (registry, h1) = make_registry();
    let mut rx = registry.subscribe();

    registry
        .apply(&h1, Mutation::RemoveComment("nope".into()), None)
        .unwrap();

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn failed_mutation_publishes_nothing() {
    let (registry, h1) = make_registry();
    let mut rx = registry.subscribe();

    assert!(registry
        .apply(&h1, Mutation::CheckPeriod("missing".into()), None)
        .is_err());

    assert!(rx.try_recv().is_err());
}

// ── Perfdata ─────────────────────────────────────────────────────

#[test]
fn perfdata_entries_typed_or_passed_through() {
    let cr: CheckResult = serde_json::from_value(json!({
        "state": 1,
        "output": "load high",
        "performance_data": [
            { "label": "load1", "value": 4.2, "warn": 4.0, "crit": 8.0 },
            "load5=3.1;4;8",
        ],
    }))
    .unwrap();

    assert_eq!(cr.state, ServiceState::Warning);
    assert!(matches!(&cr.performance_data[0], PerfdataEntry::Value(v) if v.label == "load1"));
    assert_eq!(
        cr.performance_data[1],
        PerfdataEntry::Raw(Value::from("load5=3.1;4;8"))
    );
    assert_eq!(cr.perfdata_values().count(), 1);
}

#[test]
fn exit_status_maps_to_state() {
    assert_eq!(ServiceState::from_exit_status(0), ServiceState::Ok);
    assert_eq!(ServiceState::from_exit_status(2), ServiceState::Critical);
    assert_eq!(ServiceState::from_exit_status(3), ServiceState::Unknown);
    assert_eq!(ServiceState::from_exit_status(127), ServiceState::Unknown);
}

// ── Concurrent overrides ─────────────────────────────────────────

#[test]
fn last_arrival_wins_and_version_counts_both() {
    let (registry, h1) = make_registry();

    registry
        .apply(&h1, Mutation::CheckInterval(30.0), Some(Origin::from_zone("a", "zone-a")))
        .unwrap();
    registry
        .apply(&h1, Mutation::CheckInterval(90.0), Some(Origin::from_zone("b", "zone-b")))
        .unwrap();

    assert_eq!(h1.get_number("check_interval"), Some(90.0));
    assert_eq!(h1.version(), 2);
    assert_eq!(h1.original_attributes().get("check_interval"), Some(&json!(300)));
}

#[test]
fn concurrent_updates_serialize_per_entity() {
    let (registry, h1) = make_registry();
    let registry = Arc::new(registry);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let h1 = Arc::clone(&h1);
            thread::spawn(move || {
                for j in 0..50 {
                    let origin = Origin::from_zone(format!("ep-{i}"), format!("zone-{i}"));
                    registry
                        .apply(&h1, Mutation::CheckInterval(f64::from(i * 100 + j)), Some(origin))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(h1.version(), 400);
    assert_eq!(h1.original_attributes().get("check_interval"), Some(&json!(300)));
}
