use chrono::{TimeZone, Utc};
use vigil_types::{timestamp, AttributeClass, Error, Origin};

// ── AttributeClass ────────────────────────────────────────────────

#[test]
fn all_contains_config_and_state() {
    assert!(AttributeClass::ALL.contains(AttributeClass::CONFIG));
    assert!(AttributeClass::ALL.contains(AttributeClass::STATE));
    assert!(!AttributeClass::CONFIG.contains(AttributeClass::STATE));
}

#[test]
fn intersects_shared_bits() {
    assert!(AttributeClass::STATE.intersects(AttributeClass::ALL));
    assert!(!AttributeClass::STATE.intersects(AttributeClass::CONFIG));
    assert!(!AttributeClass::NONE.intersects(AttributeClass::ALL));
}

#[test]
fn bitor_combines() {
    let mut class = AttributeClass::CONFIG;
    class |= AttributeClass::STATE;
    assert_eq!(class, AttributeClass::ALL);
    assert_eq!(AttributeClass::CONFIG | AttributeClass::STATE, AttributeClass::ALL);
}

#[test]
fn parse_class_names() {
    assert_eq!("config".parse::<AttributeClass>().unwrap(), AttributeClass::CONFIG);
    assert_eq!("State".parse::<AttributeClass>().unwrap(), AttributeClass::STATE);
    assert_eq!("config|state".parse::<AttributeClass>().unwrap(), AttributeClass::ALL);
}

#[test]
fn parse_unknown_class() {
    let err = "runtime".parse::<AttributeClass>().unwrap_err();
    assert!(matches!(err, Error::UnknownClass(name) if name == "runtime"));
}

#[test]
fn display_class() {
    assert_eq!(AttributeClass::ALL.to_string(), "config|state");
    assert_eq!(AttributeClass::NONE.to_string(), "none");
}

#[test]
fn from_bits_truncates_unknown() {
    assert_eq!(AttributeClass::from_bits_truncate(0xff), AttributeClass::ALL);
}

// ── Origin ────────────────────────────────────────────────────────

#[test]
fn origin_constructors() {
    let bare = Origin::new("sat-1");
    assert_eq!(bare.from_zone, None);
    let zoned = Origin::from_zone("sat-1", "satellite");
    assert_eq!(zoned.from_zone.as_deref(), Some("satellite"));
    assert_eq!(zoned.to_string(), "sat-1 (zone 'satellite')");
}

#[test]
fn origin_serde_defaults_zone() {
    let origin: Origin = serde_json::from_str(r#"{"client_identity":"agent-1"}"#).unwrap();
    assert_eq!(origin, Origin::new("agent-1"));
}

// ── timestamp ─────────────────────────────────────────────────────

#[test]
fn now_is_recent() {
    let now = timestamp::now();
    assert!(now > 1_600_000_000.0);
}

#[test]
fn unix_seconds_roundtrip() {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let secs = timestamp::to_unix_seconds(at);
    assert_eq!(secs, 1_714_564_800.0);
    assert_eq!(timestamp::from_unix_seconds(secs), Some(at));
}

#[test]
fn from_unix_seconds_rejects_nan() {
    assert_eq!(timestamp::from_unix_seconds(f64::NAN), None);
}
