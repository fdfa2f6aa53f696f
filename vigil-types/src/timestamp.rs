//! Wall-clock helpers.
//!
//! Check results, downtimes and topology payloads carry times as fractional
//! Unix seconds, which is what peers put on the wire.

use chrono::{DateTime, TimeZone, Utc};

/// Current time as fractional seconds since the Unix epoch.
#[must_use]
pub fn now() -> f64 {
    to_unix_seconds(Utc::now())
}

/// Converts a UTC instant into fractional Unix seconds.
#[must_use]
pub fn to_unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Converts fractional Unix seconds back into a UTC instant.
///
/// Returns `None` for values chrono cannot represent (NaN, far future).
#[must_use]
pub fn from_unix_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * 1_000_000.0).round() as i64;
    Utc.timestamp_micros(micros).single()
}
