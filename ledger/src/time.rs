//! Canonical timestamp handling.
//!
//! Timestamps feed directly into hash and signature inputs, so their
//! rendering is part of the wire format: ISO-8601 UTC with exactly
//! millisecond precision (`2026-03-01T08:15:30.250Z`). Rendering is
//! byte-identical across hosts for identical instants.
//!
//! Parsing is fail-closed: an input whose sub-second part is finer than a
//! whole millisecond is rejected rather than silently rounded, because a
//! round-trip through a coarser formatter would change the bytes under an
//! existing signature.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Errors from canonical timestamp parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("unparseable timestamp {value:?}: {reason}")]
    Unparseable { value: String, reason: String },

    #[error("timestamp {value:?} carries sub-millisecond precision")]
    SubMillisecond { value: String },
}

/// Render an instant in the canonical form.
///
/// Truncates (never rounds) to millisecond precision and always emits the
/// trailing `Z` designator.
pub fn format_canonical(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a canonical timestamp.
///
/// Accepts any RFC 3339 offset (normalizing to UTC) but rejects values
/// whose precision exceeds milliseconds. Those cannot survive a
/// canonical re-render and would break hash verification.
pub fn parse_canonical(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    let parsed =
        DateTime::parse_from_rfc3339(value).map_err(|e| TimestampError::Unparseable {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
    let utc = parsed.with_timezone(&Utc);
    if utc.timestamp_subsec_nanos() % 1_000_000 != 0 {
        return Err(TimestampError::SubMillisecond {
            value: value.to_string(),
        });
    }
    Ok(utc)
}

/// Current instant truncated to the canonical millisecond precision.
///
/// Constructors use this instead of raw `Utc::now()` so that a freshly
/// built value re-parses to exactly itself.
pub fn now_canonical() -> DateTime<Utc> {
    let now = Utc::now();
    let sub_millis = now.timestamp_subsec_nanos() % 1_000_000;
    now - chrono::Duration::nanoseconds(i64::from(sub_millis))
}

/// Serde adapter serializing `DateTime<Utc>` in the canonical form.
///
/// Use as `#[serde(with = "crate::time::serde_canonical")]` on every
/// timestamp field that participates in hashing or storage.
pub mod serde_canonical {
    use super::{format_canonical, parse_canonical};
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_canonical(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_canonical(&raw).map_err(de::Error::custom)
    }
}
