//! Shared transform primitives: ID normalization, nanosecond timestamp
//! arithmetic, and OTLP severity mapping.
//!
//! Everything here is fail-open: a single malformed ID or timestamp
//! degrades that one field (or drops that one span) and never aborts the
//! surrounding batch.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::domain::LogLevel;
use crate::normalize::level::level_from_text;

/// Normalize a trace/span ID from its decoded byte form.
///
/// Returns lowercase hex, or `None` when the bytes are empty or all zero —
/// the OTLP sentinel for "no ID".
#[must_use]
pub fn id_from_bytes(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() || bytes.iter().all(|&b| b == 0) {
        return None;
    }
    Some(hex::encode(bytes))
}

/// Normalize a trace/span ID from its JSON wire form.
///
/// OTLP/JSON nominally carries hex, but protobuf-to-JSON translators emit
/// base64 for `bytes` fields: hex of the expected width passes through
/// lowercased, anything else is tried as base64 and re-encoded to hex.
/// Empty and all-zero IDs normalize to `None`.
#[must_use]
pub fn id_from_json(raw: &Value, byte_len: usize) -> Option<String> {
    let s = raw.as_str()?.trim();
    if s.is_empty() {
        return None;
    }

    if s.len() == byte_len * 2 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        let lower = s.to_ascii_lowercase();
        if lower.bytes().all(|b| b == b'0') {
            return None;
        }
        return Some(lower);
    }

    let decoded = BASE64.decode(s).ok()?;
    id_from_bytes(&decoded)
}

/// Parse a nanosecond timestamp from its JSON wire form.
///
/// OTLP transmits 64-bit nanosecond values as decimal strings to avoid
/// JSON number precision loss; some exporters send plain numbers anyway.
#[must_use]
pub fn nanos_from_json(raw: Option<&Value>) -> Option<u64> {
    match raw? {
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Convert nanoseconds since the epoch to a UTC timestamp.
///
/// The division uses integer arithmetic: `u64 → f64` round-tripping loses
/// precision above 2^53 nanoseconds, which every current timestamp exceeds.
/// A value outside chrono's representable range degrades to "now" — a
/// malformed timestamp must not drop an otherwise valid span.
#[must_use]
pub fn nanos_to_datetime(nanos: u64) -> DateTime<Utc> {
    let millis = (nanos / 1_000_000) as i64;
    Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
}

/// Span duration in whole milliseconds; 0 when either bound is absent or
/// the clock went backwards.
#[must_use]
pub fn duration_ms(start_nanos: Option<u64>, end_nanos: Option<u64>) -> u64 {
    match (start_nanos, end_nanos) {
        (Some(start), Some(end)) => end.saturating_sub(start) / 1_000_000,
        _ => 0,
    }
}

/// Map an OTLP severity number (1-24) and severity text to a canonical
/// level. The number wins when present; text is the fallback.
#[must_use]
pub fn level_from_otlp_severity(severity_number: i64, severity_text: &str) -> LogLevel {
    match severity_number {
        1..=8 => LogLevel::Debug,
        9..=12 => LogLevel::Info,
        13..=16 => LogLevel::Warn,
        17..=20 => LogLevel::Error,
        21..=24 => LogLevel::Critical,
        _ => {
            if severity_text.is_empty() {
                LogLevel::Info
            } else {
                level_from_text(severity_text)
            }
        }
    }
}
