//! Generic (Fluent Bit / Pino / direct SDK) record normalization.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::level::normalize_level;
use crate::domain::{CanonicalLogRecord, LogLevel};

/// Top-level fields that are consumed by extraction and must not be
/// duplicated into metadata.
const CONSUMED_FIELDS: &[&str] = &[
    "service", "message", "log", "level", "time", "date", "trace_id", "span_id", "metadata",
];

/// Normalize one generic log object into a canonical record.
#[must_use]
pub fn normalize(obj: &Map<String, Value>) -> CanonicalLogRecord {
    let time = extract_timestamp(obj).unwrap_or_else(Utc::now);
    let mut record = CanonicalLogRecord::new(
        time,
        extract_service(obj),
        extract_level(obj),
        extract_message(obj),
    );
    record.trace_id = str_field(obj, "trace_id").map(str::to_owned);
    record.span_id = str_field(obj, "span_id").map(str::to_owned);
    record.metadata = collect_metadata(obj);
    record
}

fn extract_service(obj: &Map<String, Value>) -> String {
    str_field(obj, "service")
        .or_else(|| str_field(obj, "container_name"))
        .unwrap_or("unknown")
        .to_owned()
}

fn extract_message(obj: &Map<String, Value>) -> String {
    str_field(obj, "message")
        .or_else(|| str_field(obj, "log"))
        .unwrap_or_default()
        .to_owned()
}

fn extract_level(obj: &Map<String, Value>) -> LogLevel {
    obj.get("level").map_or(LogLevel::Info, normalize_level)
}

/// Timestamp resolution: explicit `time` (RFC 3339 string or epoch
/// milliseconds), then numeric `date` in seconds (Fluent Bit convention,
/// possibly fractional).
fn extract_timestamp(obj: &Map<String, Value>) -> Option<DateTime<Utc>> {
    match obj.get("time") {
        Some(Value::String(s)) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
        }
        Some(Value::Number(n)) => {
            if let Some(ms) = n.as_i64() {
                if let Some(ts) = Utc.timestamp_millis_opt(ms).single() {
                    return Some(ts);
                }
            }
        }
        _ => {}
    }

    if let Some(Value::Number(n)) = obj.get("date") {
        let ms = n.as_f64()? * 1_000.0;
        if ms.is_finite() {
            return Utc.timestamp_millis_opt(ms as i64).single();
        }
    }

    None
}

/// Caller-supplied metadata plus container identifiers and any leftover
/// top-level fields not consumed by extraction.
fn collect_metadata(obj: &Map<String, Value>) -> BTreeMap<String, Value> {
    let mut metadata = BTreeMap::new();

    if let Some(Value::Object(supplied)) = obj.get("metadata") {
        for (key, value) in supplied {
            metadata.insert(key.clone(), value.clone());
        }
    }

    for (key, value) in obj {
        if CONSUMED_FIELDS.contains(&key.as_str()) || value.is_null() {
            continue;
        }
        metadata.entry(key.clone()).or_insert_with(|| value.clone());
    }

    metadata
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}
