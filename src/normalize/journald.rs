//! Journald record normalization.
//!
//! Journald exports carry uppercase field names with underscore-prefixed
//! "trusted" fields added by the journal itself. Extraction here is an
//! ordered list of typed probes, each returning an `Option`; every chain
//! ends in a safe default and nothing in this module can fail.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::level;
use crate::domain::{CanonicalLogRecord, LogLevel};

/// Journald diagnostic fields copied into record metadata, paired with the
/// friendlier key they are stored under.
const DIAGNOSTIC_FIELDS: &[(&str, &str)] = &[
    ("_HOSTNAME", "hostname"),
    ("_MACHINE_ID", "machine_id"),
    ("_BOOT_ID", "boot_id"),
    ("_PID", "pid"),
    ("_UID", "uid"),
    ("_GID", "gid"),
    ("_COMM", "comm"),
    ("_EXE", "exe"),
    ("_CMDLINE", "cmdline"),
    ("_SYSTEMD_CGROUP", "cgroup"),
    ("_SYSTEMD_UNIT", "unit"),
    ("_SYSTEMD_SLICE", "slice"),
    ("SYSLOG_FACILITY", "syslog_facility"),
    ("SYSLOG_IDENTIFIER", "syslog_identifier"),
    ("SYSLOG_PID", "syslog_pid"),
    ("_SELINUX_CONTEXT", "selinux_context"),
    ("_TRANSPORT", "transport"),
];

/// Whether an incoming object looks like a journald export.
#[must_use]
pub fn is_journald(obj: &Map<String, Value>) -> bool {
    obj.contains_key("_SYSTEMD_UNIT")
        || obj.contains_key("_COMM")
        || obj.contains_key("_EXE")
        || obj.contains_key("SYSLOG_IDENTIFIER")
        || obj.get("MESSAGE").is_some_and(|v| !v.is_null())
        || obj.get("PRIORITY").is_some_and(|v| !v.is_null())
        || obj.contains_key("_HOSTNAME")
}

/// Normalize one journald object into a canonical record.
#[must_use]
pub fn normalize(obj: &Map<String, Value>) -> CanonicalLogRecord {
    let time = extract_timestamp(obj).unwrap_or_else(Utc::now);
    let mut record = CanonicalLogRecord::new(
        time,
        extract_service(obj),
        extract_level(obj),
        extract_message(obj),
    );
    record.metadata = collect_metadata(obj);
    record
}

/// Service extraction priority: SYSLOG_IDENTIFIER, then the systemd unit
/// with its `.service` suffix stripped, then _COMM, then the basename of
/// _EXE, then `"unknown"`.
fn extract_service(obj: &Map<String, Value>) -> String {
    str_field(obj, "SYSLOG_IDENTIFIER")
        .map(str::to_owned)
        .or_else(|| {
            str_field(obj, "_SYSTEMD_UNIT")
                .map(|unit| unit.strip_suffix(".service").unwrap_or(unit).to_owned())
        })
        .or_else(|| str_field(obj, "_COMM").map(str::to_owned))
        .or_else(|| {
            str_field(obj, "_EXE")
                .and_then(|exe| exe.rsplit('/').next())
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| "unknown".to_owned())
}

fn extract_message(obj: &Map<String, Value>) -> String {
    str_field(obj, "MESSAGE")
        .or_else(|| str_field(obj, "message"))
        .or_else(|| str_field(obj, "log"))
        .unwrap_or_default()
        .to_owned()
}

/// PRIORITY is a syslog severity 0-7, usually transmitted as a string.
fn extract_level(obj: &Map<String, Value>) -> LogLevel {
    match obj.get("PRIORITY") {
        Some(Value::String(s)) => s
            .trim()
            .parse::<u8>()
            .map(level::level_from_syslog_priority)
            .unwrap_or(LogLevel::Info),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|p| u8::try_from(p).ok())
            .map(level::level_from_syslog_priority)
            .unwrap_or(LogLevel::Info),
        _ => LogLevel::Info,
    }
}

/// An explicit `time` field wins; otherwise the journald realtime
/// timestamps, which are microseconds since the epoch, interpreted as UTC.
fn extract_timestamp(obj: &Map<String, Value>) -> Option<DateTime<Utc>> {
    match obj.get("time") {
        Some(Value::String(s)) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
        }
        Some(Value::Number(n)) => {
            if let Some(ts) = n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()) {
                return Some(ts);
            }
        }
        _ => {}
    }

    let micros = obj
        .get("__REALTIME_TIMESTAMP")
        .or_else(|| obj.get("_SOURCE_REALTIME_TIMESTAMP"))?;
    let micros = match micros {
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    Utc.timestamp_millis_opt(micros / 1_000).single()
}

fn collect_metadata(obj: &Map<String, Value>) -> BTreeMap<String, Value> {
    let mut metadata = BTreeMap::new();
    for (raw, key) in DIAGNOSTIC_FIELDS {
        if let Some(value) = obj.get(*raw) {
            if !value.is_null() {
                metadata.insert((*key).to_owned(), value.clone());
            }
        }
    }
    metadata.insert("source".to_owned(), Value::String("journald".to_owned()));
    metadata
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}
