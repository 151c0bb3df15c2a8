//! Multi-format log normalization.
//!
//! Detects the source format of a raw log object (journald export vs.
//! generic Fluent Bit / Pino / direct SDK input) and maps it into a
//! [`CanonicalLogRecord`]. Normalization of an object never fails; only a
//! non-object input is rejected so the caller can count it against the
//! batch.

pub mod generic;
pub mod journald;
pub mod level;

pub use level::normalize_level;

use crate::domain::CanonicalLogRecord;
use serde_json::Value;

/// Detected source format of a raw log object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Journald,
    Generic,
}

/// Classify a raw object. Journald wins when any of its marker fields is
/// present; everything else is treated as generic input.
#[must_use]
pub fn detect_format(raw: &serde_json::Map<String, Value>) -> SourceFormat {
    if journald::is_journald(raw) {
        SourceFormat::Journald
    } else {
        SourceFormat::Generic
    }
}

/// Normalize one raw value into a canonical record.
///
/// Returns `None` only when the value is not a JSON object; all field-level
/// extraction inside an object degrades to safe defaults instead of failing.
#[must_use]
pub fn normalize(raw: &Value) -> Option<CanonicalLogRecord> {
    let obj = raw.as_object()?;
    let record = match detect_format(obj) {
        SourceFormat::Journald => journald::normalize(obj),
        SourceFormat::Generic => generic::normalize(obj),
    };
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogLevel;
    use serde_json::json;

    #[test]
    fn routes_journald_input() {
        let record = normalize(&json!({
            "_SYSTEMD_UNIT": "nginx.service",
            "PRIORITY": "4",
            "MESSAGE": "upstream timed out"
        }))
        .unwrap();
        assert_eq!(record.service, "nginx");
        assert_eq!(record.level, LogLevel::Warn);
        assert_eq!(record.metadata.get("source"), Some(&json!("journald")));
    }

    #[test]
    fn routes_generic_input() {
        let record = normalize(&json!({
            "service": "checkout",
            "level": "warn",
            "message": "retrying payment"
        }))
        .unwrap();
        assert_eq!(record.service, "checkout");
        assert_eq!(record.level, LogLevel::Warn);
        assert!(!record.metadata.contains_key("source"));
    }

    #[test]
    fn non_object_input_is_rejected() {
        assert!(normalize(&json!("just a string")).is_none());
        assert!(normalize(&json!(42)).is_none());
        assert!(normalize(&json!([{"service": "s"}])).is_none());
        assert!(normalize(&Value::Null).is_none());
    }

    #[test]
    fn empty_object_normalizes_to_defaults() {
        let record = normalize(&json!({})).unwrap();
        assert_eq!(record.service, "unknown");
        assert_eq!(record.level, LogLevel::Info);
        assert_eq!(record.message, "");
    }
}
