//! Canonical log record: the normalized form every ingested line is reduced to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Canonical severity of a log record.
///
/// Every source-specific severity (syslog PRIORITY 0-7, Pino/Bunyan numeric
/// levels, journald, textual synonyms) is folded into exactly one of these
/// five values at ingestion time. Unrecognized inputs map to `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized log record.
///
/// Constructed once per ingested line and immutable afterwards; the same
/// value is handed to persistence and to every active detection rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalLogRecord {
    /// Record identity, referenced by detection events as `log_id`.
    pub id: Uuid,

    /// Event time (UTC).
    pub time: DateTime<Utc>,

    /// Originating service; `"unknown"` when no source field identifies one.
    pub service: String,

    pub level: LogLevel,

    pub message: String,

    /// Source-specific fields that survive normalization, keyed in stable order.
    pub metadata: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

impl CanonicalLogRecord {
    /// Create a record with a fresh identity and the given event time.
    #[must_use]
    pub fn new(time: DateTime<Utc>, service: String, level: LogLevel, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            time,
            service,
            level,
            message,
            metadata: BTreeMap::new(),
            trace_id: None,
            span_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&LogLevel::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
    }

    #[test]
    fn level_display_matches_serde() {
        for level in [
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
            LogLevel::Critical,
        ] {
            let json = serde_json::to_string(&level).unwrap();
            assert_eq!(json, format!("\"{level}\""));
        }
    }

    #[test]
    fn records_get_distinct_ids() {
        let now = Utc::now();
        let a = CanonicalLogRecord::new(now, "svc".into(), LogLevel::Info, "x".into());
        let b = CanonicalLogRecord::new(now, "svc".into(), LogLevel::Info, "x".into());
        assert_ne!(a.id, b.id);
    }
}
