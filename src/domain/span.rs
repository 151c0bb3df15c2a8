//! OpenTelemetry span and trace rollup models.
//!
//! `TransformedSpan` is the decoded, validated form of one OTLP span;
//! `AggregatedTrace` is the per-trace rollup folded from a batch of spans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// OpenTelemetry span kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanKind {
    #[default]
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl From<i32> for SpanKind {
    fn from(value: i32) -> Self {
        match value {
            1 => SpanKind::Internal,
            2 => SpanKind::Server,
            3 => SpanKind::Client,
            4 => SpanKind::Producer,
            5 => SpanKind::Consumer,
            _ => SpanKind::Unspecified,
        }
    }
}

/// OpenTelemetry span status code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error,
}

impl From<i32> for SpanStatus {
    fn from(value: i32) -> Self {
        match value {
            1 => SpanStatus::Ok,
            2 => SpanStatus::Error,
            _ => SpanStatus::Unset,
        }
    }
}

/// A span event (timestamped annotation within a span).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    pub time: DateTime<Utc>,
    pub name: String,
    pub attributes: BTreeMap<String, Value>,
}

/// A link from one span to another trace/span pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanLink {
    pub trace_id: String,
    pub span_id: String,
    pub attributes: BTreeMap<String, Value>,
}

/// A decoded OTLP span, normalized for storage and aggregation.
///
/// Invariant: `trace_id` and `span_id` are lowercase hex and never empty or
/// all-zero — spans failing that check are dropped at transform time and a
/// `TransformedSpan` for them is never constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformedSpan {
    /// 32-char lowercase hex trace ID.
    pub trace_id: String,

    /// 16-char lowercase hex span ID.
    pub span_id: String,

    /// Absent for root spans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,

    pub service_name: String,

    pub operation_name: String,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    /// Derived from the nanosecond bounds; 0 when either bound was missing.
    pub duration_ms: u64,

    pub kind: SpanKind,

    pub status: SpanStatus,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_message: String,

    pub attributes: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SpanEvent>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<SpanLink>,

    pub resource_attributes: BTreeMap<String, Value>,
}

impl TransformedSpan {
    /// Whether this span is a trace root (no parent).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }
}

/// Per-trace rollup, keyed by trace ID and upserted into storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedTrace {
    pub trace_id: String,

    /// Service of the first span observed for this trace.
    pub service_name: String,

    /// Set only once a genuine root span (no parent) has been observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_service_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_operation_name: Option<String>,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    /// Recomputed from the widened bounds, not summed from spans.
    pub duration_ms: u64,

    pub span_count: u32,

    pub error: bool,
}

impl AggregatedTrace {
    /// Merge a later batch's aggregate into this one.
    ///
    /// Time bounds only widen, `span_count` accumulates, the error flag is
    /// OR-ed, and root fields are overwritten only when the other aggregate
    /// actually observed a root span.
    pub fn merge_from(&mut self, other: &AggregatedTrace) {
        if other.start_time < self.start_time {
            self.start_time = other.start_time;
        }
        if other.end_time > self.end_time {
            self.end_time = other.end_time;
        }
        self.duration_ms = span_between_ms(self.start_time, self.end_time);
        self.span_count += other.span_count;
        self.error |= other.error;
        if other.root_service_name.is_some() {
            self.root_service_name = other.root_service_name.clone();
            self.root_operation_name = other.root_operation_name.clone();
        }
    }
}

/// Millisecond distance between two timestamps, clamped at zero.
#[must_use]
pub fn span_between_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}
