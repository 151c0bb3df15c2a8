//! Core domain models shared across the ingestion and detection pipeline.

pub mod detection;
pub mod log_record;
pub mod span;

pub use detection::{
    DetectionEvent, MatchModifier, RuleSeverity, SelectionField, SigmaDetection, SigmaRule,
    SigmaSelection,
};
pub use log_record::{CanonicalLogRecord, LogLevel};
pub use span::{AggregatedTrace, SpanKind, SpanStatus, TransformedSpan};
