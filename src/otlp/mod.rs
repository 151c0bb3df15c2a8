//! OTLP wire-format decoding and trace aggregation.
//!
//! Entry points take a raw (possibly gzip-compressed) request body and a
//! detected content kind, and produce validated domain values plus a count
//! of rejected entries for the OTLP partial-success response.

pub mod aggregate;
pub mod content;
pub mod json;
pub mod proto;
pub mod transform;

pub use aggregate::{TraceAccumulator, aggregate_batch};
pub use content::{ContentKind, detect_content_type, decompress_if_gzip};

use std::collections::HashMap;

use crate::domain::{AggregatedTrace, CanonicalLogRecord, TransformedSpan};
use crate::error::OtlpError;

/// Result of decoding one trace export request.
#[derive(Debug)]
pub struct DecodedTraces {
    pub spans: Vec<TransformedSpan>,
    pub traces: HashMap<String, AggregatedTrace>,
    /// Spans dropped for missing or all-zero IDs.
    pub rejected: usize,
}

/// Result of decoding one logs export request.
#[derive(Debug)]
pub struct DecodedLogs {
    pub records: Vec<CanonicalLogRecord>,
    pub rejected: usize,
}

/// Decode a trace export body (already decompressed) and aggregate its
/// spans per trace.
///
/// `Unknown` content falls back to sniffing: bodies starting with `{` or
/// `[` decode as JSON, everything else as protobuf.
pub fn decode_traces(body: &[u8], kind: ContentKind) -> Result<DecodedTraces, OtlpError> {
    let (spans, rejected) = match kind {
        ContentKind::Json => json::decode_traces(body)?,
        ContentKind::Protobuf | ContentKind::Unknown => proto::decode_traces(body)?,
    };
    let traces = aggregate_batch(&spans);
    Ok(DecodedTraces {
        spans,
        traces,
        rejected,
    })
}

/// Decode a logs export body (already decompressed) into canonical records.
pub fn decode_logs(body: &[u8], kind: ContentKind) -> Result<DecodedLogs, OtlpError> {
    let (records, rejected) = match kind {
        ContentKind::Json => json::decode_logs(body)?,
        ContentKind::Protobuf | ContentKind::Unknown => proto::decode_logs(body)?,
    };
    Ok(DecodedLogs { records, rejected })
}
