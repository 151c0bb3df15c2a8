//! External collaborator contracts.
//!
//! These traits are dyn-compatible via boxed futures so handlers and the
//! coordinator can hold `Arc<dyn Trait>` collaborators and tests can swap
//! in capturing fakes.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::domain::{AggregatedTrace, CanonicalLogRecord, DetectionEvent, TransformedSpan};
use crate::error::IngestError;

type BoxResult<'a, T> = Pin<Box<dyn Future<Output = Result<T, IngestError>> + Send + 'a>>;

/// Durable storage for normalized telemetry.
///
/// `upsert_traces` must be idempotent per trace ID and widen-only for time
/// bounds: replaying a batch may never shrink a stored aggregate.
pub trait TelemetryStore: Send + Sync {
    fn store_logs(&self, project_id: String, records: Vec<CanonicalLogRecord>) -> BoxResult<'_, ()>;

    fn store_spans(&self, project_id: String, spans: Vec<TransformedSpan>) -> BoxResult<'_, ()>;

    fn upsert_traces(&self, project_id: String, traces: Vec<AggregatedTrace>) -> BoxResult<'_, ()>;
}

/// Accepts detection events; incident lifecycle is beyond this core.
pub trait IncidentSink: Send + Sync {
    fn record_detections(&self, project_id: String, events: Vec<DetectionEvent>) -> BoxResult<'_, ()>;
}

/// Real-time fan-out to subscribers. Publishing is fire-and-forget relative
/// to the ingestion response; failures are logged, never surfaced.
pub trait EventBus: Send + Sync {
    fn publish(&self, channel: String, payload: Value) -> BoxResult<'_, ()>;
}
