//! In-process collaborator implementations.
//!
//! Used as the default wiring for single-node deployments and as capturing
//! fakes in tests: the store keeps everything in memory, the incident sink
//! records events, and the bus fans out over a tokio broadcast channel.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::{AggregatedTrace, CanonicalLogRecord, DetectionEvent, TransformedSpan};
use crate::error::IngestError;
use crate::port::{EventBus, IncidentSink, TelemetryStore};

type BoxResult<'a, T> = Pin<Box<dyn Future<Output = Result<T, IngestError>> + Send + 'a>>;

fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// In-memory telemetry store with widen-only trace upserts.
#[derive(Debug, Default)]
pub struct MemoryTelemetryStore {
    logs: Mutex<Vec<(String, CanonicalLogRecord)>>,
    spans: Mutex<Vec<(String, TransformedSpan)>>,
    traces: Mutex<HashMap<(String, String), AggregatedTrace>>,
}

impl MemoryTelemetryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn log_count(&self) -> usize {
        lock(&self.logs).len()
    }

    #[must_use]
    pub fn span_count(&self) -> usize {
        lock(&self.spans).len()
    }

    #[must_use]
    pub fn stored_logs(&self, project_id: &str) -> Vec<CanonicalLogRecord> {
        lock(&self.logs)
            .iter()
            .filter(|(p, _)| p == project_id)
            .map(|(_, r)| r.clone())
            .collect()
    }

    #[must_use]
    pub fn trace(&self, project_id: &str, trace_id: &str) -> Option<AggregatedTrace> {
        lock(&self.traces)
            .get(&(project_id.to_owned(), trace_id.to_owned()))
            .cloned()
    }
}

impl TelemetryStore for MemoryTelemetryStore {
    fn store_logs(&self, project_id: String, records: Vec<CanonicalLogRecord>) -> BoxResult<'_, ()> {
        Box::pin(async move {
            lock(&self.logs).extend(records.into_iter().map(|r| (project_id.clone(), r)));
            Ok(())
        })
    }

    fn store_spans(&self, project_id: String, spans: Vec<TransformedSpan>) -> BoxResult<'_, ()> {
        Box::pin(async move {
            lock(&self.spans).extend(spans.into_iter().map(|s| (project_id.clone(), s)));
            Ok(())
        })
    }

    fn upsert_traces(&self, project_id: String, traces: Vec<AggregatedTrace>) -> BoxResult<'_, ()> {
        Box::pin(async move {
            let mut stored = lock(&self.traces);
            for incoming in traces {
                let key = (project_id.clone(), incoming.trace_id.clone());
                match stored.get_mut(&key) {
                    Some(existing) => existing.merge_from(&incoming),
                    None => {
                        stored.insert(key, incoming);
                    }
                }
            }
            Ok(())
        })
    }
}

/// Capturing incident sink.
#[derive(Debug, Default)]
pub struct MemoryIncidentSink {
    events: Mutex<Vec<(String, DetectionEvent)>>,
}

impl MemoryIncidentSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self, project_id: &str) -> Vec<DetectionEvent> {
        lock(&self.events)
            .iter()
            .filter(|(p, _)| p == project_id)
            .map(|(_, e)| e.clone())
            .collect()
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }
}

impl IncidentSink for MemoryIncidentSink {
    fn record_detections(&self, project_id: String, events: Vec<DetectionEvent>) -> BoxResult<'_, ()> {
        Box::pin(async move {
            lock(&self.events).extend(events.into_iter().map(|e| (project_id.clone(), e)));
            Ok(())
        })
    }
}

/// Broadcast-channel event bus. Lagging or absent subscribers are fine;
/// `send` errors just mean nobody is listening.
pub struct BroadcastEventBus {
    sender: broadcast::Sender<(String, Value)>,
}

impl BroadcastEventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<(String, Value)> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, channel: String, payload: Value) -> BoxResult<'_, ()> {
        Box::pin(async move {
            if self.sender.send((channel.clone(), payload)).is_err() {
                debug!(channel, "No subscribers for published batch");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::span::span_between_ms;
    use chrono::{TimeZone, Utc};

    fn aggregate(start_s: i64, end_s: i64, count: u32) -> AggregatedTrace {
        let start = Utc.timestamp_opt(start_s, 0).unwrap();
        let end = Utc.timestamp_opt(end_s, 0).unwrap();
        AggregatedTrace {
            trace_id: "ab".repeat(16),
            service_name: "svc".into(),
            root_service_name: None,
            root_operation_name: None,
            start_time: start,
            end_time: end,
            duration_ms: span_between_ms(start, end),
            span_count: count,
            error: false,
        }
    }

    #[tokio::test]
    async fn trace_upsert_merges_batches() {
        let store = MemoryTelemetryStore::new();
        store
            .upsert_traces("p".into(), vec![aggregate(100, 110, 2)])
            .await
            .unwrap();
        store
            .upsert_traces("p".into(), vec![aggregate(95, 130, 3)])
            .await
            .unwrap();

        let merged = store.trace("p", &"ab".repeat(16)).unwrap();
        assert_eq!(merged.span_count, 5);
        assert_eq!(merged.start_time, Utc.timestamp_opt(95, 0).unwrap());
        assert_eq!(merged.end_time, Utc.timestamp_opt(130, 0).unwrap());
    }

    #[tokio::test]
    async fn broadcast_bus_delivers_to_subscribers() {
        let bus = BroadcastEventBus::new(8);
        let mut receiver = bus.subscribe();
        bus.publish("ingest:p".into(), serde_json::json!({"count": 2}))
            .await
            .unwrap();
        let (channel, payload) = receiver.recv().await.unwrap();
        assert_eq!(channel, "ingest:p");
        assert_eq!(payload, serde_json::json!({"count": 2}));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = BroadcastEventBus::new(8);
        assert!(bus.publish("c".into(), serde_json::json!(1)).await.is_ok());
    }
}
