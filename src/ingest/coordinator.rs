//! The ingestion coordinator: normalize, persist, detect, invalidate,
//! fan out.
//!
//! Per-record failures never abort a batch — they are collected and
//! reported back to the caller. Cache invalidation and pub/sub fan-out are
//! best-effort: persistence and detection are the only correctness
//! dependencies of an ingestion call.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::cache::CacheGateway;
use crate::domain::{CanonicalLogRecord, DetectionEvent};
use crate::error::IngestError;
use crate::normalize;
use crate::otlp::DecodedTraces;
use crate::port::{EventBus, IncidentSink, TelemetryStore};
use crate::sigma::{CompiledRule, RuleRegistry, evaluate, flatten_record};

/// One record of a batch that failed schema validation.
#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    pub index: usize,
    pub error: String,
}

/// Outcome of one log ingestion call.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: usize,
    pub detections: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RecordFailure>,
}

/// Outcome of one trace ingestion call.
#[derive(Debug, Serialize)]
pub struct TraceReport {
    pub spans: usize,
    pub traces: usize,
    pub rejected: usize,
}

pub struct IngestionCoordinator {
    store: Arc<dyn TelemetryStore>,
    incidents: Arc<dyn IncidentSink>,
    bus: Arc<dyn EventBus>,
    cache: Arc<CacheGateway>,
    rules: Arc<RuleRegistry>,
    max_batch_size: usize,
    eval_concurrency: usize,
}

impl IngestionCoordinator {
    #[must_use]
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        incidents: Arc<dyn IncidentSink>,
        bus: Arc<dyn EventBus>,
        cache: Arc<CacheGateway>,
        rules: Arc<RuleRegistry>,
        max_batch_size: usize,
        eval_concurrency: usize,
    ) -> Self {
        Self {
            store,
            incidents,
            bus,
            cache,
            rules,
            max_batch_size,
            eval_concurrency: eval_concurrency.max(1),
        }
    }

    #[must_use]
    pub fn rules(&self) -> &Arc<RuleRegistry> {
        &self.rules
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CacheGateway> {
        &self.cache
    }

    /// Ingest a batch of raw log objects: normalize each (try/continue),
    /// then run the canonical pipeline.
    pub async fn ingest_raw(
        &self,
        project_id: &str,
        raw: Vec<Value>,
    ) -> Result<IngestReport, IngestError> {
        if raw.len() > self.max_batch_size {
            return Err(IngestError::BatchTooLarge {
                got: raw.len(),
                max: self.max_batch_size,
            });
        }

        let mut records = Vec::with_capacity(raw.len());
        let mut failures = Vec::new();
        for (index, value) in raw.iter().enumerate() {
            match normalize::normalize(value) {
                Some(record) => records.push(record),
                None => failures.push(RecordFailure {
                    index,
                    error: "record must be a JSON object".to_owned(),
                }),
            }
        }

        self.ingest_records(project_id, records, failures).await
    }

    /// Ingest already-canonical records (the OTLP logs path lands here):
    /// persist, evaluate every active rule per record, emit detections,
    /// invalidate caches, and fan out to subscribers.
    pub async fn ingest_records(
        &self,
        project_id: &str,
        records: Vec<CanonicalLogRecord>,
        failures: Vec<RecordFailure>,
    ) -> Result<IngestReport, IngestError> {
        let accepted = records.len();
        let rejected = failures.len();

        if accepted == 0 {
            return Ok(IngestReport {
                accepted,
                rejected,
                detections: 0,
                failures,
            });
        }

        self.store
            .store_logs(project_id.to_owned(), records.clone())
            .await?;

        let events = self.evaluate_rules(project_id, &records).await;
        let detections = events.len();
        if !events.is_empty() {
            self.incidents
                .record_detections(project_id.to_owned(), events)
                .await?;
        }

        // Best-effort from here on: stale reads are the only thing at stake.
        self.cache.invalidate_project_queries(project_id).await;
        self.publish_batch(project_id, &records);

        info!(project_id, accepted, rejected, detections, "Ingested log batch");

        Ok(IngestReport {
            accepted,
            rejected,
            detections,
            failures,
        })
    }

    /// Ingest one decoded trace export: persist spans, upsert per-trace
    /// aggregates, and invalidate trace-scoped caches.
    pub async fn ingest_trace_batch(
        &self,
        project_id: &str,
        decoded: DecodedTraces,
    ) -> Result<TraceReport, IngestError> {
        let report = TraceReport {
            spans: decoded.spans.len(),
            traces: decoded.traces.len(),
            rejected: decoded.rejected,
        };

        if !decoded.spans.is_empty() {
            self.store
                .store_spans(project_id.to_owned(), decoded.spans)
                .await?;
            self.store
                .upsert_traces(
                    project_id.to_owned(),
                    decoded.traces.into_values().collect(),
                )
                .await?;
            self.cache.invalidate_project_queries(project_id).await;
        }

        info!(
            project_id,
            spans = report.spans,
            traces = report.traces,
            rejected = report.rejected,
            "Ingested trace batch"
        );

        Ok(report)
    }

    /// Evaluate every active rule against every record, bounded by the
    /// configured concurrency. Rule evaluation shares no state, so the
    /// per-record fan-out is unordered.
    async fn evaluate_rules(
        &self,
        project_id: &str,
        records: &[CanonicalLogRecord],
    ) -> Vec<DetectionEvent> {
        let rules = self.rules.active_rules(project_id);
        if rules.is_empty() {
            return Vec::new();
        }

        let mut events = Vec::new();
        for record in records {
            let flat = flatten_record(record);
            let rule_futures: Vec<_> = rules
                .iter()
                .map(|rule| eval_rule(&flat, record, rule))
                .collect();
            let mut outcomes = futures::stream::iter(rule_futures)
                .buffer_unordered(self.eval_concurrency);

            while let Some(outcome) = outcomes.next().await {
                if let Some(event) = outcome {
                    debug!(
                        project_id,
                        rule_id = %event.rule_id,
                        log_id = %event.log_id,
                        "Detection rule matched"
                    );
                    events.push(event);
                }
            }
        }
        events
    }

    /// Fire-and-forget publish of the normalized batch; the ingestion
    /// response never waits on subscribers.
    fn publish_batch(&self, project_id: &str, records: &[CanonicalLogRecord]) {
        let bus = Arc::clone(&self.bus);
        let channel = format!("ingest:{project_id}");
        let payload = json!({
            "project_id": project_id,
            "records": records,
        });
        tokio::spawn(async move {
            if let Err(e) = bus.publish(channel.clone(), payload).await {
                error!(channel, error = %e, "Failed to publish ingested batch");
            }
        });
    }
}

/// Evaluate one record against one rule. A named async fn gives the
/// future a properly elaborated lifetime signature, which the equivalent
/// closure-returned async block cannot express (HRTB inference fails).
async fn eval_rule(
    flat: &serde_json::Map<String, Value>,
    record: &CanonicalLogRecord,
    rule: &CompiledRule,
) -> Option<DetectionEvent> {
    evaluate(flat, record, rule)
}
