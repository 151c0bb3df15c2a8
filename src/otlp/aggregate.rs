//! Per-batch trace aggregation.
//!
//! A [`TraceAccumulator`] is owned by exactly one ingestion call: it is
//! created for the batch, folds that batch's spans, and is consumed to
//! produce the aggregates handed to storage. No state is shared across
//! concurrent batches.

use std::collections::HashMap;

use crate::domain::span::span_between_ms;
use crate::domain::{AggregatedTrace, SpanStatus, TransformedSpan};

/// Folds a stream of spans into one [`AggregatedTrace`] per trace ID.
///
/// The fold is order-independent: for a fixed set of spans, any observation
/// order produces the same final aggregate. Root fields depend on the
/// absence of `parent_span_id`, never on which span arrived first.
#[derive(Debug, Default)]
pub struct TraceAccumulator {
    traces: HashMap<String, AggregatedTrace>,
}

impl TraceAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one span into its trace's aggregate.
    pub fn observe(&mut self, span: &TransformedSpan) {
        let is_error = span.status == SpanStatus::Error;

        match self.traces.get_mut(&span.trace_id) {
            None => {
                let mut aggregate = AggregatedTrace {
                    trace_id: span.trace_id.clone(),
                    service_name: span.service_name.clone(),
                    root_service_name: None,
                    root_operation_name: None,
                    start_time: span.start_time,
                    end_time: span.end_time,
                    duration_ms: span_between_ms(span.start_time, span.end_time),
                    span_count: 1,
                    error: is_error,
                };
                if span.is_root() {
                    aggregate.root_service_name = Some(span.service_name.clone());
                    aggregate.root_operation_name = Some(span.operation_name.clone());
                }
                self.traces.insert(span.trace_id.clone(), aggregate);
            }
            Some(aggregate) => {
                if span.start_time < aggregate.start_time {
                    aggregate.start_time = span.start_time;
                }
                if span.end_time > aggregate.end_time {
                    aggregate.end_time = span.end_time;
                }
                aggregate.duration_ms = span_between_ms(aggregate.start_time, aggregate.end_time);
                aggregate.span_count += 1;
                aggregate.error |= is_error;
                if span.is_root() {
                    aggregate.root_service_name = Some(span.service_name.clone());
                    aggregate.root_operation_name = Some(span.operation_name.clone());
                }
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    /// Consume the accumulator, yielding the per-trace aggregates.
    #[must_use]
    pub fn into_traces(self) -> HashMap<String, AggregatedTrace> {
        self.traces
    }
}

/// Fold a whole batch at once.
#[must_use]
pub fn aggregate_batch(spans: &[TransformedSpan]) -> HashMap<String, AggregatedTrace> {
    let mut accumulator = TraceAccumulator::new();
    for span in spans {
        accumulator.observe(span);
    }
    accumulator.into_traces()
}
