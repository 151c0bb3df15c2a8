//! OTLP protobuf decoding for traces and logs.
//!
//! Some exporters send JSON bodies under a protobuf content type; when the
//! first non-whitespace byte is `{` or `[` the payload is routed to the
//! JSON decoder instead of failing the protobuf parse.

use chrono::Utc;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use opentelemetry_proto::tonic::trace::v1::Span;
use prost::Message;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::json;
use super::transform::{
    duration_ms, id_from_bytes, level_from_otlp_severity, nanos_to_datetime,
};
use crate::domain::span::{SpanEvent, SpanLink};
use crate::domain::{CanonicalLogRecord, SpanKind, SpanStatus, TransformedSpan};
use crate::error::OtlpError;

/// Decode a protobuf (or JSON-masquerading-as-protobuf) trace export.
pub fn decode_traces(bytes: &[u8]) -> Result<(Vec<TransformedSpan>, usize), OtlpError> {
    if looks_like_json(bytes) {
        return json::decode_traces(bytes);
    }

    let request = ExportTraceServiceRequest::decode(bytes)
        .map_err(|e| OtlpError::Protobuf(e.to_string()))?;

    let mut spans = Vec::new();
    let mut rejected = 0usize;

    for resource_spans in &request.resource_spans {
        let resource_attrs = resource_spans
            .resource
            .as_ref()
            .map(|r| convert_attributes(&r.attributes))
            .unwrap_or_default();
        let service_name = service_name_from(&resource_attrs);

        for scope_spans in &resource_spans.scope_spans {
            for span in &scope_spans.spans {
                match convert_span(span, &service_name, &resource_attrs) {
                    Some(converted) => spans.push(converted),
                    None => rejected += 1,
                }
            }
        }
    }

    Ok((spans, rejected))
}

/// Decode a protobuf (or JSON-masquerading-as-protobuf) logs export.
pub fn decode_logs(bytes: &[u8]) -> Result<(Vec<CanonicalLogRecord>, usize), OtlpError> {
    if looks_like_json(bytes) {
        return json::decode_logs(bytes);
    }

    let request = ExportLogsServiceRequest::decode(bytes)
        .map_err(|e| OtlpError::Protobuf(e.to_string()))?;

    let mut records = Vec::new();

    for resource_logs in &request.resource_logs {
        let resource_attrs = resource_logs
            .resource
            .as_ref()
            .map(|r| convert_attributes(&r.attributes))
            .unwrap_or_default();
        let service_name = service_name_from(&resource_attrs);

        for scope_logs in &resource_logs.scope_logs {
            for log_record in &scope_logs.log_records {
                records.push(convert_log_record(log_record, &service_name, &resource_attrs));
            }
        }
    }

    Ok((records, 0))
}

fn looks_like_json(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{' || b == b'[')
}

fn convert_span(
    span: &Span,
    service_name: &str,
    resource_attrs: &BTreeMap<String, Value>,
) -> Option<TransformedSpan> {
    let trace_id = id_from_bytes(&span.trace_id)?;
    let span_id = id_from_bytes(&span.span_id)?;
    let parent_span_id = id_from_bytes(&span.parent_span_id);

    // Zero means unset in OTLP timestamps.
    let start_nanos = (span.start_time_unix_nano != 0).then_some(span.start_time_unix_nano);
    let end_nanos = (span.end_time_unix_nano != 0).then_some(span.end_time_unix_nano);

    let (status, status_message) = span
        .status
        .as_ref()
        .map(|s| (SpanStatus::from(s.code), s.message.clone()))
        .unwrap_or((SpanStatus::Unset, String::new()));

    Some(TransformedSpan {
        trace_id,
        span_id,
        parent_span_id,
        service_name: service_name.to_owned(),
        operation_name: span.name.clone(),
        start_time: start_nanos.map(nanos_to_datetime).unwrap_or_else(Utc::now),
        end_time: end_nanos.map(nanos_to_datetime).unwrap_or_else(Utc::now),
        duration_ms: duration_ms(start_nanos, end_nanos),
        kind: SpanKind::from(span.kind),
        status,
        status_message,
        attributes: convert_attributes(&span.attributes),
        events: span
            .events
            .iter()
            .map(|event| SpanEvent {
                time: nanos_to_datetime(event.time_unix_nano),
                name: event.name.clone(),
                attributes: convert_attributes(&event.attributes),
            })
            .collect(),
        links: span
            .links
            .iter()
            .filter_map(|link| {
                Some(SpanLink {
                    trace_id: id_from_bytes(&link.trace_id)?,
                    span_id: id_from_bytes(&link.span_id)?,
                    attributes: convert_attributes(&link.attributes),
                })
            })
            .collect(),
        resource_attributes: resource_attrs.clone(),
    })
}

fn convert_log_record(
    record: &opentelemetry_proto::tonic::logs::v1::LogRecord,
    service_name: &str,
    resource_attrs: &BTreeMap<String, Value>,
) -> CanonicalLogRecord {
    let nanos = if record.time_unix_nano != 0 {
        record.time_unix_nano
    } else {
        record.observed_time_unix_nano
    };
    let time = if nanos != 0 {
        nanos_to_datetime(nanos)
    } else {
        Utc::now()
    };

    let message = record
        .body
        .as_ref()
        .map(|body| body_text(&any_value_to_json(body)))
        .unwrap_or_default();

    let mut canonical = CanonicalLogRecord::new(
        time,
        service_name.to_owned(),
        level_from_otlp_severity(i64::from(record.severity_number), &record.severity_text),
        message,
    );

    canonical.trace_id = id_from_bytes(&record.trace_id);
    canonical.span_id = id_from_bytes(&record.span_id);

    canonical.metadata = convert_attributes(&record.attributes);
    for (key, value) in resource_attrs {
        canonical
            .metadata
            .entry(format!("resource.{key}"))
            .or_insert_with(|| value.clone());
    }
    if !record.severity_text.is_empty() {
        canonical.metadata.insert(
            "severity_text".to_owned(),
            Value::String(record.severity_text.clone()),
        );
    }

    canonical
}

fn service_name_from(resource_attrs: &BTreeMap<String, Value>) -> String {
    resource_attrs
        .get("service.name")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_owned()
}

fn convert_attributes(attrs: &[KeyValue]) -> BTreeMap<String, Value> {
    attrs
        .iter()
        .map(|kv| {
            let value = kv.value.as_ref().map(any_value_to_json).unwrap_or(Value::Null);
            (kv.key.clone(), value)
        })
        .collect()
}

fn any_value_to_json(value: &AnyValue) -> Value {
    match &value.value {
        Some(any_value::Value::StringValue(s)) => Value::String(s.clone()),
        Some(any_value::Value::IntValue(i)) => Value::Number((*i).into()),
        Some(any_value::Value::DoubleValue(d)) => {
            serde_json::Number::from_f64(*d).map_or(Value::Null, Value::Number)
        }
        Some(any_value::Value::BoolValue(b)) => Value::Bool(*b),
        Some(any_value::Value::BytesValue(b)) => Value::String(hex::encode(b)),
        Some(any_value::Value::ArrayValue(arr)) => {
            Value::Array(arr.values.iter().map(any_value_to_json).collect())
        }
        Some(any_value::Value::KvlistValue(kv)) => {
            let mut out = Map::new();
            for item in &kv.values {
                let value = item.value.as_ref().map(any_value_to_json).unwrap_or(Value::Null);
                out.insert(item.key.clone(), value);
            }
            Value::Object(out)
        }
        None => Value::Null,
    }
}

fn body_text(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
