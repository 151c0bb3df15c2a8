//! OTLP/JSON decoding for traces and logs.
//!
//! The OTLP spec mandates camelCase field names in JSON, but snake_case
//! exporters exist in the wild; every field lookup prefers camelCase and
//! falls back to snake_case. Decoding is hand-rolled over
//! `serde_json::Value` because the prost-generated types accept neither the
//! name variance nor base64-encoded ID strings.

use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::transform::{
    duration_ms, id_from_json, level_from_otlp_severity, nanos_from_json, nanos_to_datetime,
};
use crate::domain::span::{SpanEvent, SpanLink};
use crate::domain::{CanonicalLogRecord, SpanKind, SpanStatus, TransformedSpan};
use crate::error::OtlpError;

/// Decode an OTLP/JSON trace export. Returns the valid spans and the count
/// of spans dropped for missing or all-zero IDs.
pub fn decode_traces(bytes: &[u8]) -> Result<(Vec<TransformedSpan>, usize), OtlpError> {
    let root: Value = serde_json::from_slice(bytes).map_err(|e| OtlpError::Json(e.to_string()))?;

    let mut spans = Vec::new();
    let mut rejected = 0usize;

    for resource_spans in list(&root, "resourceSpans", "resource_spans") {
        let resource_attrs = resource_attributes(resource_spans);
        let service_name = service_name_from(&resource_attrs);

        for scope_spans in list(resource_spans, "scopeSpans", "scope_spans") {
            for raw_span in list(scope_spans, "spans", "spans") {
                match decode_span(raw_span, &service_name, &resource_attrs) {
                    Some(span) => spans.push(span),
                    None => rejected += 1,
                }
            }
        }
    }

    Ok((spans, rejected))
}

/// Decode an OTLP/JSON logs export into canonical records. Returns the
/// records and the count of entries rejected for not being objects.
pub fn decode_logs(bytes: &[u8]) -> Result<(Vec<CanonicalLogRecord>, usize), OtlpError> {
    let root: Value = serde_json::from_slice(bytes).map_err(|e| OtlpError::Json(e.to_string()))?;

    let mut records = Vec::new();
    let mut rejected = 0usize;

    for resource_logs in list(&root, "resourceLogs", "resource_logs") {
        let resource_attrs = resource_attributes(resource_logs);
        let service_name = service_name_from(&resource_attrs);

        for scope_logs in list(resource_logs, "scopeLogs", "scope_logs") {
            for raw in list(scope_logs, "logRecords", "log_records") {
                if !raw.is_object() {
                    rejected += 1;
                    continue;
                }
                records.push(decode_log_record(raw, &service_name, &resource_attrs));
            }
        }
    }

    Ok((records, rejected))
}

fn decode_span(
    raw: &Value,
    service_name: &str,
    resource_attrs: &BTreeMap<String, Value>,
) -> Option<TransformedSpan> {
    let trace_id = id_from_json(field(raw, "traceId", "trace_id")?, 16)?;
    let span_id = id_from_json(field(raw, "spanId", "span_id")?, 8)?;
    let parent_span_id =
        field(raw, "parentSpanId", "parent_span_id").and_then(|v| id_from_json(v, 8));

    let start_nanos = nanos_from_json(field(raw, "startTimeUnixNano", "start_time_unix_nano"));
    let end_nanos = nanos_from_json(field(raw, "endTimeUnixNano", "end_time_unix_nano"));

    let (status, status_message) = decode_status(field(raw, "status", "status"));

    Some(TransformedSpan {
        trace_id,
        span_id,
        parent_span_id,
        service_name: service_name.to_owned(),
        operation_name: field(raw, "name", "name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        start_time: start_nanos.map(nanos_to_datetime).unwrap_or_else(Utc::now),
        end_time: end_nanos.map(nanos_to_datetime).unwrap_or_else(Utc::now),
        duration_ms: duration_ms(start_nanos, end_nanos),
        kind: decode_kind(field(raw, "kind", "kind")),
        status,
        status_message,
        attributes: attributes(field(raw, "attributes", "attributes")),
        events: decode_events(field(raw, "events", "events")),
        links: decode_links(field(raw, "links", "links")),
        resource_attributes: resource_attrs.clone(),
    })
}

fn decode_log_record(
    raw: &Value,
    service_name: &str,
    resource_attrs: &BTreeMap<String, Value>,
) -> CanonicalLogRecord {
    let time = nanos_from_json(field(raw, "timeUnixNano", "time_unix_nano"))
        .or_else(|| nanos_from_json(field(raw, "observedTimeUnixNano", "observed_time_unix_nano")))
        .map(nanos_to_datetime)
        .unwrap_or_else(Utc::now);

    let severity_number = field(raw, "severityNumber", "severity_number")
        .and_then(decode_severity_number)
        .unwrap_or(0);
    let severity_text = field(raw, "severityText", "severity_text")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let message = field(raw, "body", "body")
        .map(|body| body_text(&any_value_to_json(body)))
        .unwrap_or_default();

    let mut record = CanonicalLogRecord::new(
        time,
        service_name.to_owned(),
        level_from_otlp_severity(severity_number, severity_text),
        message,
    );

    record.trace_id = field(raw, "traceId", "trace_id").and_then(|v| id_from_json(v, 16));
    record.span_id = field(raw, "spanId", "span_id").and_then(|v| id_from_json(v, 8));

    record.metadata = attributes(field(raw, "attributes", "attributes"));
    for (key, value) in resource_attrs {
        record
            .metadata
            .entry(format!("resource.{key}"))
            .or_insert_with(|| value.clone());
    }
    if !severity_text.is_empty() {
        record
            .metadata
            .insert("severity_text".to_owned(), Value::String(severity_text.to_owned()));
    }

    record
}

/// Prefer the camelCase field, fall back to snake_case.
fn field<'a>(obj: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    let map = obj.as_object()?;
    map.get(camel).or_else(|| map.get(snake))
}

fn list<'a>(obj: &'a Value, camel: &str, snake: &str) -> impl Iterator<Item = &'a Value> {
    field(obj, camel, snake)
        .and_then(Value::as_array)
        .map(|v| v.iter())
        .unwrap_or_default()
}

fn resource_attributes(resource_scope: &Value) -> BTreeMap<String, Value> {
    let resource = field(resource_scope, "resource", "resource");
    attributes(resource.and_then(|r| field(r, "attributes", "attributes")))
}

fn service_name_from(resource_attrs: &BTreeMap<String, Value>) -> String {
    resource_attrs
        .get("service.name")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_owned()
}

/// Convert an OTLP `[{key, value}]` attribute list to a typed map.
fn attributes(raw: Option<&Value>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    let Some(items) = raw.and_then(Value::as_array) else {
        return out;
    };
    for item in items {
        let Some(key) = field(item, "key", "key").and_then(Value::as_str) else {
            continue;
        };
        let value = field(item, "value", "value")
            .map(any_value_to_json)
            .unwrap_or(Value::Null);
        out.insert(key.to_owned(), value);
    }
    out
}

/// Flatten the OTLP `AnyValue` wrapper into a plain JSON value.
///
/// `intValue` arrives as a decimal string (proto3 JSON int64 mapping);
/// `bytesValue` arrives base64 and is kept as hex.
fn any_value_to_json(raw: &Value) -> Value {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    if let Some(s) = field(raw, "stringValue", "string_value").and_then(Value::as_str) {
        return Value::String(s.to_owned());
    }
    if let Some(v) = field(raw, "intValue", "int_value") {
        let parsed = match v {
            Value::String(s) => s.trim().parse::<i64>().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        };
        if let Some(n) = parsed {
            return Value::Number(n.into());
        }
    }
    if let Some(v) = field(raw, "doubleValue", "double_value").and_then(Value::as_f64) {
        return serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number);
    }
    if let Some(v) = field(raw, "boolValue", "bool_value").and_then(Value::as_bool) {
        return Value::Bool(v);
    }
    if let Some(s) = field(raw, "bytesValue", "bytes_value").and_then(Value::as_str) {
        let hexed = BASE64
            .decode(s)
            .map(hex::encode)
            .unwrap_or_else(|_| s.to_owned());
        return Value::String(hexed);
    }
    if let Some(arr) = field(raw, "arrayValue", "array_value") {
        let values = field(arr, "values", "values")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(any_value_to_json).collect())
            .unwrap_or_default();
        return Value::Array(values);
    }
    if let Some(kvlist) = field(raw, "kvlistValue", "kvlist_value") {
        let mut out = Map::new();
        if let Some(items) = field(kvlist, "values", "values").and_then(Value::as_array) {
            for item in items {
                if let Some(key) = field(item, "key", "key").and_then(Value::as_str) {
                    let value = field(item, "value", "value")
                        .map(any_value_to_json)
                        .unwrap_or(Value::Null);
                    out.insert(key.to_owned(), value);
                }
            }
        }
        return Value::Object(out);
    }
    Value::Null
}

/// Log body as display text: strings verbatim, everything else compact JSON.
fn body_text(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Span kind arrives as a number or a proto enum name.
fn decode_kind(raw: Option<&Value>) -> SpanKind {
    match raw {
        Some(Value::Number(n)) => SpanKind::from(n.as_i64().unwrap_or(0) as i32),
        Some(Value::String(s)) => match s.as_str() {
            "SPAN_KIND_INTERNAL" => SpanKind::Internal,
            "SPAN_KIND_SERVER" => SpanKind::Server,
            "SPAN_KIND_CLIENT" => SpanKind::Client,
            "SPAN_KIND_PRODUCER" => SpanKind::Producer,
            "SPAN_KIND_CONSUMER" => SpanKind::Consumer,
            _ => SpanKind::Unspecified,
        },
        _ => SpanKind::Unspecified,
    }
}

fn decode_status(raw: Option<&Value>) -> (SpanStatus, String) {
    let Some(status) = raw else {
        return (SpanStatus::Unset, String::new());
    };
    let code = match field(status, "code", "code") {
        Some(Value::Number(n)) => SpanStatus::from(n.as_i64().unwrap_or(0) as i32),
        Some(Value::String(s)) => match s.as_str() {
            "STATUS_CODE_OK" => SpanStatus::Ok,
            "STATUS_CODE_ERROR" => SpanStatus::Error,
            _ => SpanStatus::Unset,
        },
        _ => SpanStatus::Unset,
    };
    let message = field(status, "message", "message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    (code, message)
}

fn decode_severity_number(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64(),
        // Proto enum names: SEVERITY_NUMBER_WARN, SEVERITY_NUMBER_ERROR2, ...
        Value::String(s) => match s.strip_prefix("SEVERITY_NUMBER_") {
            Some(name) => {
                let (base, offset) = match name.find(|c: char| c.is_ascii_digit()) {
                    Some(idx) => {
                        let (b, digits) = name.split_at(idx);
                        (b, digits.parse::<i64>().ok().map_or(0, |d| d - 1))
                    }
                    None => (name, 0),
                };
                let band = match base {
                    "TRACE" => 1,
                    "DEBUG" => 5,
                    "INFO" => 9,
                    "WARN" => 13,
                    "ERROR" => 17,
                    "FATAL" => 21,
                    _ => return None,
                };
                Some(band + offset)
            }
            None => s.trim().parse::<i64>().ok(),
        },
        _ => None,
    }
}

fn decode_events(raw: Option<&Value>) -> Vec<SpanEvent> {
    let Some(items) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| SpanEvent {
            time: nanos_from_json(field(item, "timeUnixNano", "time_unix_nano"))
                .map(nanos_to_datetime)
                .unwrap_or_else(Utc::now),
            name: field(item, "name", "name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            attributes: attributes(field(item, "attributes", "attributes")),
        })
        .collect()
}

fn decode_links(raw: Option<&Value>) -> Vec<SpanLink> {
    let Some(items) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let trace_id = id_from_json(field(item, "traceId", "trace_id")?, 16)?;
            let span_id = id_from_json(field(item, "spanId", "span_id")?, 8)?;
            Some(SpanLink {
                trace_id,
                span_id,
                attributes: attributes(field(item, "attributes", "attributes")),
            })
        })
        .collect()
}
