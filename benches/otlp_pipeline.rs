use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use opentelemetry_proto::tonic::{
    collector::trace::v1::ExportTraceServiceRequest,
    common::v1::{AnyValue, KeyValue, any_value},
    resource::v1::Resource,
    trace::v1::{ResourceSpans, ScopeSpans, Span, Status},
};
use prost::Message;
use serde_json::json;

use varsel::otlp::{self, ContentKind, aggregate_batch};
use varsel::sigma::{compile_rule, evaluate_record};
use varsel::domain::{CanonicalLogRecord, LogLevel};

fn make_attributes(n: usize) -> Vec<KeyValue> {
    (0..n)
        .map(|i| KeyValue {
            key: format!("key_{i}"),
            value: Some(AnyValue {
                value: Some(any_value::Value::StringValue(format!("value_{i}"))),
            }),
        })
        .collect()
}

fn make_trace_request(n_spans: usize) -> ExportTraceServiceRequest {
    let spans: Vec<Span> = (0..n_spans)
        .map(|i| Span {
            trace_id: {
                let mut id = vec![0u8; 16];
                id[15] = (i % 17 + 1) as u8;
                id
            },
            span_id: (i as u64 + 1).to_be_bytes().to_vec(),
            parent_span_id: if i % 5 == 0 { vec![] } else { vec![0x03; 8] },
            name: format!("span-{i}"),
            kind: 2,
            start_time_unix_nano: 1_700_000_000_000_000_000,
            end_time_unix_nano: 1_700_000_000_000_000_000 + (i as u64 + 1) * 1_000_000,
            attributes: make_attributes(5),
            status: Some(Status {
                code: (i % 3) as i32,
                message: String::new(),
            }),
            ..Default::default()
        })
        .collect();

    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(Resource {
                attributes: vec![KeyValue {
                    key: "service.name".to_string(),
                    value: Some(AnyValue {
                        value: Some(any_value::Value::StringValue("bench-service".to_string())),
                    }),
                }],
                ..Default::default()
            }),
            scope_spans: vec![ScopeSpans {
                spans,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn make_json_trace_body(n_spans: usize) -> Vec<u8> {
    let spans: Vec<serde_json::Value> = (0..n_spans)
        .map(|i| {
            json!({
                "traceId": format!("{:032x}", i % 17 + 1),
                "spanId": format!("{:016x}", i + 1),
                "name": format!("span-{i}"),
                "kind": 2,
                "startTimeUnixNano": "1700000000000000000",
                "endTimeUnixNano": format!("{}", 1_700_000_000_000_000_000u64 + (i as u64 + 1) * 1_000_000),
            })
        })
        .collect();
    json!({
        "resourceSpans": [{
            "resource": {"attributes": [
                {"key": "service.name", "value": {"stringValue": "bench-service"}}
            ]},
            "scopeSpans": [{"spans": spans}]
        }]
    })
    .to_string()
    .into_bytes()
}

fn bench_trace_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("otlp_trace_decode");
    for n_spans in [10, 100, 1000] {
        let protobuf_body = make_trace_request(n_spans).encode_to_vec();
        let json_body = make_json_trace_body(n_spans);

        group.bench_with_input(
            BenchmarkId::new("protobuf", n_spans),
            &protobuf_body,
            |b, body| {
                b.iter(|| otlp::decode_traces(black_box(body), ContentKind::Protobuf).unwrap());
            },
        );
        group.bench_with_input(BenchmarkId::new("json", n_spans), &json_body, |b, body| {
            b.iter(|| otlp::decode_traces(black_box(body), ContentKind::Json).unwrap());
        });
    }
    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let body = make_trace_request(1000).encode_to_vec();
    let decoded = otlp::decode_traces(&body, ContentKind::Protobuf).unwrap();
    c.bench_function("trace_aggregation_1000_spans", |b| {
        b.iter(|| aggregate_batch(black_box(&decoded.spans)));
    });
}

fn bench_sigma_evaluation(c: &mut Criterion) {
    let rule = compile_rule(
        r#"
title: bench rule
detection:
  selection:
    service: sshd
    message|contains: "Failed password"
  filter:
    message|contains: "test environment"
  condition: selection and not filter
"#,
    )
    .unwrap();

    let record = CanonicalLogRecord::new(
        chrono::Utc::now(),
        "sshd".to_owned(),
        LogLevel::Warn,
        "Failed password for invalid user admin from 203.0.113.7 port 22".to_owned(),
    );

    c.bench_function("sigma_evaluate_single_rule", |b| {
        b.iter(|| evaluate_record(black_box(&record), black_box(&rule)));
    });
}

criterion_group!(
    benches,
    bench_trace_decode,
    bench_aggregation,
    bench_sigma_evaluation
);
criterion_main!(benches);
