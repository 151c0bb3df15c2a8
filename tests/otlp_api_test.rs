//! Integration tests for the OTLP HTTP receiver.

use axum::http::StatusCode;
use axum_test::TestServer;
use flate2::Compression;
use flate2::write::GzEncoder;
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use prost::Message;
use serde_json::{Value, json};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use varsel::adapter::{BroadcastEventBus, MemoryIncidentSink, MemoryTelemetryStore};
use varsel::app::{main_router, otlp_router};
use varsel::cache::{CacheGateway, InMemoryStore};
use varsel::ingest::IngestionCoordinator;
use varsel::sigma::RuleRegistry;

struct TestApp {
    server: TestServer,
    store: Arc<MemoryTelemetryStore>,
    incidents: Arc<MemoryIncidentSink>,
    rules: Arc<RuleRegistry>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryTelemetryStore::new());
    let incidents = Arc::new(MemoryIncidentSink::new());
    let rules = Arc::new(RuleRegistry::new());
    let coordinator = Arc::new(IngestionCoordinator::new(
        store.clone(),
        incidents.clone(),
        Arc::new(BroadcastEventBus::new(16)),
        Arc::new(CacheGateway::new(
            Arc::new(InMemoryStore::new()),
            true,
            Duration::from_secs(60),
        )),
        rules.clone(),
        1000,
        4,
    ));
    let app = main_router(coordinator.clone()).merge(otlp_router(coordinator));
    TestApp {
        server: TestServer::new(app).expect("Failed to create test server"),
        store,
        incidents,
        rules,
    }
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn service_resource(name: &str) -> Resource {
    Resource {
        attributes: vec![KeyValue {
            key: "service.name".to_string(),
            value: Some(AnyValue {
                value: Some(any_value::Value::StringValue(name.to_string())),
            }),
        }],
        ..Default::default()
    }
}

fn trace_request(spans: Vec<Span>) -> ExportTraceServiceRequest {
    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(service_resource("checkout")),
            scope_spans: vec![ScopeSpans {
                spans,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn span(trace_byte: u8, span_byte: u8) -> Span {
    Span {
        trace_id: vec![trace_byte; 16],
        span_id: vec![span_byte; 8],
        name: "op".to_string(),
        kind: 2,
        start_time_unix_nano: 1_700_000_000_000_000_000,
        end_time_unix_nano: 1_700_000_001_000_000_000,
        ..Default::default()
    }
}

#[tokio::test]
async fn protobuf_traces_are_ingested() {
    let app = test_app();
    let body = trace_request(vec![span(0x01, 0x02)]).encode_to_vec();

    let response = app
        .server
        .post("/v1/traces")
        .content_type("application/x-protobuf")
        .bytes(body.into())
        .await;

    response.assert_status(StatusCode::OK);
    let decoded = ExportTraceServiceResponse::decode(response.as_bytes().as_ref()).unwrap();
    assert!(decoded.partial_success.is_none());

    assert_eq!(app.store.span_count(), 1);
    let aggregate = app.store.trace("default", &"01".repeat(16)).unwrap();
    assert_eq!(aggregate.span_count, 1);
    assert_eq!(aggregate.duration_ms, 1_000);
}

#[tokio::test]
async fn project_header_scopes_storage() {
    let app = test_app();
    let body = trace_request(vec![span(0x03, 0x04)]).encode_to_vec();

    app.server
        .post("/v1/traces")
        .content_type("application/x-protobuf")
        .add_header("x-varsel-project", "team-a")
        .bytes(body.into())
        .await
        .assert_status(StatusCode::OK);

    assert!(app.store.trace("team-a", &"03".repeat(16)).is_some());
    assert!(app.store.trace("default", &"03".repeat(16)).is_none());
}

#[tokio::test]
async fn gzip_body_without_encoding_header_is_accepted() {
    let app = test_app();
    let plain = trace_request(vec![span(0x05, 0x06)]).encode_to_vec();
    let compressed = gzip(&plain);

    // With the header.
    app.server
        .post("/v1/traces")
        .content_type("application/x-protobuf")
        .add_header("content-encoding", "gzip")
        .bytes(compressed.clone().into())
        .await
        .assert_status(StatusCode::OK);

    // Magic bytes only, no header: same outcome.
    app.server
        .post("/v1/traces")
        .content_type("application/x-protobuf")
        .bytes(compressed.into())
        .await
        .assert_status(StatusCode::OK);

    assert_eq!(app.store.span_count(), 2);
}

#[tokio::test]
async fn corrupt_gzip_is_rejected_with_message() {
    let app = test_app();
    let mut compressed = gzip(b"payload");
    compressed.truncate(5);

    let response = app
        .server
        .post("/v1/traces")
        .content_type("application/json")
        .bytes(compressed.into())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["message"].as_str().unwrap().contains("decompress"));
}

#[tokio::test]
async fn invalid_protobuf_is_rejected() {
    let app = test_app();
    let response = app
        .server
        .post("/v1/traces")
        .content_type("application/x-protobuf")
        .bytes(vec![0xFF, 0xFF, 0xFF, 0xFF].into())
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn zero_trace_ids_surface_in_partial_success() {
    let app = test_app();
    let body = json!({
        "resourceSpans": [{
            "resource": {"attributes": [
                {"key": "service.name", "value": {"stringValue": "checkout"}}
            ]},
            "scopeSpans": [{"spans": [
                {
                    "traceId": "01".repeat(16),
                    "spanId": "02".repeat(8),
                    "name": "kept"
                },
                {
                    "traceId": "00".repeat(16),
                    "spanId": "03".repeat(8),
                    "name": "dropped"
                }
            ]}]
        }]
    })
    .to_string();

    let response = app
        .server
        .post("/v1/traces")
        .content_type("application/json")
        .text(body)
        .await;

    response.assert_status(StatusCode::OK);
    let result: Value = response.json();
    assert_eq!(result["partialSuccess"]["rejectedSpans"], json!(1));
    assert!(
        result["partialSuccess"]["errorMessage"]
            .as_str()
            .unwrap()
            .contains("dropped")
    );
    assert_eq!(app.store.span_count(), 1);
}

#[tokio::test]
async fn json_body_with_protobuf_content_type_is_tolerated() {
    let app = test_app();
    let body = json!({
        "resourceSpans": [{
            "scopeSpans": [{"spans": [{
                "traceId": "0a".repeat(16),
                "spanId": "0b".repeat(8),
                "name": "sneaky"
            }]}]
        }]
    })
    .to_string();

    let response = app
        .server
        .post("/v1/traces")
        .content_type("application/x-protobuf")
        .bytes(body.into_bytes().into())
        .await;

    response.assert_status(StatusCode::OK);
    assert_eq!(app.store.span_count(), 1);
}

#[tokio::test]
async fn otlp_logs_run_through_detection() {
    let app = test_app();
    let rule = r#"
title: error log via otlp
id: rule-otlp-errors
level: medium
detection:
  selection:
    level: error
    message|contains: denied
  condition: selection
"#;
    assert!(app.rules.load_documents("default", &[rule.to_owned()]).is_empty());

    let body = json!({
        "resourceLogs": [{
            "resource": {"attributes": [
                {"key": "service.name", "value": {"stringValue": "auth"}}
            ]},
            "scopeLogs": [{"logRecords": [{
                "timeUnixNano": "1700000000000000000",
                "severityNumber": 17,
                "body": {"stringValue": "access denied for admin"}
            }]}]
        }]
    })
    .to_string();

    let response = app
        .server
        .post("/v1/logs")
        .content_type("application/json")
        .text(body)
        .await;

    response.assert_status(StatusCode::OK);
    let stored = app.store.stored_logs("default");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].service, "auth");

    let events = app.incidents.events("default");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].rule_id, "rule-otlp-errors");
}

#[tokio::test]
async fn empty_trace_request_is_ok() {
    let app = test_app();
    let body = ExportTraceServiceRequest::default().encode_to_vec();
    let response = app
        .server
        .post("/v1/traces")
        .content_type("application/x-protobuf")
        .bytes(body.into())
        .await;
    response.assert_status(StatusCode::OK);
    assert_eq!(app.store.span_count(), 0);
}
