//! OTLP HTTP receiver.
//!
//! Supports:
//! - POST /v1/traces (OTLP HTTP, protobuf and JSON, gzip-tolerant)
//! - POST /v1/logs   (OTLP HTTP, protobuf and JSON, gzip-tolerant)
//!
//! Responses follow the OTLP partial-success contract: dropped entries are
//! reported with a rejected count and message instead of failing the
//! request. Decompression and decode are CPU-bound and run on a blocking
//! worker so large payloads cannot stall the accept loop.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use opentelemetry_proto::tonic::collector::logs::v1::{
    ExportLogsPartialSuccess, ExportLogsServiceResponse,
};
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTracePartialSuccess, ExportTraceServiceResponse,
};
use prost::Message;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, instrument, warn};

use crate::error::{IngestError, OtlpError};
use crate::ingest::IngestionCoordinator;
use crate::otlp::{self, ContentKind};

/// Project scoping header; auth-derived project resolution is an external
/// concern.
pub const PROJECT_HEADER: &str = "x-varsel-project";
const DEFAULT_PROJECT: &str = "default";

#[instrument(skip(coordinator, headers, body), fields(body_size = body.len()))]
pub async fn otlp_traces_handler(
    State(coordinator): State<Arc<IngestionCoordinator>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let project_id = project_id(&headers);
    let kind = content_kind(&headers);
    let encoding = content_encoding(&headers);

    let decoded = tokio::task::spawn_blocking(move || {
        let plain = otlp::decompress_if_gzip(&body, encoding.as_deref())?;
        otlp::decode_traces(&plain, kind)
    })
    .await;

    let decoded = match decoded {
        Ok(Ok(decoded)) => decoded,
        Ok(Err(e)) => {
            warn!(error = %e, "Rejecting OTLP trace request");
            return decode_error_response(kind, &e);
        }
        Err(e) => {
            error!(error = %e, "OTLP decode task panicked");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match coordinator.ingest_trace_batch(&project_id, decoded).await {
        Ok(report) => trace_success_response(kind, report.rejected),
        Err(e) => ingest_error_response(kind, &e),
    }
}

#[instrument(skip(coordinator, headers, body), fields(body_size = body.len()))]
pub async fn otlp_logs_handler(
    State(coordinator): State<Arc<IngestionCoordinator>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let project_id = project_id(&headers);
    let kind = content_kind(&headers);
    let encoding = content_encoding(&headers);

    let decoded = tokio::task::spawn_blocking(move || {
        let plain = otlp::decompress_if_gzip(&body, encoding.as_deref())?;
        otlp::decode_logs(&plain, kind)
    })
    .await;

    let decoded = match decoded {
        Ok(Ok(decoded)) => decoded,
        Ok(Err(e)) => {
            warn!(error = %e, "Rejecting OTLP logs request");
            return decode_error_response(kind, &e);
        }
        Err(e) => {
            error!(error = %e, "OTLP decode task panicked");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let rejected = decoded.rejected;
    match coordinator
        .ingest_records(&project_id, decoded.records, Vec::new())
        .await
    {
        Ok(_) => logs_success_response(kind, rejected),
        Err(e) => ingest_error_response(kind, &e),
    }
}

fn project_id(headers: &HeaderMap) -> String {
    headers
        .get(PROJECT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_PROJECT)
        .to_owned()
}

fn content_kind(headers: &HeaderMap) -> ContentKind {
    otlp::detect_content_type(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    )
}

fn content_encoding(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn trace_success_response(kind: ContentKind, rejected: usize) -> Response {
    match kind {
        ContentKind::Protobuf => {
            let response = ExportTraceServiceResponse {
                partial_success: (rejected > 0).then(|| ExportTracePartialSuccess {
                    rejected_spans: rejected as i64,
                    error_message: rejected_message(rejected, "spans"),
                }),
            };
            protobuf_response(StatusCode::OK, response.encode_to_vec())
        }
        _ => {
            let body = if rejected > 0 {
                json!({"partialSuccess": {
                    "rejectedSpans": rejected,
                    "errorMessage": rejected_message(rejected, "spans"),
                }})
            } else {
                json!({})
            };
            (StatusCode::OK, axum::Json(body)).into_response()
        }
    }
}

fn logs_success_response(kind: ContentKind, rejected: usize) -> Response {
    match kind {
        ContentKind::Protobuf => {
            let response = ExportLogsServiceResponse {
                partial_success: (rejected > 0).then(|| ExportLogsPartialSuccess {
                    rejected_log_records: rejected as i64,
                    error_message: rejected_message(rejected, "log records"),
                }),
            };
            protobuf_response(StatusCode::OK, response.encode_to_vec())
        }
        _ => {
            let body = if rejected > 0 {
                json!({"partialSuccess": {
                    "rejectedLogRecords": rejected,
                    "errorMessage": rejected_message(rejected, "log records"),
                }})
            } else {
                json!({})
            };
            (StatusCode::OK, axum::Json(body)).into_response()
        }
    }
}

fn rejected_message(rejected: usize, what: &str) -> String {
    format!("{rejected} {what} dropped for missing or all-zero trace/span IDs")
}

/// A fully invalid request gets an explicit error message, not a bare 500.
fn decode_error_response(kind: ContentKind, error: &OtlpError) -> Response {
    match kind {
        ContentKind::Protobuf => protobuf_response(StatusCode::BAD_REQUEST, Vec::new()),
        _ => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({"code": 3, "message": error.to_string()})),
        )
            .into_response(),
    }
}

fn ingest_error_response(kind: ContentKind, error: &IngestError) -> Response {
    error!(error = %error, "Failed to ingest OTLP batch");
    match kind {
        ContentKind::Protobuf => protobuf_response(StatusCode::INTERNAL_SERVER_ERROR, Vec::new()),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({"code": 13, "message": "storage write failed"})),
        )
            .into_response(),
    }
}

fn protobuf_response(status: StatusCode, body: Vec<u8>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/x-protobuf")],
        Bytes::from(body),
    )
        .into_response()
}
