//! Log ingestion endpoint: NDJSON and JSON bodies.
//!
//! `POST /v1/projects/{project_id}/logs` accepts:
//! - a JSON array (one batch, parsed whole),
//! - `application/x-ndjson` (one object per line, bad lines rejected
//!   per-record),
//! - anything else: the single-log path, which parses only the first line.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, instrument, warn};

use crate::error::IngestError;
use crate::ingest::{IngestionCoordinator, RecordFailure};

#[instrument(skip(coordinator, headers, body), fields(project_id = %project_id, body_size = body.len()))]
pub async fn ingest_logs_handler(
    State(coordinator): State<Arc<IngestionCoordinator>>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let body = body.trim();
    if body.is_empty() {
        return (
            StatusCode::OK,
            Json(json!({"received": 0, "rejected": 0, "detections": 0})),
        )
            .into_response();
    }

    let (raw, parse_failures) = match parse_body(body, &headers) {
        Ok(parsed) => parsed,
        Err(detail) => {
            warn!(detail, "Rejecting unparsable ingest body");
            return validation_error(detail);
        }
    };

    match coordinator.ingest_raw(&project_id, raw).await {
        Ok(mut report) => {
            // Line-level parse failures count as rejected records too.
            report.rejected += parse_failures.len();
            report.failures.extend(parse_failures);
            (
                StatusCode::OK,
                Json(json!({
                    "received": report.accepted,
                    "rejected": report.rejected,
                    "detections": report.detections,
                    "failures": report.failures,
                })),
            )
                .into_response()
        }
        Err(IngestError::BatchTooLarge { got, max }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "batch_too_large",
                "detail": format!("batch of {got} records exceeds the maximum of {max}"),
            })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Ingestion failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "ingestion_failed"})),
            )
                .into_response()
        }
    }
}

type ParsedBody = (Vec<Value>, Vec<RecordFailure>);

fn parse_body(body: &str, headers: &HeaderMap) -> Result<ParsedBody, String> {
    if body.starts_with('[') {
        let values: Vec<Value> = serde_json::from_str(body)
            .map_err(|e| format!("body is not a valid JSON array: {e}"))?;
        return Ok((values, Vec::new()));
    }

    if is_ndjson(headers) {
        let mut values = Vec::new();
        let mut failures = Vec::new();
        for (index, line) in body.lines().filter(|l| !l.trim().is_empty()).enumerate() {
            match serde_json::from_str::<Value>(line) {
                Ok(value) => values.push(value),
                Err(e) => failures.push(RecordFailure {
                    index,
                    error: format!("invalid JSON line: {e}"),
                }),
            }
        }
        return Ok((values, failures));
    }

    // Single-log path: only the first line is consulted.
    let first_line = body.lines().next().unwrap_or_default();
    let value: Value = serde_json::from_str(first_line)
        .map_err(|e| format!("body is not a valid JSON object: {e}"))?;
    Ok((vec![value], Vec::new()))
}

fn is_ndjson(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .is_some_and(|mime| mime == "application/x-ndjson" || mime == "application/ndjson")
}

fn validation_error(detail: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "validation_failed", "detail": detail})),
    )
        .into_response()
}
