use thiserror::Error;

/// Top-level application error (startup and serving).
#[derive(Error, Debug)]
pub enum VarselError {
    #[error("Failed to load configuration: {0}")]
    Config(String),

    #[error("Failed to bind to address {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Errors raised while decoding an OTLP payload.
///
/// Every variant corresponds to a whole-request failure; single malformed
/// spans or records inside an otherwise valid payload are dropped and
/// counted, never surfaced here.
#[derive(Error, Debug)]
pub enum OtlpError {
    #[error("Failed to decompress gzip body: {0}")]
    Decompress(String),

    #[error("Failed to decode OTLP JSON payload: {0}")]
    Json(String),

    #[error("Failed to decode OTLP protobuf payload: {0}")]
    Protobuf(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),
}

/// Errors raised by the ingestion coordinator.
///
/// Cache and pub/sub failures never appear here: those collaborators are
/// best-effort and their errors are swallowed at the call site.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Batch of {got} records exceeds the configured maximum of {max}")]
    BatchTooLarge { got: usize, max: usize },

    #[error("Storage write failed: {0}")]
    Storage(String),

    #[error("Incident sink rejected detection events: {0}")]
    Incidents(String),
}
