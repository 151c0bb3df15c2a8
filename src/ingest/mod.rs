//! Ingestion orchestration.

pub mod coordinator;

pub use coordinator::{IngestReport, IngestionCoordinator, RecordFailure, TraceReport};
