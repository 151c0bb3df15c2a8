//! Collaborator adapters.

pub mod memory;

pub use memory::{BroadcastEventBus, MemoryIncidentSink, MemoryTelemetryStore};
