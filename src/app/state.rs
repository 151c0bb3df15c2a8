use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{BroadcastEventBus, MemoryIncidentSink, MemoryTelemetryStore};
use crate::cache::{CacheGateway, InMemoryStore};
use crate::config::Settings;
use crate::ingest::IngestionCoordinator;
use crate::sigma::RuleRegistry;

/// Shared application state holding the ingestion coordinator.
pub struct AppState {
    pub coordinator: Arc<IngestionCoordinator>,
}

impl AppState {
    /// Create `AppState` from configuration settings.
    ///
    /// Wires the in-process collaborators (memory store, incident sink,
    /// broadcast bus, TTL cache) and loads the startup rule directory, if
    /// configured, into the default project.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let cache = Arc::new(CacheGateway::new(
            Arc::new(InMemoryStore::new()),
            settings.cache_enabled,
            Duration::from_secs(settings.cache_ttl_secs),
        ));

        let rules = Arc::new(RuleRegistry::new());
        if let Some(dir) = &settings.rules_dir {
            rules.load_dir(&settings.default_project, Path::new(dir));
        }

        let coordinator = Arc::new(IngestionCoordinator::new(
            Arc::new(MemoryTelemetryStore::new()),
            Arc::new(MemoryIncidentSink::new()),
            Arc::new(BroadcastEventBus::default()),
            cache,
            rules,
            settings.max_batch_size,
            settings.eval_concurrency,
        ));

        Self { coordinator }
    }
}
