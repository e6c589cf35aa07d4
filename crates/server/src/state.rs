use std::sync::Arc;

use bookshelf_core::{AggregationService, Config, ProviderRegistry, SanitizedConfig, StatusTracker};

/// Shared application state
pub struct AppState {
    config: Config,
    registry: Arc<ProviderRegistry>,
    metadata: AggregationService,
}

impl AppState {
    pub fn new(config: Config, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            config,
            metadata: AggregationService::new(Arc::clone(&registry)),
            registry,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn status_tracker(&self) -> &StatusTracker {
        self.registry.status_tracker()
    }

    pub fn metadata(&self) -> &AggregationService {
        &self.metadata
    }
}
