use std::sync::Arc;

use trawl_core::{Config, SanitizedConfig, SearchCoordinator, SourceCatalog};

/// Shared application state
pub struct AppState {
    config: Config,
    coordinator: Arc<SearchCoordinator>,
}

impl AppState {
    pub fn new(config: Config, coordinator: Arc<SearchCoordinator>) -> Self {
        Self {
            config,
            coordinator,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn coordinator(&self) -> &SearchCoordinator {
        &self.coordinator
    }

    pub fn catalog(&self) -> &SourceCatalog {
        self.coordinator.catalog()
    }
}
