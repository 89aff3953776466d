//! Shared application state

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::application::ports::outbound::EntityStorage;
use crate::domain::entities::ScopeRegistry;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::persistence::StorageFactory;

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<ScopeRegistry>,
    /// The composed storage stack served over HTTP
    pub storage: Arc<dyn EntityStorage>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let storage = StorageFactory::build(&config.storage)
            .await
            .context("Failed to open configured storage")?;
        Ok(Self::with_storage(config, storage))
    }

    pub fn with_storage(config: AppConfig, storage: Arc<dyn EntityStorage>) -> Self {
        Self {
            config,
            registry: Arc::new(ScopeRegistry::default()),
            storage,
        }
    }
}
