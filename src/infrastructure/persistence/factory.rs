//! Storage factory - builds the configured storage stack from URLs
//!
//! Readers are layered with [`PriorityStorage`], writers fanned out with
//! [`AllStorage`], and the two joined by [`SplitStorage`]. A URL listed as both
//! reader and writer is opened once, read-write, and shared.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::ports::outbound::{
    DocumentBatch, EntityStorage, StorageError, StoredRecord,
};
use crate::domain::value_objects::{EntityKey, Gid};
use crate::infrastructure::config::StorageConfig;
use crate::infrastructure::persistence::{
    AllStorage, HttpEntityStorage, InMemoryEntityStorage, PriorityStorage, SplitStorage,
    SqliteEntityStorage,
};

/// Where a storage URL points
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendUrl {
    Http(String),
    Memory(String),
    File(PathBuf),
}

impl BackendUrl {
    pub fn parse(url: &str) -> Result<Self, StorageError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(StorageError::UnsupportedUrl(url.to_string()));
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(Self::Http(url.trim_end_matches('/').to_string()));
        }
        if let Some(name) = url.strip_prefix("memory:") {
            return Ok(Self::Memory(name.to_string()));
        }

        let path = ["sqlite://", "sqlite:", "file://"]
            .iter()
            .find_map(|prefix| url.strip_prefix(prefix))
            .unwrap_or(url);
        if path.is_empty() {
            return Err(StorageError::UnsupportedUrl(url.to_string()));
        }
        Ok(Self::File(PathBuf::from(path)))
    }
}

/// Enum wrapper for the concrete backends so the factory can pick one at
/// runtime
pub enum StorageBackend {
    Memory(InMemoryEntityStorage),
    Sqlite(SqliteEntityStorage),
    Http(HttpEntityStorage),
}

impl StorageBackend {
    async fn open(url: &BackendUrl, writable: bool) -> Result<Self, StorageError> {
        Ok(match url {
            BackendUrl::Http(base) => Self::Http(HttpEntityStorage::new(base)),
            BackendUrl::Memory(_) => Self::Memory(InMemoryEntityStorage::new()),
            BackendUrl::File(path) if writable => Self::Sqlite(SqliteEntityStorage::open(path).await?),
            BackendUrl::File(path) => Self::Sqlite(SqliteEntityStorage::open_read_only(path).await?),
        })
    }
}

#[async_trait]
impl EntityStorage for StorageBackend {
    async fn count(&self) -> Result<u64, StorageError> {
        match self {
            StorageBackend::Memory(s) => s.count().await,
            StorageBackend::Sqlite(s) => s.count().await,
            StorageBackend::Http(s) => s.count().await,
        }
    }

    async fn update(&self, diffs: DocumentBatch) -> Result<DocumentBatch, StorageError> {
        match self {
            StorageBackend::Memory(s) => s.update(diffs).await,
            StorageBackend::Sqlite(s) => s.update(diffs).await,
            StorageBackend::Http(s) => s.update(diffs).await,
        }
    }

    async fn load_by_gid(&self, gid: Gid) -> Result<Vec<StoredRecord>, StorageError> {
        match self {
            StorageBackend::Memory(s) => s.load_by_gid(gid).await,
            StorageBackend::Sqlite(s) => s.load_by_gid(gid).await,
            StorageBackend::Http(s) => s.load_by_gid(gid).await,
        }
    }

    async fn load_by_key(&self, key: &EntityKey) -> Result<Vec<StoredRecord>, StorageError> {
        match self {
            StorageBackend::Memory(s) => s.load_by_key(key).await,
            StorageBackend::Sqlite(s) => s.load_by_key(key).await,
            StorageBackend::Http(s) => s.load_by_key(key).await,
        }
    }

    async fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError> {
        match self {
            StorageBackend::Memory(s) => s.load_all_keys().await,
            StorageBackend::Sqlite(s) => s.load_all_keys().await,
            StorageBackend::Http(s) => s.load_all_keys().await,
        }
    }
}

/// Storage factory for building the storage stack
pub struct StorageFactory {
    opened: HashMap<BackendUrl, Arc<StorageBackend>>,
}

impl StorageFactory {
    /// Build `Split(Priority(readers), All(writers))` from configuration
    pub async fn build(config: &StorageConfig) -> Result<Arc<dyn EntityStorage>, StorageError> {
        let mut factory = Self {
            opened: HashMap::new(),
        };

        // Writers first so a shared URL is opened read-write
        let mut writers: Vec<Arc<dyn EntityStorage>> = Vec::new();
        for url in &config.write_urls {
            writers.push(factory.get_or_open(url, true).await?);
        }
        let mut readers: Vec<Arc<dyn EntityStorage>> = Vec::new();
        for url in &config.read_urls {
            readers.push(factory.get_or_open(url, false).await?);
        }

        tracing::info!(
            readers = readers.len(),
            writers = writers.len(),
            "Storage stack ready"
        );
        Ok(Arc::new(SplitStorage::new(
            Arc::new(PriorityStorage::new(readers)),
            Arc::new(AllStorage::new(writers)),
        )))
    }

    async fn get_or_open(
        &mut self,
        url: &str,
        writable: bool,
    ) -> Result<Arc<StorageBackend>, StorageError> {
        let parsed = BackendUrl::parse(url)?;
        if let Some(existing) = self.opened.get(&parsed) {
            return Ok(existing.clone());
        }

        let backend = Arc::new(StorageBackend::open(&parsed, writable).await?);
        tracing::debug!(url, writable, "Opened storage backend");
        self.opened.insert(parsed, backend.clone());
        Ok(backend)
    }
}
