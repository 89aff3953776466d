//! Entity storage port - the contract every backend and combinator implements
//!
//! Backends only see serialized documents, never live entities. Not-found is
//! never an error: every load returns an empty collection instead.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::value_objects::{EntityKey, Gid};

/// A serialized entity envelope
pub type Document = Value;

/// Documents keyed by entity key, as passed to and returned from `update`
pub type DocumentBatch = BTreeMap<EntityKey, Document>;

/// One stored row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: EntityKey,
    pub gid: Option<Gid>,
    pub version: u64,
    pub document: Document,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The writer's observed version no longer matches storage; reload and
    /// retry is up to the caller
    #[error("Concurrency conflict on {key}: observed version {observed} is stale")]
    Conflict { key: EntityKey, observed: u64 },

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Store is read-only: {0}")]
    ReadOnly(String),

    #[error("No storage backends configured")]
    NoBackends,

    #[error("Unsupported storage URL: {0}")]
    UnsupportedUrl(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Remote storage error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

/// Durable, key-addressed store of entity documents.
///
/// `update` is all-or-nothing per batch and returns the written documents
/// with their new versions embedded. All operations may suspend.
#[async_trait]
pub trait EntityStorage: Send + Sync {
    /// Number of live entities
    async fn count(&self) -> Result<u64, StorageError>;

    /// Write a batch of documents under optimistic concurrency control
    async fn update(&self, diffs: DocumentBatch) -> Result<DocumentBatch, StorageError>;

    async fn load_by_gid(&self, gid: Gid) -> Result<Vec<StoredRecord>, StorageError>;

    async fn load_by_key(&self, key: &EntityKey) -> Result<Vec<StoredRecord>, StorageError>;

    async fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError>;
}
