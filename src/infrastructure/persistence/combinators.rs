//! Storage combinators - compose backends behind the same contract
//!
//! - [`AllStorage`] fans writes out to every child (primary first)
//! - [`PriorityStorage`] reads through children in order, writes to the first
//! - [`SplitStorage`] sends reads to one store and writes to another
//!
//! Read misses fall through; a backend error on any path propagates.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde_json::json;
use tracing::{debug, warn};

use crate::application::dto::DocumentHeader;
use crate::application::ports::outbound::{
    DocumentBatch, EntityStorage, StorageError, StoredRecord,
};
use crate::domain::value_objects::{EntityKey, Gid};

pub type SharedStorage = Arc<dyn EntityStorage>;

/// Return the first non-empty result, trying children in order
async fn first_non_empty<'a, T, F, Fut>(
    children: &'a [SharedStorage],
    load: F,
) -> Result<Vec<T>, StorageError>
where
    F: Fn(&'a SharedStorage) -> Fut,
    Fut: Future<Output = Result<Vec<T>, StorageError>>,
{
    for child in children {
        let found = load(child).await?;
        if !found.is_empty() {
            return Ok(found);
        }
    }
    Ok(Vec::new())
}

/// Write-through fan-out.
///
/// The first child is the primary: its result is the one returned. Replicas
/// receive the same diffs with the primary's assigned gids filled in. The
/// first failing child aborts the fan-out and its error propagates; children
/// already written are not rolled back.
pub struct AllStorage {
    children: Vec<SharedStorage>,
}

impl AllStorage {
    pub fn new(children: Vec<SharedStorage>) -> Self {
        Self { children }
    }

    pub fn primary(&self) -> Option<&SharedStorage> {
        self.children.first()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Copy gids the primary assigned on insert into the diffs sent to replicas
fn with_assigned_gids(diffs: &DocumentBatch, primary: &DocumentBatch) -> DocumentBatch {
    let mut replica_diffs = diffs.clone();
    for (key, document) in replica_diffs.iter_mut() {
        if !document.get("gid").is_some_and(|g| g.is_null()) {
            continue;
        }
        if let Some(gid) = primary.get(key).and_then(|d| d.get("gid")).and_then(|g| g.as_i64()) {
            document["gid"] = json!(gid);
        }
    }
    replica_diffs
}

fn versions_agree(primary: &DocumentBatch, replica: &DocumentBatch) -> bool {
    let version = |d: &serde_json::Value| DocumentHeader::parse(d).ok().map(|h| h.version.i);
    primary.len() == replica.len()
        && primary
            .iter()
            .all(|(key, doc)| replica.get(key).map(version) == Some(version(doc)))
}

#[async_trait]
impl EntityStorage for AllStorage {
    /// Largest count among children
    async fn count(&self) -> Result<u64, StorageError> {
        let counts = try_join_all(self.children.iter().map(|child| child.count())).await?;
        Ok(counts.into_iter().max().unwrap_or(0))
    }

    async fn update(&self, diffs: DocumentBatch) -> Result<DocumentBatch, StorageError> {
        let Some((primary, replicas)) = self.children.split_first() else {
            return Err(StorageError::NoBackends);
        };

        let written = primary.update(diffs.clone()).await?;
        if replicas.is_empty() {
            return Ok(written);
        }

        let replica_diffs = with_assigned_gids(&diffs, &written);
        for (index, replica) in replicas.iter().enumerate() {
            let replicated = replica.update(replica_diffs.clone()).await?;
            if !versions_agree(&written, &replicated) {
                warn!(replica = index + 1, "Replica versions diverge from primary");
            }
        }
        debug!(replicas = replicas.len(), "Fanned out batch");
        Ok(written)
    }

    async fn load_by_gid(&self, gid: Gid) -> Result<Vec<StoredRecord>, StorageError> {
        first_non_empty(&self.children, |child| child.load_by_gid(gid)).await
    }

    async fn load_by_key(&self, key: &EntityKey) -> Result<Vec<StoredRecord>, StorageError> {
        first_non_empty(&self.children, |child| child.load_by_key(key)).await
    }

    async fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError> {
        first_non_empty(&self.children, |child| child.load_all_keys()).await
    }
}

/// Layered reads, e.g. a fast local store in front of an authoritative one.
/// Writes go to the first child only.
pub struct PriorityStorage {
    children: Vec<SharedStorage>,
}

impl PriorityStorage {
    pub fn new(children: Vec<SharedStorage>) -> Self {
        Self { children }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl EntityStorage for PriorityStorage {
    /// First non-zero count in priority order
    async fn count(&self) -> Result<u64, StorageError> {
        for child in &self.children {
            let count = child.count().await?;
            if count > 0 {
                return Ok(count);
            }
        }
        Ok(0)
    }

    async fn update(&self, diffs: DocumentBatch) -> Result<DocumentBatch, StorageError> {
        match self.children.first() {
            Some(primary) => primary.update(diffs).await,
            None => Err(StorageError::NoBackends),
        }
    }

    async fn load_by_gid(&self, gid: Gid) -> Result<Vec<StoredRecord>, StorageError> {
        first_non_empty(&self.children, |child| child.load_by_gid(gid)).await
    }

    async fn load_by_key(&self, key: &EntityKey) -> Result<Vec<StoredRecord>, StorageError> {
        first_non_empty(&self.children, |child| child.load_by_key(key)).await
    }

    async fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError> {
        first_non_empty(&self.children, |child| child.load_all_keys()).await
    }
}

/// Reads from one store, writes to another
pub struct SplitStorage {
    read: SharedStorage,
    write: SharedStorage,
}

impl SplitStorage {
    pub fn new(read: SharedStorage, write: SharedStorage) -> Self {
        Self { read, write }
    }

    pub fn reader(&self) -> &SharedStorage {
        &self.read
    }

    pub fn writer(&self) -> &SharedStorage {
        &self.write
    }
}

#[async_trait]
impl EntityStorage for SplitStorage {
    async fn count(&self) -> Result<u64, StorageError> {
        self.read.count().await
    }

    async fn update(&self, diffs: DocumentBatch) -> Result<DocumentBatch, StorageError> {
        self.write.update(diffs).await
    }

    async fn load_by_gid(&self, gid: Gid) -> Result<Vec<StoredRecord>, StorageError> {
        self.read.load_by_gid(gid).await
    }

    async fn load_by_key(&self, key: &EntityKey) -> Result<Vec<StoredRecord>, StorageError> {
        self.read.load_by_key(key).await
    }

    async fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError> {
        self.read.load_all_keys().await
    }
}
