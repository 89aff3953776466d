//! In-memory entity storage
//!
//! Same versioning rules as the SQLite backend, without durability. Used for
//! `memory:` URLs and as a lightweight store in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::write_plan::prepare_batch;
use crate::application::ports::outbound::{
    DocumentBatch, EntityStorage, StorageError, StoredRecord,
};
use crate::domain::value_objects::{EntityKey, Gid};

#[derive(Default)]
struct MemoryState {
    rows: BTreeMap<EntityKey, StoredRecord>,
    /// Highest gid ever handed out, kept across deletes
    last_gid: i64,
}

#[derive(Default)]
pub struct InMemoryEntityStorage {
    state: Mutex<MemoryState>,
}

impl InMemoryEntityStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStorage for InMemoryEntityStorage {
    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.state.lock().await.rows.len() as u64)
    }

    async fn update(&self, diffs: DocumentBatch) -> Result<DocumentBatch, StorageError> {
        let prepared = prepare_batch(diffs)?;
        let mut state = self.state.lock().await;
        let MemoryState { rows, last_gid } = &mut *state;

        // Validate every guard before applying anything
        for write in &prepared {
            let stored = rows.get(&write.key).map(|r| r.version);
            let ok = match (write.destroyed, write.is_insert()) {
                (true, true) => true,
                (_, true) => stored.is_none(),
                (_, false) => stored == Some(write.observed),
            };
            if !ok {
                tracing::warn!(key = %write.key, observed = write.observed, "Stale write rejected");
                return Err(write.conflict());
            }
        }

        let mut written = DocumentBatch::new();
        for mut write in prepared {
            if write.destroyed {
                if write.is_insert() {
                    continue;
                }
                rows.remove(&write.key);
            } else {
                match write.gid {
                    None if write.is_insert() => {
                        *last_gid += 1;
                        write.assign_gid(Gid::new(*last_gid));
                    }
                    Some(gid) => *last_gid = (*last_gid).max(gid.value()),
                    None => {}
                }
                rows.insert(
                    write.key.clone(),
                    StoredRecord {
                        key: write.key.clone(),
                        gid: write.gid,
                        version: write.next_version,
                        document: write.document.clone(),
                    },
                );
            }
            written.insert(write.key, write.document);
        }
        Ok(written)
    }

    async fn load_by_gid(&self, gid: Gid) -> Result<Vec<StoredRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .values()
            .filter(|r| r.gid == Some(gid))
            .cloned()
            .collect())
    }

    async fn load_by_key(&self, key: &EntityKey) -> Result<Vec<StoredRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.rows.get(key).cloned().into_iter().collect())
    }

    async fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError> {
        Ok(self.state.lock().await.rows.keys().cloned().collect())
    }
}
