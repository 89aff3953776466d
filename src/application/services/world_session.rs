//! World Session - unit of work over entities and a storage pipeline
//!
//! A session registers the entities a piece of work touches, lets callers
//! mutate them through the scope protocol, and flushes every dirty entity to
//! storage as one batch. It is also the explicit context scope logic receives
//! when it needs to register or unregister entities.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::application::dto::{decode, encode, CodecError, DocumentHeader};
use crate::application::ports::outbound::{DocumentBatch, EntityStorage, StorageError};
use crate::domain::entities::{Container, Entity, EntityError, ScopeRegistry};
use crate::domain::services::{hold, InventoryError};
use crate::domain::value_objects::{EntityKey, Gid};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("Entity not registered: {0}")]
    NotRegistered(EntityKey),

    #[error("Entity already registered: {0}")]
    AlreadyRegistered(EntityKey),
}

impl SessionError {
    /// Whether reloading and retrying could succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, SessionError::Storage(e) if e.is_conflict())
    }
}

pub struct WorldSession {
    registry: Arc<ScopeRegistry>,
    storage: Arc<dyn EntityStorage>,
    entities: HashMap<EntityKey, Entity>,
}

impl WorldSession {
    pub fn new(registry: Arc<ScopeRegistry>, storage: Arc<dyn EntityStorage>) -> Self {
        Self {
            registry,
            storage,
            entities: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &ScopeRegistry {
        &self.registry
    }

    /// Create and register a new entity
    pub fn create(
        &mut self,
        category: &str,
        creator: Option<&EntityKey>,
    ) -> Result<EntityKey, SessionError> {
        let mut entity = Entity::new(&self.registry, category)?;
        if let Some(creator) = creator {
            entity = entity.with_creator(creator);
        }
        let key = entity.key().clone();
        self.register(entity)?;
        Ok(key)
    }

    pub fn register(&mut self, entity: Entity) -> Result<&mut Entity, SessionError> {
        let key = entity.key().clone();
        if self.entities.contains_key(&key) {
            return Err(SessionError::AlreadyRegistered(key));
        }
        debug!(key = %key, category = entity.category(), "Registered entity");
        Ok(self.entities.entry(key).or_insert(entity))
    }

    /// Forget an entity without saving or deleting it
    pub fn unregister(&mut self, key: &EntityKey) -> Option<Entity> {
        self.entities.remove(key)
    }

    pub fn entity(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn entity_mut(&mut self, key: &EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn dirty_keys(&self) -> Vec<EntityKey> {
        let mut keys: Vec<EntityKey> = self
            .entities
            .values()
            .filter(|e| e.is_dirty())
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Tombstone an entity; the delete goes out with the next save
    pub fn destroy(&mut self, key: &EntityKey) -> Result<(), SessionError> {
        let entity = self
            .entities
            .get_mut(key)
            .ok_or_else(|| SessionError::NotRegistered(key.clone()))?;
        entity.destroy();
        Ok(())
    }

    /// Return the registered entity, loading it from storage if needed
    #[instrument(skip(self))]
    pub async fn load_by_key(
        &mut self,
        key: &EntityKey,
    ) -> Result<Option<&mut Entity>, SessionError> {
        if !self.entities.contains_key(key) {
            let records = self.storage.load_by_key(key).await?;
            let Some(record) = records.into_iter().next() else {
                return Ok(None);
            };
            let entity = decode(&self.registry, &record.document)?;
            self.entities.insert(key.clone(), entity);
        }
        Ok(self.entities.get_mut(key))
    }

    #[instrument(skip(self))]
    pub async fn load_by_gid(&mut self, gid: Gid) -> Result<Option<EntityKey>, SessionError> {
        if let Some(entity) = self.entities.values().find(|e| e.gid() == Some(gid)) {
            return Ok(Some(entity.key().clone()));
        }
        let records = self.storage.load_by_gid(gid).await?;
        let Some(record) = records.into_iter().next() else {
            return Ok(None);
        };
        let entity = decode(&self.registry, &record.document)?;
        let key = entity.key().clone();
        self.entities.insert(key.clone(), entity);
        Ok(Some(key))
    }

    /// Put `item` inside `holder`.
    ///
    /// Returns the item of record. When the item merged into an existing
    /// stack, the merged-away item is unregistered; if it was already stored
    /// it stays registered as a tombstone so the next save deletes it.
    pub fn hold(
        &mut self,
        holder_key: &EntityKey,
        item_key: &EntityKey,
    ) -> Result<EntityKey, SessionError> {
        if holder_key == item_key {
            return Err(InventoryError::SelfContainment(holder_key.clone()).into());
        }
        if !self.entities.contains_key(item_key) {
            return Err(SessionError::NotRegistered(item_key.clone()));
        }
        let mut holder = self
            .entities
            .remove(holder_key)
            .ok_or_else(|| SessionError::NotRegistered(holder_key.clone()))?;
        let Some(mut item) = self.entities.remove(item_key) else {
            self.entities.insert(holder_key.clone(), holder);
            return Err(SessionError::NotRegistered(item_key.clone()));
        };

        let contents = holder.read::<Container>().contents;
        let held = self
            .entities
            .values_mut()
            .filter(|e| contents.contains(e.key()));
        let result = hold(&mut holder, &mut item, held);

        self.entities.insert(holder_key.clone(), holder);
        match result {
            Ok(of_record) if &of_record != item_key => {
                if item.version() > 0 {
                    item.destroy();
                    self.entities.insert(item_key.clone(), item);
                }
                debug!(merged = %item_key, into = %of_record, "Dropped merged item");
                Ok(of_record)
            }
            other => {
                self.entities.insert(item_key.clone(), item);
                Ok(other?)
            }
        }
    }

    /// Flush every dirty entity as one batch.
    ///
    /// On success versions and gids advance from the stored documents and
    /// destroyed entities are dropped from the session. On failure nothing in
    /// the session changes; reload-and-retry is up to the caller.
    #[instrument(skip(self))]
    pub async fn save(&mut self) -> Result<usize, SessionError> {
        let mut batch = DocumentBatch::new();
        for entity in self.entities.values().filter(|e| e.is_dirty()) {
            batch.insert(entity.key().clone(), encode(entity)?);
        }
        if batch.is_empty() {
            return Ok(0);
        }
        let submitted: Vec<EntityKey> = batch.keys().cloned().collect();

        let stored = self.storage.update(batch).await?;

        for (key, document) in &stored {
            let header = DocumentHeader::parse(document)?;
            match self.entities.get_mut(key) {
                Some(entity) => entity.mark_persisted(header.version.i, header.gid),
                None => warn!(key = %key, "Storage returned a document for an unknown entity"),
            }
        }
        for key in &submitted {
            if self.entities.get(key).is_some_and(|e| e.is_destroyed()) {
                self.entities.remove(key);
            }
        }

        info!(count = submitted.len(), "Saved entities");
        Ok(submitted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Describable, Stackable};
    use crate::infrastructure::persistence::InMemoryEntityStorage;

    fn session_with(storage: Arc<InMemoryEntityStorage>) -> WorldSession {
        WorldSession::new(Arc::new(ScopeRegistry::default()), storage)
    }

    fn name(session: &mut WorldSession, key: &EntityKey, value: &str) {
        let entity = session.entity_mut(key).unwrap();
        if let Some(mut desc) = entity.make::<Describable>() {
            desc.name = value.to_string();
        }
    }

    #[tokio::test]
    async fn test_save_assigns_version_and_gid() {
        let storage = Arc::new(InMemoryEntityStorage::new());
        let mut session = session_with(storage.clone());
        let key = session.create("room", None).unwrap();
        name(&mut session, &key, "Hall");

        assert_eq!(session.save().await.unwrap(), 1);

        let entity = session.entity(&key).unwrap();
        assert_eq!(entity.version(), 1);
        assert!(entity.gid().is_some());
        assert!(!entity.is_dirty());
        assert_eq!(storage.count().await.unwrap(), 1);

        // Nothing dirty, nothing written
        assert_eq!(session.save().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stale_session_loses_and_keeps_state() {
        let storage = Arc::new(InMemoryEntityStorage::new());
        let mut first = session_with(storage.clone());
        let key = first.create("room", None).unwrap();
        name(&mut first, &key, "Hall");
        first.save().await.unwrap();

        let mut second = session_with(storage.clone());
        second.load_by_key(&key).await.unwrap().unwrap();

        name(&mut first, &key, "Great Hall");
        first.save().await.unwrap();

        name(&mut second, &key, "Small Hall");
        let err = second.save().await.unwrap_err();
        assert!(err.is_conflict());
        let stale = second.entity(&key).unwrap();
        assert!(stale.is_dirty());
        assert_eq!(stale.version(), 1);

        // Reload and retry
        second.unregister(&key);
        let fresh = second.load_by_key(&key).await.unwrap().unwrap();
        assert_eq!(fresh.read::<Describable>().name, "Great Hall");
        assert_eq!(fresh.version(), 2);
    }

    #[tokio::test]
    async fn test_destroy_deletes_on_save() {
        let storage = Arc::new(InMemoryEntityStorage::new());
        let mut session = session_with(storage.clone());
        let key = session.create("item", None).unwrap();
        session.save().await.unwrap();

        session.destroy(&key).unwrap();
        session.save().await.unwrap();

        assert!(session.entity(&key).is_none());
        assert!(storage.load_by_key(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_by_gid() {
        let storage = Arc::new(InMemoryEntityStorage::new());
        let mut writer = session_with(storage.clone());
        let key = writer.create("room", None).unwrap();
        writer.save().await.unwrap();
        let gid = writer.entity(&key).unwrap().gid().unwrap();

        let mut reader = session_with(storage);
        assert_eq!(reader.load_by_gid(gid).await.unwrap(), Some(key));
        assert_eq!(reader.load_by_gid(Gid::new(9999)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hold_merge_unregisters_item() {
        let storage = Arc::new(InMemoryEntityStorage::new());
        let mut session = session_with(storage);
        let player = session.create("player", None).unwrap();
        let mut stacks = Vec::new();
        for quantity in [2, 3] {
            let key = session.create("item", Some(&player)).unwrap();
            if let Some(mut stack) = session.entity_mut(&key).unwrap().make::<Stackable>() {
                stack.kind = "arrow".to_string();
                stack.quantity = quantity;
            }
            stacks.push(key);
        }

        assert_eq!(session.hold(&player, &stacks[0]).unwrap(), stacks[0]);
        assert_eq!(session.hold(&player, &stacks[1]).unwrap(), stacks[0]);

        assert!(session.entity(&stacks[1]).is_none());
        let quantity = session.entity(&stacks[0]).unwrap().read::<Stackable>().quantity;
        assert_eq!(quantity, 5);
    }

    #[tokio::test]
    async fn test_hold_merge_deletes_stored_item() {
        let storage = Arc::new(InMemoryEntityStorage::new());
        let mut session = session_with(storage.clone());
        let chest = session.create("container", None).unwrap();
        let mut stacks = Vec::new();
        for _ in 0..2 {
            let key = session.create("item", None).unwrap();
            if let Some(mut stack) = session.entity_mut(&key).unwrap().make::<Stackable>() {
                stack.kind = "coin".to_string();
            }
            stacks.push(key);
        }
        session.hold(&chest, &stacks[0]).unwrap();
        session.save().await.unwrap();

        assert_eq!(session.hold(&chest, &stacks[1]).unwrap(), stacks[0]);
        assert!(session.entity(&stacks[1]).unwrap().is_destroyed());
        session.save().await.unwrap();

        assert!(session.entity(&stacks[1]).is_none());
        assert!(storage.load_by_key(&stacks[1]).await.unwrap().is_empty());
        let stored = storage.load_by_key(&stacks[0]).await.unwrap();
        assert_eq!(stored[0].document["stackable"]["quantity"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_hold_self_is_rejected() {
        let storage = Arc::new(InMemoryEntityStorage::new());
        let mut session = session_with(storage);
        let bag = session.create("container", None).unwrap();
        let err = session.hold(&bag, &bag).unwrap_err();
        assert!(matches!(err, SessionError::Inventory(InventoryError::SelfContainment(_))));
        assert!(session.entity(&bag).is_some());
    }

    #[tokio::test]
    async fn test_hold_error_keeps_entities_registered() {
        let storage = Arc::new(InMemoryEntityStorage::new());
        let mut session = session_with(storage);
        let rock = session.create("item", None).unwrap();
        let pebble = session.create("item", None).unwrap();

        let err = session.hold(&rock, &pebble).unwrap_err();

        assert!(matches!(err, SessionError::Inventory(InventoryError::NotAContainer(_))));
        assert!(session.entity(&rock).is_some());
        assert!(session.entity(&pebble).is_some());
    }
}
