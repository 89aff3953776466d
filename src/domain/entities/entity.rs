//! Entity - the dynamic-composition unit of world state
//!
//! An entity carries identity and versioning, a property map, and one opaque
//! field-set per scope that has been materialized on it. The set of scopes it
//! may carry is fixed at construction from its category.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::scope_guard::{ReleaseMode, ScopeGuard};
use super::scope_registry::ScopeRegistry;
use super::scopes::Scope;
use crate::domain::value_objects::{EntityKey, Gid, Property, PropertyMap, ScopeKind};

/// Errors raised while building or restoring entities
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EntityError {
    #[error("Unknown entity category: {0}")]
    UnknownCategory(String),

    #[error("Scope {kind} is not applicable to {category} entities")]
    ScopeNotApplicable { kind: ScopeKind, category: String },
}

/// Everything needed to rebuild an entity from its stored form
#[derive(Debug, Clone)]
pub struct EntityParts {
    pub key: EntityKey,
    pub gid: Option<Gid>,
    pub version: u64,
    pub destroyed: bool,
    pub category: String,
    pub creator: Option<EntityKey>,
    pub fields: BTreeMap<ScopeKind, Value>,
    pub props: PropertyMap,
}

#[derive(Debug, Clone)]
pub struct Entity {
    key: EntityKey,
    gid: Option<Gid>,
    version: u64,
    destroyed: bool,
    category: String,
    /// Relation only; the creator is looked up by key, never owned
    creator: Option<EntityKey>,
    scope_kinds: Arc<[ScopeKind]>,
    fields: BTreeMap<ScopeKind, Value>,
    props: PropertyMap,
    dirty: bool,
    loaded_at: DateTime<Utc>,
}

impl Entity {
    /// Create a never-persisted entity of the given category
    pub fn new(registry: &ScopeRegistry, category: &str) -> Result<Self, EntityError> {
        let scope_kinds = registry
            .scopes_for(category)
            .ok_or_else(|| EntityError::UnknownCategory(category.to_string()))?;

        Ok(Self {
            key: EntityKey::new(),
            gid: None,
            version: 0,
            destroyed: false,
            category: category.to_string(),
            creator: None,
            scope_kinds,
            fields: BTreeMap::new(),
            props: PropertyMap::new(),
            dirty: true,
            loaded_at: Utc::now(),
        })
    }

    pub fn with_creator(mut self, creator: &EntityKey) -> Self {
        self.creator = Some(creator.clone());
        self
    }

    /// Rebuild an entity from stored parts. The result is clean, and its
    /// `loaded_at` timestamp is refreshed.
    pub fn restore(registry: &ScopeRegistry, parts: EntityParts) -> Result<Self, EntityError> {
        let scope_kinds = registry
            .scopes_for(&parts.category)
            .ok_or_else(|| EntityError::UnknownCategory(parts.category.clone()))?;

        if let Some(kind) = parts.fields.keys().find(|k| !scope_kinds.contains(k)) {
            return Err(EntityError::ScopeNotApplicable {
                kind: *kind,
                category: parts.category,
            });
        }

        Ok(Self {
            key: parts.key,
            gid: parts.gid,
            version: parts.version,
            destroyed: parts.destroyed,
            category: parts.category,
            creator: parts.creator,
            scope_kinds,
            fields: parts.fields,
            props: parts.props,
            dirty: false,
            loaded_at: Utc::now(),
        })
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn gid(&self) -> Option<Gid> {
        self.gid
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn creator(&self) -> Option<&EntityKey> {
        self.creator.as_ref()
    }

    pub fn scope_kinds(&self) -> &[ScopeKind] {
        &self.scope_kinds
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn props(&self) -> &PropertyMap {
        &self.props
    }

    /// Stored field-set of a materialized scope
    pub fn field_set(&self, kind: ScopeKind) -> Option<&Value> {
        self.fields.get(&kind)
    }

    pub fn field_sets(&self) -> impl Iterator<Item = (ScopeKind, &Value)> {
        self.fields.iter().map(|(kind, value)| (*kind, value))
    }

    pub fn is_applicable<S: Scope>(&self) -> bool {
        self.is_kind_applicable(S::KIND)
    }

    pub fn is_kind_applicable(&self, kind: ScopeKind) -> bool {
        self.scope_kinds.contains(&kind)
    }

    /// Whether the scope has ever been materialized and stored
    pub fn has<S: Scope>(&self) -> bool {
        self.has_kind(S::KIND)
    }

    pub fn has_kind(&self, kind: ScopeKind) -> bool {
        self.fields.contains_key(&kind)
    }

    /// Materialize `S` for mutation. Changes are staged and the entity is
    /// marked dirty when the guard is dropped.
    ///
    /// `None` when `S` is not in this entity's scope list.
    pub fn make<S: Scope>(&mut self) -> Option<ScopeGuard<'_, S>> {
        ScopeGuard::acquire(self, ReleaseMode::Persist)
    }

    /// Materialize `S` for inspection. Nothing is ever written back, so a
    /// scope that did not exist is not created.
    pub fn make_and_discard<S: Scope>(&mut self) -> Option<ScopeGuard<'_, S>> {
        ScopeGuard::acquire(self, ReleaseMode::Discard)
    }

    /// Copy of the current scope value, or the default when absent or not
    /// applicable.
    pub fn read<S: Scope>(&self) -> S {
        self.materialize::<S>().flatten().unwrap_or_default()
    }

    /// Mark the entity as having unsaved changes
    pub fn touch(&mut self) {
        self.dirty = true;
    }

    /// Tombstone the entity; the delete goes out with the next save
    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.dirty = true;
    }

    pub fn set_prop(&mut self, name: impl Into<String>, property: Property) {
        self.props.insert(name, property);
        self.dirty = true;
    }

    pub fn remove_prop(&mut self, name: &str) -> Option<Property> {
        let removed = self.props.remove(name);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn merge_props(&mut self, incoming: &PropertyMap) {
        if incoming.is_empty() {
            return;
        }
        self.props.merge(incoming);
        self.dirty = true;
    }

    /// Adopt the version and gid storage assigned on a successful write
    pub fn mark_persisted(&mut self, version: u64, gid: Option<Gid>) {
        self.version = version;
        if gid.is_some() {
            self.gid = gid;
        }
        self.dirty = false;
    }

    /// `None`: not applicable (or the stored field-set is unreadable).
    /// `Some(None)`: applicable but never materialized.
    pub(super) fn materialize<S: Scope>(&self) -> Option<Option<S>> {
        if !self.is_applicable::<S>() {
            return None;
        }
        match self.fields.get(&S::KIND) {
            None => Some(None),
            Some(stored) => match serde_json::from_value::<S>(stored.clone()) {
                Ok(value) => Some(Some(value)),
                Err(e) => {
                    tracing::error!(
                        key = %self.key,
                        scope = %S::KIND,
                        error = %e,
                        "Stored scope field-set is unreadable"
                    );
                    None
                }
            },
        }
    }

    pub(super) fn stage_scope<S: Scope>(&mut self, value: &S) {
        match serde_json::to_value(value) {
            Ok(fields) => {
                tracing::trace!(key = %self.key, scope = %S::KIND, "Scope changed");
                self.fields.insert(S::KIND, fields);
                self.dirty = true;
            }
            Err(e) => {
                tracing::error!(
                    key = %self.key,
                    scope = %S::KIND,
                    error = %e,
                    "Failed to serialize scope; change dropped"
                );
            }
        }
    }
}
