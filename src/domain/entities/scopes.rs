//! Scope types - typed field bundles attached to an entity
//!
//! Each struct is tagged with its [`ScopeKind`] through the [`Scope`] trait.
//! Entities store scopes as opaque field-sets keyed by that tag, so a new
//! scope is a new tag plus a struct here; `Entity` itself never changes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{EntityKey, ScopeKind};

/// A component type that can be materialized on an entity
pub trait Scope:
    Serialize + DeserializeOwned + Default + Clone + PartialEq + Send + Sync + 'static
{
    const KIND: ScopeKind;
}

/// Name and description shown to players
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Describable {
    pub name: String,
    pub description: String,
    pub aliases: Vec<String>,
}

impl Scope for Describable {
    const KIND: ScopeKind = ScopeKind::Describable;
}

/// Where an entity currently is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Located {
    pub location: Option<EntityKey>,
}

impl Scope for Located {
    const KIND: ScopeKind = ScopeKind::Located;
}

/// Holds other entities, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    pub contents: Vec<EntityKey>,
    /// Maximum number of distinct entries; `None` is unbounded
    pub capacity: Option<usize>,
}

impl Container {
    pub fn is_full(&self) -> bool {
        self.capacity
            .map(|cap| self.contents.len() >= cap)
            .unwrap_or(false)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.contents.contains(key)
    }
}

impl Scope for Container {
    const KIND: ScopeKind = ScopeKind::Container;
}

/// Interchangeable items of the same kind collapse into one stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stackable {
    pub kind: String,
    pub quantity: u32,
}

impl Default for Stackable {
    fn default() -> Self {
        Self {
            kind: String::new(),
            quantity: 1,
        }
    }
}

impl Scope for Stackable {
    const KIND: ScopeKind = ScopeKind::Stackable;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Carryable {
    pub weight: f64,
}

impl Scope for Carryable {
    const KIND: ScopeKind = ScopeKind::Carryable;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vitals {
    pub health: i32,
    pub max_health: i32,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            health: 10,
            max_health: 10,
        }
    }
}

impl Vitals {
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Apply damage, clamped at zero
    pub fn damage(&mut self, amount: i32) {
        self.health = self.health.saturating_sub(amount).max(0);
    }

    /// Restore health, clamped at `max_health`
    pub fn heal(&mut self, amount: i32) {
        self.health = self.health.saturating_add(amount).min(self.max_health);
    }
}

impl Scope for Vitals {
    const KIND: ScopeKind = ScopeKind::Vitals;
}
