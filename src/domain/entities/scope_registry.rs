//! Scope registry - which scopes each entity category may carry

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::value_objects::ScopeKind;

/// Declares, per entity category, the fixed ordered set of scope kinds
#[derive(Debug, Clone)]
pub struct ScopeRegistry {
    categories: HashMap<String, Arc<[ScopeKind]>>,
}

impl ScopeRegistry {
    /// Registry with no categories
    pub fn empty() -> Self {
        Self {
            categories: HashMap::new(),
        }
    }

    /// Declare (or redeclare) a category.
    ///
    /// Entities already built keep the list they were constructed with.
    pub fn register(&mut self, category: impl Into<String>, kinds: &[ScopeKind]) {
        let mut ordered: Vec<ScopeKind> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !ordered.contains(kind) {
                ordered.push(*kind);
            }
        }
        self.categories.insert(category.into(), ordered.into());
    }

    pub fn scopes_for(&self, category: &str) -> Option<Arc<[ScopeKind]>> {
        self.categories.get(category).cloned()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        use ScopeKind::*;

        let mut registry = Self::empty();
        registry.register("room", &[Describable, Container]);
        registry.register("item", &[Describable, Located, Stackable, Carryable]);
        registry.register("container", &[Describable, Located, Container, Carryable]);
        registry.register("creature", &[Describable, Located, Container, Vitals]);
        registry.register("player", &[Describable, Located, Container, Vitals]);
        registry
    }
}
