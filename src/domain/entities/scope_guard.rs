//! Scoped acquisition of an entity's scope
//!
//! A [`ScopeGuard`] is the only way to mutate a scope. It derefs to the typed
//! scope value and, when dropped, compares the value against the state it was
//! materialized from. Drop runs on every exit path (early return, `?`,
//! unwinding), so dirty tracking cannot be skipped.
//!
//! Nested acquisitions go through an open guard ([`ScopeGuard::make`]). If the
//! requested scope is already held anywhere up the chain, the nested guard
//! borrows that same instance instead of materializing a second copy.

use std::any::Any;
use std::ops::{Deref, DerefMut};

use super::entity::Entity;
use super::scopes::Scope;

/// What a guard does with its value when released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Store changed state on the entity and mark it dirty
    Persist,
    /// Drop the value; the entity is never touched
    Discard,
}

enum Slot<'a, S> {
    Owned { value: S, before: Option<S> },
    Shared(&'a mut S),
}

/// Live handle to one materialized scope
pub struct ScopeGuard<'a, S: Scope> {
    entity: &'a mut Entity,
    slot: Slot<'a, S>,
    /// Instances held by enclosing guards on the same entity
    outer: Vec<&'a mut (dyn Any + 'static)>,
    mode: ReleaseMode,
}

impl<'a, S: Scope> ScopeGuard<'a, S> {
    pub(super) fn acquire(entity: &'a mut Entity, mode: ReleaseMode) -> Option<Self> {
        Self::acquire_within(entity, Vec::new(), mode)
    }

    fn acquire_within(
        entity: &'a mut Entity,
        outer: Vec<&'a mut (dyn Any + 'static)>,
        mode: ReleaseMode,
    ) -> Option<Self> {
        let before = entity.materialize::<S>()?;
        let value = before.clone().unwrap_or_default();
        Some(Self {
            entity,
            slot: Slot::Owned { value, before },
            outer,
            mode,
        })
    }

    pub fn mode(&self) -> ReleaseMode {
        self.mode
    }

    /// Key of the entity this scope belongs to
    pub fn owner(&self) -> &crate::domain::value_objects::EntityKey {
        self.entity.key()
    }

    /// Acquire another scope of the same entity while this one is open.
    ///
    /// Returns a guard over the already-open instance when `U` is held by this
    /// guard or any enclosing one; otherwise materializes `U` with this
    /// guard's release mode. `None` when `U` is not applicable.
    pub fn make<U: Scope>(&mut self) -> Option<ScopeGuard<'_, U>> {
        let mode = self.mode;
        let mut chain: Vec<&mut (dyn Any + 'static)> = self
            .outer
            .iter_mut()
            .map(|held| &mut **held)
            .collect();
        let own: &mut (dyn Any + 'static) = match &mut self.slot {
            Slot::Owned { value, .. } => value,
            Slot::Shared(value) => &mut **value,
        };
        chain.push(own);

        if let Some(pos) = chain.iter().position(|held| (**held).is::<U>()) {
            let held = chain.swap_remove(pos);
            let shared = held.downcast_mut::<U>()?;
            return Some(ScopeGuard {
                entity: &mut *self.entity,
                slot: Slot::Shared(shared),
                outer: chain,
                mode,
            });
        }

        ScopeGuard::acquire_within(&mut *self.entity, chain, mode)
    }
}

impl<S: Scope> Deref for ScopeGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        match &self.slot {
            Slot::Owned { value, .. } => value,
            Slot::Shared(value) => value,
        }
    }
}

impl<S: Scope> DerefMut for ScopeGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        match &mut self.slot {
            Slot::Owned { value, .. } => value,
            Slot::Shared(value) => value,
        }
    }
}

impl<S: Scope> Drop for ScopeGuard<'_, S> {
    fn drop(&mut self) {
        // Shared slots are released by the guard that owns the instance.
        if let Slot::Owned { value, before } = &self.slot {
            if self.mode == ReleaseMode::Persist && before.as_ref() != Some(value) {
                self.entity.stage_scope(value);
            }
        }
    }
}

impl<S: Scope + std::fmt::Debug> std::fmt::Debug for ScopeGuard<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("kind", &S::KIND)
            .field("mode", &self.mode)
            .field("value", &**self)
            .finish()
    }
}
