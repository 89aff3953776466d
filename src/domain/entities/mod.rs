//! Domain entities - Identity-bearing world state and its scopes

mod entity;
mod scope_guard;
mod scope_registry;
mod scopes;

pub use entity::{Entity, EntityError, EntityParts};
pub use scope_guard::{ReleaseMode, ScopeGuard};
pub use scope_registry::ScopeRegistry;
pub use scopes::{Carryable, Container, Describable, Located, Scope, Stackable, Vitals};
