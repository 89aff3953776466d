//! Value objects - Immutable types without identity

mod ids;
mod property;
mod scope_kind;

pub use ids::{EntityKey, Gid};
pub use property::{MergeStrategy, Property, PropertyMap};
pub use scope_kind::ScopeKind;
