//! Domain layer - World model with no storage or transport concerns
//!
//! This layer contains:
//! - Entities: the dynamic-composition unit and its scope protocol
//! - Value Objects: identifiers, scope kinds, properties
//! - Domain Services: operations spanning several entities

pub mod entities;
pub mod services;
pub mod value_objects;
