//! Application services - Use case implementations
//!
//! The world session is the unit of work that materializes entities from
//! storage, runs mutations, and flushes dirty entities back as one batch.

pub mod world_session;

pub use world_session::{SessionError, WorldSession};
