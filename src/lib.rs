//! WrldBldr Worldstore - persistent world model for text-adventure worlds
//!
//! - Entities composed of typed scopes, edited through scoped guards
//! - A JSON document codec with version stamps and gids
//! - Versioned SQLite, in-memory and remote HTTP storage
//! - All / Priority / Split combinators over any storage

pub mod application;
pub mod domain;
pub mod infrastructure;
