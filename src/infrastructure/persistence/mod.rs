//! Entity storage adapters
//!
//! Concrete backends (SQLite, in-memory, remote HTTP), the combinators that
//! compose them, and the factory that builds a stack from configured URLs.

mod backup;
mod combinators;
mod factory;
mod http_storage;
mod memory_storage;
mod sqlite_storage;
mod write_plan;

pub use backup::{backup_once, backup_path_for, BACKUP_DIR};
pub use combinators::{AllStorage, PriorityStorage, SharedStorage, SplitStorage};
pub use factory::{BackendUrl, StorageBackend, StorageFactory};
pub use http_storage::HttpEntityStorage;
pub use memory_storage::InMemoryEntityStorage;
pub use sqlite_storage::SqliteEntityStorage;
