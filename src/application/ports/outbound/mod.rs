//! Outbound ports - Interfaces that the application requires from external systems

mod entity_storage_port;

pub use entity_storage_port::{Document, DocumentBatch, EntityStorage, StorageError, StoredRecord};
