//! Data Transfer Objects - For storage and API boundaries
//!
//! DTOs live in the application layer so infrastructure (storage, HTTP) can
//! serialize/deserialize without pulling wire concerns into the domain model.

pub mod entity_document;
pub mod storage_wire;

pub use entity_document::{
    decode, encode, CodecError, DocumentHeader, EntityDocument, VersionStamp, RESERVED_FIELDS,
};
pub use storage_wire::{CountResponse, EntityQuery, StorageErrorBody};
