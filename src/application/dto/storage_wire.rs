//! Wire types for the storage HTTP API, shared by server routes and the
//! remote storage client

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{EntityKey, Gid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Selects records by key or by gid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<EntityKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<Gid>,
}

/// Error payload returned by the storage API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<EntityKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<u64>,
}
