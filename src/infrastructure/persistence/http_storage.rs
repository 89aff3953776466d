//! Remote entity storage over HTTP
//!
//! Talks to the storage routes served by another worldstore process. Status
//! codes map back onto the storage error kinds, so a remote concurrency
//! conflict is still a conflict to the caller.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::application::dto::{CountResponse, EntityQuery, StorageErrorBody};
use crate::application::ports::outbound::{
    DocumentBatch, EntityStorage, StorageError, StoredRecord,
};
use crate::domain::value_objects::{EntityKey, Gid};

fn http_err(e: reqwest::Error) -> StorageError {
    StorageError::Http(e.to_string())
}

/// Client for a remote storage API
pub struct HttpEntityStorage {
    client: Client,
    base_url: String,
}

impl HttpEntityStorage {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn records(&self, query: &EntityQuery) -> Result<Vec<StoredRecord>, StorageError> {
        let response = self
            .client
            .get(format!("{}/storage/entities", self.base_url))
            .query(query)
            .send()
            .await
            .map_err(http_err)?;
        read_json(response).await
    }
}

/// Decode a successful response, or turn an error status into a storage error
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, StorageError> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(http_err);
    }

    let text = response.text().await.map_err(http_err)?;
    let body: Option<StorageErrorBody> = serde_json::from_str(&text).ok();
    Err(error_from_status(status, body, text))
}

fn error_from_status(
    status: StatusCode,
    body: Option<StorageErrorBody>,
    text: String,
) -> StorageError {
    match (status, body) {
        (
            StatusCode::CONFLICT,
            Some(StorageErrorBody {
                key: Some(key),
                observed: Some(observed),
                ..
            }),
        ) => StorageError::Conflict { key, observed },
        (StatusCode::UNPROCESSABLE_ENTITY, Some(body)) => {
            StorageError::MalformedDocument(body.error)
        }
        (status, body) => StorageError::Remote {
            status: status.as_u16(),
            message: body.map(|b| b.error).unwrap_or(text),
        },
    }
}

#[async_trait]
impl EntityStorage for HttpEntityStorage {
    async fn count(&self) -> Result<u64, StorageError> {
        let response = self
            .client
            .get(format!("{}/storage/count", self.base_url))
            .send()
            .await
            .map_err(http_err)?;
        let count: CountResponse = read_json(response).await?;
        Ok(count.count)
    }

    async fn update(&self, diffs: DocumentBatch) -> Result<DocumentBatch, StorageError> {
        let response = self
            .client
            .post(format!("{}/storage/update", self.base_url))
            .json(&diffs)
            .send()
            .await
            .map_err(http_err)?;
        read_json(response).await
    }

    async fn load_by_gid(&self, gid: Gid) -> Result<Vec<StoredRecord>, StorageError> {
        self.records(&EntityQuery {
            key: None,
            gid: Some(gid),
        })
        .await
    }

    async fn load_by_key(&self, key: &EntityKey) -> Result<Vec<StoredRecord>, StorageError> {
        self.records(&EntityQuery {
            key: Some(key.clone()),
            gid: None,
        })
        .await
    }

    async fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError> {
        let response = self
            .client
            .get(format!("{}/storage/keys", self.base_url))
            .send()
            .await
            .map_err(http_err)?;
        read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_status_maps_to_conflict() {
        let body = StorageErrorBody {
            error: "stale".to_string(),
            key: Some(EntityKey::from("k1")),
            observed: Some(3),
        };
        let err = error_from_status(StatusCode::CONFLICT, Some(body), String::new());
        assert!(matches!(err, StorageError::Conflict { observed: 3, .. }));
    }

    #[test]
    fn test_unprocessable_maps_to_malformed() {
        let body = StorageErrorBody {
            error: "k1: missing gid".to_string(),
            key: None,
            observed: None,
        };
        let err = error_from_status(StatusCode::UNPROCESSABLE_ENTITY, Some(body), String::new());
        assert!(matches!(err, StorageError::MalformedDocument(msg) if msg == "k1: missing gid"));
    }

    #[test]
    fn test_other_status_is_remote_error() {
        let err = error_from_status(
            StatusCode::BAD_GATEWAY,
            None,
            "upstream down".to_string(),
        );
        assert!(matches!(
            err,
            StorageError::Remote { status: 502, ref message } if message == "upstream down"
        ));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let storage = HttpEntityStorage::new("http://localhost:3000/");
        assert_eq!(storage.base_url(), "http://localhost:3000");
    }
}
