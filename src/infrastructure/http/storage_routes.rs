//! Storage API routes
//!
//! Exposes the configured storage stack so other processes can use it through
//! `HttpEntityStorage`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::{CountResponse, EntityQuery, StorageErrorBody};
use crate::application::ports::outbound::{DocumentBatch, StorageError, StoredRecord};
use crate::domain::value_objects::EntityKey;
use crate::infrastructure::state::AppState;

type ApiError = (StatusCode, Json<StorageErrorBody>);

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(StorageErrorBody {
            error: message.to_string(),
            key: None,
            observed: None,
        }),
    )
}

fn api_error(e: StorageError) -> ApiError {
    let status = match &e {
        StorageError::Conflict { .. } => StatusCode::CONFLICT,
        StorageError::MalformedDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StorageError::ReadOnly(_) => StatusCode::FORBIDDEN,
        StorageError::NoBackends => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Storage request failed: {}", e);
    }

    let (key, observed) = match &e {
        StorageError::Conflict { key, observed } => (Some(key.clone()), Some(*observed)),
        _ => (None, None),
    };
    (
        status,
        Json(StorageErrorBody {
            error: e.to_string(),
            key,
            observed,
        }),
    )
}

/// Number of stored entities
pub async fn count(State(state): State<Arc<AppState>>) -> Result<Json<CountResponse>, ApiError> {
    let count = state.storage.count().await.map_err(api_error)?;
    Ok(Json(CountResponse { count }))
}

/// Apply a batch of diffs atomically
pub async fn update(
    State(state): State<Arc<AppState>>,
    Json(diffs): Json<DocumentBatch>,
) -> Result<Json<DocumentBatch>, ApiError> {
    tracing::debug!(entities = diffs.len(), "Storage update requested");
    let written = state.storage.update(diffs).await.map_err(api_error)?;
    Ok(Json(written))
}

/// Look up records by exactly one of `key` or `gid`
pub async fn entities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntityQuery>,
) -> Result<Json<Vec<StoredRecord>>, ApiError> {
    let records = match (query.key, query.gid) {
        (Some(key), None) => state.storage.load_by_key(&key).await,
        (None, Some(gid)) => state.storage.load_by_gid(gid).await,
        _ => return Err(bad_request("Exactly one of key or gid is required")),
    }
    .map_err(api_error)?;
    Ok(Json(records))
}

/// Every stored entity key
pub async fn keys(State(state): State<Arc<AppState>>) -> Result<Json<Vec<EntityKey>>, ApiError> {
    let keys = state.storage.load_all_keys().await.map_err(api_error)?;
    Ok(Json(keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::outbound::EntityStorage;
    use crate::infrastructure::config::{AppConfig, StorageConfig};
    use crate::infrastructure::http::create_routes;
    use crate::infrastructure::persistence::{HttpEntityStorage, InMemoryEntityStorage};
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let config = AppConfig {
            server_port: 0,
            storage: StorageConfig {
                read_urls: vec![],
                write_urls: vec![],
            },
        };
        let state = AppState::with_storage(config, Arc::new(InMemoryEntityStorage::new()));
        create_routes().with_state(Arc::new(state))
    }

    fn batch(key: &str, version: u64) -> Value {
        json!({ key: {"key": key, "version": {"i": version}, "gid": null, "props": {}} })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn post_update(body: &Value) -> Request<Body> {
        Request::post("/storage/update")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_update_then_lookup() {
        let app = app();

        let (status, written) = send(&app, post_update(&batch("k1", 0))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(written["k1"]["version"], json!({"i": 1}));

        let (status, records) = send(
            &app,
            Request::get("/storage/entities?key=k1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(records[0]["version"], json!(1));

        let (_, by_gid) = send(
            &app,
            Request::get("/storage/entities?gid=1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(by_gid[0]["key"], json!("k1"));

        let (_, count) = send(&app, Request::get("/storage/count").body(Body::empty()).unwrap()).await;
        assert_eq!(count, json!({"count": 1}));

        let (_, keys) = send(&app, Request::get("/storage/keys").body(Body::empty()).unwrap()).await;
        assert_eq!(keys, json!(["k1"]));
    }

    #[tokio::test]
    async fn test_stale_update_is_conflict() {
        let app = app();
        send(&app, post_update(&batch("k1", 0))).await;

        let (status, body) = send(&app, post_update(&batch("k1", 0))).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["key"], json!("k1"));
        assert_eq!(body["observed"], json!(0));
    }

    #[tokio::test]
    async fn test_malformed_document_is_unprocessable() {
        let app = app();
        let (status, _) = send(&app, post_update(&json!({"k1": {"key": "k1"}}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_out_of_range_version_is_unprocessable() {
        let app = app();
        let body = json!({"k1": {"key": "k1", "version": {"i": u64::MAX}, "gid": null, "props": {}}});

        let (status, _) = send(&app, post_update(&body)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let (_, count) = send(&app, Request::get("/storage/count").body(Body::empty()).unwrap()).await;
        assert_eq!(count, json!({"count": 0}));
    }

    #[tokio::test]
    async fn test_lookup_needs_exactly_one_selector() {
        let app = app();
        let (status, _) = send(&app, Request::get("/storage/entities").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(
            &app,
            Request::get("/storage/entities?key=k1&gid=1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _) = send(&app(), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_remote_client_round_trip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app()).await.unwrap();
        });

        let remote = HttpEntityStorage::new(&format!("http://{}", addr));
        let mut diffs = DocumentBatch::new();
        diffs.insert(
            EntityKey::from("k1"),
            json!({"key": "k1", "version": {"i": 0}, "gid": null, "props": {}}),
        );

        remote.update(diffs.clone()).await.unwrap();
        assert_eq!(remote.count().await.unwrap(), 1);
        assert_eq!(remote.load_by_key(&EntityKey::from("k1")).await.unwrap().len(), 1);
        assert!(remote.load_by_key(&EntityKey::from("nope")).await.unwrap().is_empty());

        let err = remote.update(diffs).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { observed: 0, .. }));

        server.abort();
    }
}
