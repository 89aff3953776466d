//! HTTP REST API routes

mod storage_routes;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::infrastructure::state::AppState;

pub use storage_routes::*;

/// Create all API routes
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/storage/count", get(storage_routes::count))
        .route("/storage/update", post(storage_routes::update))
        .route("/storage/entities", get(storage_routes::entities))
        .route("/storage/keys", get(storage_routes::keys))
}

async fn health_check() -> &'static str {
    "OK"
}
