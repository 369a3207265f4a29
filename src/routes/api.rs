//! HTTP route configuration: index, health check, and the voice webhook.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, voice};
use crate::state::AppState;
use std::sync::Arc;

/// Create the HTTP API router.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::index))
        .route("/health", get(api::health_check))
        .route("/voice", post(voice::voice_handler))
        .layer(TraceLayer::new_for_http())
}
