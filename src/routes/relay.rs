//! Relay WebSocket route configuration.
//!
//! # Endpoint
//!
//! `GET /relay?session=<id>` - WebSocket upgrade for the telephony provider's
//! media stream. The session identifier is minted by the voice webhook and
//! embedded in the stream URL it returns.
//!
//! # Protocol
//!
//! After the upgrade the provider sends JSON text events (`start`, `media`,
//! `dtmf`, `mark`, `stop`) and receives playback `media` frames, `mark`
//! checkpoints, and `clear` flushes.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router.
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/relay", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
