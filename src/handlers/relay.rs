//! Telephony media-stream WebSocket endpoint.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::AppState;

/// Maximum WebSocket message size (1 MB). Media frames are small; anything
/// larger is not a telephony event.
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Query parameters of the relay endpoint. The session identifier is minted
/// by the voice webhook and embedded in the stream URL.
#[derive(Debug, Deserialize)]
pub struct RelayParams {
    #[serde(default)]
    pub session: Option<String>,
}

/// GET /relay - WebSocket upgrade for the provider media stream.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<RelayParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!(session = ?params.session, "Media stream connection upgrade requested");

    ws.max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            let Some(session_id) = params.session.filter(|s| !s.is_empty()) else {
                warn!("Media stream connection without a session parameter, dropping");
                return;
            };
            state.supervisor.attach(session_id, socket).await;
        })
}
