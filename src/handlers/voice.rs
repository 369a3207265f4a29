//! Call-setup webhook.
//!
//! The telephony provider posts here when a call arrives. The response is
//! call-control markup instructing the provider to open a media-streaming
//! WebSocket to the relay endpoint, with a freshly minted session identifier
//! embedded as a connection parameter.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use tracing::info;
use uuid::Uuid;

use crate::state::AppState;

/// POST /voice - answer a call-setup webhook with stream markup.
pub async fn voice_handler(State(state): State<Arc<AppState>>) -> Response {
    let session_id = Uuid::new_v4().to_string();
    let stream_url = state.config.relay_ws_url(&session_id);
    info!(session_id = %session_id, "Voice webhook answered, directing media stream to relay");

    let markup = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{stream_url}" />
  </Connect>
</Response>"#
    );

    ([(CONTENT_TYPE, "text/xml")], markup).into_response()
}
