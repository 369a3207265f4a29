//! Index page and health check.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::Html;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::state::AppState;

/// GET / - informational status page.
pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let config = &state.config;
    let openai_status = if config.openai_api_key.is_some() {
        "configured"
    } else {
        "not configured"
    };
    let telephony_status = if config.has_telephony_credentials() {
        "configured"
    } else {
        "not configured"
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <title>convrelay</title>
  <style>
    body {{ font-family: sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }}
    .status {{ background: #f0f0f0; padding: 15px; border-radius: 5px; margin: 20px 0; }}
    code {{ background: #eee; padding: 2px 6px; border-radius: 3px; }}
  </style>
</head>
<body>
  <h1>convrelay</h1>
  <div class="status">
    <p><strong>Server:</strong> running on port {port}</p>
    <p><strong>Active sessions:</strong> {sessions}</p>
    <p><strong>AI service:</strong> {openai_status}</p>
    <p><strong>Telephony credentials:</strong> {telephony_status}</p>
  </div>
  <h2>Endpoints</h2>
  <ul>
    <li><code>POST /voice</code> - call-setup webhook for the telephony provider</li>
    <li><code>GET /relay?session=...</code> - media-stream WebSocket endpoint</li>
    <li><code>GET /health</code> - health check</li>
  </ul>
  <h2>Configure your phone number</h2>
  <p>Point the voice webhook at <code>{webhook}</code></p>
</body>
</html>"#,
        port = config.port,
        sessions = state.supervisor.active_sessions(),
        webhook = config.voice_webhook_url(),
    ))
}

/// GET /health - health check reporting the active session count.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    Json(serde_json::json!({
        "status": "healthy",
        "active_sessions": state.supervisor.active_sessions(),
        "timestamp": timestamp,
    }))
}
