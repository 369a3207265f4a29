//! AI realtime link: owns the outbound service WebSocket for one call.
//!
//! A single pump task multiplexes both directions with `select!`: outbound
//! client events are drained from a command channel and inbound server events
//! are parsed into the session's event channel. Malformed inbound frames are
//! logged and skipped.
//!
//! On connect the link transmits a `session.update` carrying the system
//! prompt and tool schema before any audio is forwarded. Audio appended
//! before the service acknowledges the configuration is buffered inside the
//! pump task and flushed, in order, once `session.updated` arrives.

use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, info, warn};

use super::config::{AiAudioFormat, AiModel, AiVoice, OPENAI_REALTIME_URL};
use super::messages::{ClientEvent, ServerEvent, SessionConfig, ToolDef, TurnDetection};
use crate::core::session::SessionEvent;
use crate::errors::{RelayError, RelayResult};

/// Channel capacity for outbound client events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for one AI realtime connection.
#[derive(Debug, Clone)]
pub struct AiLinkConfig {
    /// API key for authentication
    pub api_key: String,
    /// Override of the service endpoint, used by tests; defaults to
    /// [`OPENAI_REALTIME_URL`]
    pub endpoint: Option<String>,
    /// Model to use
    pub model: AiModel,
    /// Voice for synthesized audio
    pub voice: AiVoice,
    /// Audio format for both directions
    pub audio_format: AiAudioFormat,
    /// System instructions for the assistant
    pub instructions: String,
    /// Tools advertised to the model
    pub tools: Vec<ToolDef>,
}

impl AiLinkConfig {
    fn ws_url(&self) -> String {
        let endpoint = self.endpoint.as_deref().unwrap_or(OPENAI_REALTIME_URL);
        format!("{}?model={}", endpoint, self.model.as_str())
    }

    /// Build the initial session configuration.
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: Some(self.instructions.clone()),
            voice: Some(self.voice.as_str().to_string()),
            input_audio_format: Some(self.audio_format.as_str().to_string()),
            output_audio_format: Some(self.audio_format.as_str().to_string()),
            turn_detection: Some(TurnDetection::default()),
            tools: if self.tools.is_empty() {
                None
            } else {
                Some(self.tools.clone())
            },
            tool_choice: if self.tools.is_empty() {
                None
            } else {
                Some("auto".to_string())
            },
        }
    }
}

/// Owns the pump task for one AI realtime connection.
///
/// Dropping the event sender returned by [`AiRealtimeLink::connect`] makes the
/// pump send a close frame; the service's close in turn produces
/// [`SessionEvent::AiClosed`]. [`AiRealtimeLink::close`] is idempotent.
pub struct AiRealtimeLink {
    task: JoinHandle<()>,
}

impl AiRealtimeLink {
    /// Connect to the realtime service, send the session configuration, and
    /// spawn the pump task.
    ///
    /// Returns the link handle and the client-event sender the session writes
    /// audio appends, cancels, and tool results into.
    pub async fn connect(
        session_id: String,
        config: AiLinkConfig,
        events: mpsc::Sender<SessionEvent>,
    ) -> RelayResult<(Self, mpsc::Sender<ClientEvent>)> {
        if config.api_key.is_empty() {
            return Err(RelayError::LinkFailure(
                "AI service API key is not configured".to_string(),
            ));
        }

        let url = config.ws_url();
        let mut request = url
            .into_client_request()
            .map_err(|e| RelayError::LinkFailure(format!("invalid realtime URL: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| RelayError::LinkFailure(format!("invalid API key header: {e}")))?;
        request.headers_mut().insert("Authorization", auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| RelayError::LinkFailure(format!("realtime connect failed: {e}")))?;

        info!(session_id = %session_id, model = %config.model, "Connected to AI realtime service");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (event_tx, mut event_rx) = mpsc::channel::<ClientEvent>(EVENT_CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            // Audio appended before the configuration acknowledgement is held
            // here and flushed in order once `session.updated` arrives.
            let mut configured = false;
            let mut pending_audio: Vec<ClientEvent> = Vec::new();
            let mut outgoing_open = true;

            loop {
                tokio::select! {
                    maybe_event = event_rx.recv(), if outgoing_open => {
                        match maybe_event {
                            Some(event) => {
                                if !configured
                                    && matches!(event, ClientEvent::InputAudioBufferAppend { .. })
                                {
                                    pending_audio.push(event);
                                    continue;
                                }
                                if !send_client_event(&mut ws_sink, &session_id, &event).await {
                                    break;
                                }
                            }
                            None => {
                                // The session dropped its sender: close our half.
                                outgoing_open = false;
                                let _ = ws_sink.send(Message::Close(None)).await;
                            }
                        }
                    }

                    maybe_msg = ws_stream.next() => {
                        match maybe_msg {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerEvent>(&text) {
                                    Ok(event) => {
                                        if !configured
                                            && matches!(event, ServerEvent::SessionUpdated { .. })
                                        {
                                            configured = true;
                                            for buffered in pending_audio.drain(..) {
                                                if !send_client_event(
                                                    &mut ws_sink,
                                                    &session_id,
                                                    &buffered,
                                                )
                                                .await
                                                {
                                                    break;
                                                }
                                            }
                                            debug!(session_id = %session_id, "AI session configuration acknowledged");
                                        }
                                        if events.send(SessionEvent::Ai(event)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        warn!(session_id = %session_id, "Skipping malformed AI event: {e}");
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) => {
                                info!(session_id = %session_id, "AI realtime connection closed by service");
                                let _ = events.send(SessionEvent::AiClosed).await;
                                break;
                            }
                            Some(Ok(Message::Ping(data))) => {
                                let _ = ws_sink.send(Message::Pong(data)).await;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                let _ = events.send(SessionEvent::AiFailed(e.to_string())).await;
                                break;
                            }
                            None => {
                                let _ = events.send(SessionEvent::AiClosed).await;
                                break;
                            }
                        }
                    }
                }
            }
            debug!("AI realtime pump ended");
        });

        let link = Self { task };

        // Configuration precedes any audio; appends are buffered until the
        // service acknowledges it.
        let session_update = ClientEvent::SessionUpdate {
            session: config.session_config(),
        };
        event_tx
            .send(session_update)
            .await
            .map_err(|_| RelayError::LinkFailure("AI link closed before configuration".into()))?;

        Ok((link, event_tx))
    }

    /// Abort the pump task if it is still running. Safe to call more than once.
    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for AiRealtimeLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Serialize and send one client event; returns false when the socket is gone.
async fn send_client_event<S>(ws_sink: &mut S, session_id: &str, event: &ClientEvent) -> bool
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(session_id = %session_id, "Failed to serialize client event: {e}");
            return true;
        }
    };
    if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
        warn!(session_id = %session_id, "Failed to send AI event: {e}");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AiLinkConfig {
        AiLinkConfig {
            api_key: "test-key".to_string(),
            endpoint: None,
            model: AiModel::default(),
            voice: AiVoice::default(),
            audio_format: AiAudioFormat::default(),
            instructions: "Be helpful".to_string(),
            tools: vec![],
        }
    }

    #[test]
    fn test_ws_url_default_endpoint() {
        let url = test_config().ws_url();
        assert!(url.starts_with(OPENAI_REALTIME_URL));
        assert!(url.contains("model=gpt-4o-realtime-preview"));
    }

    #[test]
    fn test_ws_url_override() {
        let config = AiLinkConfig {
            endpoint: Some("ws://127.0.0.1:9999/realtime".to_string()),
            ..test_config()
        };
        assert!(config.ws_url().starts_with("ws://127.0.0.1:9999/realtime"));
    }

    #[test]
    fn test_session_config_formats() {
        let session = test_config().session_config();
        assert_eq!(session.input_audio_format.as_deref(), Some("g711_ulaw"));
        assert_eq!(session.output_audio_format.as_deref(), Some("g711_ulaw"));
        assert!(session.tools.is_none());
        assert!(session.tool_choice.is_none());
    }

    #[test]
    fn test_session_config_advertises_tools() {
        let config = AiLinkConfig {
            tools: vec![ToolDef {
                tool_type: "function".to_string(),
                name: "lookup_account".to_string(),
                description: Some("Look up an account".to_string()),
                parameters: None,
            }],
            ..test_config()
        };
        let session = config.session_config();
        assert_eq!(session.tools.as_ref().unwrap().len(), 1);
        assert_eq!(session.tool_choice.as_deref(), Some("auto"));
    }

    #[tokio::test]
    async fn test_connect_requires_api_key() {
        let config = AiLinkConfig {
            api_key: String::new(),
            ..test_config()
        };
        let (events, _rx) = mpsc::channel(8);
        let result = AiRealtimeLink::connect("s1".to_string(), config, events).await;
        assert!(matches!(result, Err(RelayError::LinkFailure(_))));
    }
}
