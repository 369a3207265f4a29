//! Session supervision: one registry entry per active call.
//!
//! The supervisor accepts a new telephony connection, opens the AI link,
//! wires both links to a fresh [`Session`], and tears everything down when
//! the session reaches its terminal state. Closing one link always closes
//! the other; the links of a session are never shared with another session.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::session::{Session, SessionEvent, SessionOptions};
use crate::config::ServerConfig;
use crate::core::ai::{AiAudioFormat, AiLinkConfig, AiModel, AiRealtimeLink, AiVoice, ToolDef};
use crate::core::telephony::TelephonyLink;
use crate::core::tools::{ToolDispatcher, ToolRegistry};

/// Capacity of each session's event channel.
const SESSION_EVENT_CAPACITY: usize = 256;

/// Bound on waiting for sessions to drain at process shutdown.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
}

/// Creates, tracks, and tears down call sessions.
pub struct SessionSupervisor {
    config: Arc<ServerConfig>,
    tools: Arc<ToolRegistry>,
    active: DashMap<String, SessionHandle>,
}

impl SessionSupervisor {
    pub fn new(config: Arc<ServerConfig>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            tools,
            active: DashMap::new(),
        }
    }

    /// Number of currently active sessions.
    pub fn active_sessions(&self) -> usize {
        self.active.len()
    }

    /// Run one call to completion on the given telephony socket.
    ///
    /// The session identifier comes from the connection's handshake
    /// parameters; a duplicate identifier is rejected so each id maps to
    /// exactly one live session.
    pub async fn attach(&self, session_id: String, mut socket: WebSocket) {
        let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(SESSION_EVENT_CAPACITY);

        // Register before wiring anything so a concurrent duplicate cannot
        // race past the check. The entry guard must not be held across an
        // await, so the rejection send happens after the match.
        let duplicate = match self.active.entry(session_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => true,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(SessionHandle {
                    events: events_tx.clone(),
                });
                false
            }
        };
        if duplicate {
            warn!(session_id = %session_id, "Duplicate session identifier, rejecting connection");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }

        info!(session_id = %session_id, "Telephony connection accepted");
        let (telephony, telephony_tx) =
            TelephonyLink::spawn(session_id.clone(), socket, events_tx.clone());

        let ai_config = self.ai_link_config();
        let (ai, ai_tx) =
            match AiRealtimeLink::connect(session_id.clone(), ai_config, events_tx.clone()).await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(session_id = %session_id, "Failed to open AI link: {e}");
                    telephony.close();
                    self.active.remove(&session_id);
                    return;
                }
            };

        let options = SessionOptions {
            config_ack_timeout: self.config.config_ack_timeout,
            audio_queue_frames: self.config.audio_queue_frames,
        };
        let dispatcher = ToolDispatcher::new(self.tools.clone(), self.config.tool_timeout);
        let session = Session::new(session_id.clone(), options, telephony_tx, ai_tx, dispatcher);

        let summary = session.run(events_rx).await;

        telephony.close();
        ai.close();
        self.active.remove(&session_id);
        info!(
            session_id = %session_id,
            state = %summary.state,
            transcript_turns = summary.transcript.len(),
            interruptions = summary.interruptions,
            "Session released"
        );
    }

    /// Drive every active session through teardown, bounded by a drain
    /// timeout. Called once at process shutdown.
    pub async fn shutdown(&self) {
        let senders: Vec<_> = self
            .active
            .iter()
            .map(|entry| entry.value().events.clone())
            .collect();
        if senders.is_empty() {
            return;
        }
        info!(sessions = senders.len(), "Shutting down active sessions");
        for events in senders {
            let _ = events.send(SessionEvent::Shutdown).await;
        }

        let deadline = Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while self.active_sessions() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if self.active_sessions() > 0 {
            warn!(
                remaining = self.active_sessions(),
                "Shutdown drain timed out with sessions still active"
            );
        }
    }

    /// Build the AI link configuration from process config and the tool
    /// registry's declared schemas.
    fn ai_link_config(&self) -> AiLinkConfig {
        let tools = self
            .tools
            .schemas()
            .into_iter()
            .map(|schema| ToolDef {
                tool_type: "function".to_string(),
                name: schema.name,
                description: Some(schema.description),
                parameters: Some(schema.parameters),
            })
            .collect();

        AiLinkConfig {
            api_key: self.config.openai_api_key.clone().unwrap_or_default(),
            endpoint: self.config.ai_endpoint.clone(),
            model: AiModel::from_str_or_default(&self.config.model),
            voice: AiVoice::from_str_or_default(&self.config.voice),
            audio_format: AiAudioFormat::G711Ulaw,
            instructions: self.config.system_prompt.clone(),
            tools,
        }
    }
}
