//! Telephony link: owns the provider WebSocket for one call.
//!
//! The socket is split into a writer task draining a command channel and a
//! reader task parsing inbound events into the session's event channel. A
//! malformed frame is a contained protocol error: it is logged and skipped,
//! and the link keeps processing subsequent messages.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{TelephonyCommand, TelephonyEvent};
use crate::core::session::SessionEvent;

/// Channel capacity for outbound telephony commands.
const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Owns the reader and writer tasks for one provider connection.
///
/// Dropping the command sender returned by [`TelephonyLink::spawn`] makes the
/// writer send a close frame and end; the reader then observes the peer close
/// and emits [`SessionEvent::TelephonyClosed`]. [`TelephonyLink::close`] is
/// idempotent and only force-aborts whatever is still running.
pub struct TelephonyLink {
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl TelephonyLink {
    /// Split the socket and spawn the pump tasks.
    ///
    /// Returns the link handle and the command sender the session writes
    /// playback frames, marks, and clears into.
    pub fn spawn(
        session_id: String,
        socket: WebSocket,
        events: mpsc::Sender<SessionEvent>,
    ) -> (Self, mpsc::Sender<TelephonyCommand>) {
        let (mut ws_sink, mut ws_stream) = socket.split();
        let (command_tx, mut command_rx) =
            mpsc::channel::<TelephonyCommand>(COMMAND_CHANNEL_CAPACITY);

        let writer_session = session_id.clone();
        let writer = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let json = match serde_json::to_string(&command) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(session_id = %writer_session, "Failed to serialize telephony command: {e}");
                        continue;
                    }
                };
                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                    warn!(session_id = %writer_session, "Failed to send telephony frame: {e}");
                    break;
                }
            }
            // Command channel closed: the session is done with this link.
            let _ = ws_sink.send(Message::Close(None)).await;
            debug!(session_id = %writer_session, "Telephony writer ended");
        });

        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<TelephonyEvent>(&text)
                    {
                        Ok(event) => {
                            if events.send(SessionEvent::Telephony(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(
                                session_id = %session_id,
                                "Skipping malformed telephony event: {e}"
                            );
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!(session_id = %session_id, "Telephony connection closed by provider");
                        break;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(Message::Binary(_)) => {
                        warn!(session_id = %session_id, "Skipping unexpected binary telephony frame");
                    }
                    Err(e) => {
                        let _ = events
                            .send(SessionEvent::TelephonyFailed(e.to_string()))
                            .await;
                        return;
                    }
                }
            }
            let _ = events.send(SessionEvent::TelephonyClosed).await;
        });

        (Self { writer, reader }, command_tx)
    }

    /// Abort any still-running pump task. Safe to call more than once.
    pub fn close(&self) {
        self.writer.abort();
        self.reader.abort();
    }
}

impl Drop for TelephonyLink {
    fn drop(&mut self) {
        self.close();
    }
}
