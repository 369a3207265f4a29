//! Barge-in handling.
//!
//! Triggered exclusively when caller speech begins while AI audio is in
//! flight. The ordering matters for avoiding audible overlap: queued frames
//! are dropped before the upstream generation is told to stop, so no
//! additional frames can land behind the flush sent to the telephony side.

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::relay::AudioRelay;
use crate::core::ai::ClientEvent;
use crate::core::telephony::TelephonyCommand;

/// The AI turn currently being played toward the caller.
#[derive(Debug, Clone)]
pub(crate) struct PlayingTurn {
    pub response_id: String,
    pub item_id: String,
    /// Milliseconds of this item already forwarded to the telephony side
    pub played_ms: u64,
}

/// Truncates and flushes in-flight AI audio when the caller barges in.
#[derive(Debug, Default)]
pub struct InterruptionController {
    interruptions: u64,
}

impl InterruptionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of barge-ins handled so far.
    pub fn interruptions(&self) -> u64 {
        self.interruptions
    }

    /// Handle a barge-in, in order:
    /// 1. drop AI audio still queued for the telephony side,
    /// 2. truncate the interrupted item and cancel generation on the AI link,
    /// 3. flush playback already buffered on the telephony side.
    ///
    /// A cancel that cannot be delivered (link already closed) is logged and
    /// treated as a no-op, never a fatal error.
    pub(crate) async fn interrupt(
        &mut self,
        session_id: &str,
        relay: &mut AudioRelay,
        to_ai: Option<&mpsc::Sender<ClientEvent>>,
        to_telephony: Option<&mpsc::Sender<TelephonyCommand>>,
        stream_sid: Option<&str>,
        playing: Option<&PlayingTurn>,
    ) {
        self.interruptions += 1;
        let dropped = relay.clear_playback();

        if let Some(tx) = to_ai {
            if let Some(turn) = playing {
                let truncate = ClientEvent::ConversationItemTruncate {
                    item_id: turn.item_id.clone(),
                    content_index: 0,
                    audio_end_ms: turn.played_ms as u32,
                };
                if tx.send(truncate).await.is_err() {
                    debug!(session_id, "AI link closed, truncate skipped");
                }
            }
            if tx.send(ClientEvent::ResponseCancel).await.is_err() {
                debug!(session_id, "AI link closed, cancel skipped");
            }
        }

        if let (Some(tx), Some(sid)) = (to_telephony, stream_sid) {
            if tx.send(TelephonyCommand::clear(sid)).await.is_err() {
                debug!(session_id, "telephony link closed, clear skipped");
            }
        }

        info!(
            session_id,
            dropped_frames = dropped,
            "Caller barge-in: interrupted AI playback"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::{AudioFrame, FrameSource};
    use bytes::Bytes;

    #[tokio::test]
    async fn test_interrupt_clears_then_cancels_then_flushes() {
        let mut controller = InterruptionController::new();
        let mut relay = AudioRelay::new(8);
        let (ai_tx, mut ai_rx) = mpsc::channel(8);
        let (tel_tx, mut tel_rx) = mpsc::channel(8);

        relay.push_ai_frame(
            "MZ1",
            &AudioFrame {
                source: FrameSource::Ai,
                sequence: 0,
                payload: Bytes::from(vec![0u8; 160]),
                timestamp_ms: 0,
            },
        );

        let playing = PlayingTurn {
            response_id: "resp_1".to_string(),
            item_id: "item_1".to_string(),
            played_ms: 640,
        };
        controller
            .interrupt(
                "s1",
                &mut relay,
                Some(&ai_tx),
                Some(&tel_tx),
                Some("MZ1"),
                Some(&playing),
            )
            .await;

        // queued playback was dropped before anything else
        assert_eq!(relay.queued_playback(), 0);
        assert_eq!(controller.interruptions(), 1);

        match ai_rx.try_recv().unwrap() {
            ClientEvent::ConversationItemTruncate {
                item_id,
                audio_end_ms,
                ..
            } => {
                assert_eq!(item_id, "item_1");
                assert_eq!(audio_end_ms, 640);
            }
            other => panic!("expected truncate, got {other:?}"),
        }
        assert!(matches!(
            ai_rx.try_recv().unwrap(),
            ClientEvent::ResponseCancel
        ));
        assert!(matches!(
            tel_rx.try_recv().unwrap(),
            TelephonyCommand::Clear { .. }
        ));
    }

    #[tokio::test]
    async fn test_interrupt_with_closed_links_is_a_no_op() {
        let mut controller = InterruptionController::new();
        let mut relay = AudioRelay::new(8);
        let (ai_tx, ai_rx) = mpsc::channel::<ClientEvent>(1);
        drop(ai_rx);

        controller
            .interrupt("s1", &mut relay, Some(&ai_tx), None, None, None)
            .await;
        assert_eq!(controller.interruptions(), 1);
    }
}
