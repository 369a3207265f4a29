//! Bidirectional audio forwarding with bounded per-direction queues.
//!
//! Each direction is an independent FIFO: caller frames become AI
//! `input_audio_buffer.append` events, AI frames become telephony playback
//! commands, and a `mark` is inserted after each complete AI utterance.
//! Frames are never reordered within a direction.
//!
//! Queues are bounded: real-time audio favors recency over completeness, so
//! when a slow consumer lets a queue reach its limit the oldest entries for
//! that direction are dropped rather than buffering without bound.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::core::ai::ClientEvent;
use crate::core::audio::{AudioFrame, encode_payload};
use crate::core::telephony::TelephonyCommand;

/// Moves audio between the two links without blocking the session task.
pub struct AudioRelay {
    /// Caller -> AI direction, in arrival order
    inbound: VecDeque<ClientEvent>,
    /// AI -> telephony direction (playback frames and marks), in arrival order
    playback: VecDeque<TelephonyCommand>,
    /// Per-direction queue limit, in entries
    limit: usize,
    dropped_inbound: u64,
    dropped_playback: u64,
}

impl AudioRelay {
    pub fn new(limit: usize) -> Self {
        Self {
            inbound: VecDeque::new(),
            playback: VecDeque::new(),
            limit: limit.max(1),
            dropped_inbound: 0,
            dropped_playback: 0,
        }
    }

    /// Queue a caller frame for the AI input audio buffer.
    pub fn push_caller_frame(&mut self, frame: &AudioFrame) {
        let event = ClientEvent::audio_append(&frame.payload);
        if self.inbound.len() >= self.limit {
            self.inbound.pop_front();
            self.dropped_inbound += 1;
            debug!(
                dropped = self.dropped_inbound,
                "Inbound audio queue full, dropped oldest frame"
            );
        }
        self.inbound.push_back(event);
    }

    /// Queue an AI frame for telephony playback.
    pub fn push_ai_frame(&mut self, stream_sid: &str, frame: &AudioFrame) {
        let command = TelephonyCommand::media(stream_sid, encode_payload(&frame.payload));
        self.push_playback_command(command);
    }

    /// Queue a playback checkpoint after a complete AI utterance.
    pub fn push_mark(&mut self, stream_sid: &str, name: String) {
        self.push_playback_command(TelephonyCommand::mark(stream_sid, name));
    }

    fn push_playback_command(&mut self, command: TelephonyCommand) {
        if self.playback.len() >= self.limit {
            self.playback.pop_front();
            self.dropped_playback += 1;
            debug!(
                dropped = self.dropped_playback,
                "Playback queue full, dropped oldest frame"
            );
        }
        self.playback.push_back(command);
    }

    /// Discard everything queued for the telephony side. Returns the number
    /// of entries dropped.
    pub fn clear_playback(&mut self) -> usize {
        let dropped = self.playback.len();
        self.playback.clear();
        if dropped > 0 {
            debug!(dropped, "Cleared queued playback");
        }
        dropped
    }

    /// Discard both directions.
    pub fn clear_all(&mut self) {
        self.inbound.clear();
        self.playback.clear();
    }

    /// Drain as much queued audio as the link channels will accept right now,
    /// without blocking. Playback draining can be withheld (tool execution in
    /// progress) while the caller -> AI direction keeps flowing.
    pub fn pump(
        &mut self,
        to_ai: Option<&mpsc::Sender<ClientEvent>>,
        to_telephony: Option<&mpsc::Sender<TelephonyCommand>>,
        playback_enabled: bool,
    ) {
        if let Some(tx) = to_ai {
            while let Some(event) = self.inbound.pop_front() {
                match tx.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(event)) => {
                        self.inbound.push_front(event);
                        break;
                    }
                    Err(TrySendError::Closed(_)) => {
                        warn!("AI link channel closed, discarding queued inbound audio");
                        self.inbound.clear();
                        break;
                    }
                }
            }
        }

        if playback_enabled {
            if let Some(tx) = to_telephony {
                while let Some(command) = self.playback.pop_front() {
                    match tx.try_send(command) {
                        Ok(()) => {}
                        Err(TrySendError::Full(command)) => {
                            self.playback.push_front(command);
                            break;
                        }
                        Err(TrySendError::Closed(_)) => {
                            warn!("Telephony channel closed, discarding queued playback");
                            self.playback.clear();
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Entries currently queued toward the AI link.
    pub fn queued_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Entries currently queued toward the telephony link.
    pub fn queued_playback(&self) -> usize {
        self.playback.len()
    }
}
