//! Audio frame model and payload codec.
//!
//! Both wire protocols carry audio as base64 text inside JSON envelopes. This
//! module decodes those envelopes into [`AudioFrame`]s, re-encodes frames for
//! the opposite side, and tracks per-source sequence numbers so dropped or
//! reordered frames can be reported.
//!
//! The relay does not transcode: telephony G.711 u-law payloads pass through
//! unchanged and the AI session is configured for the same format.

use base64::prelude::*;
use bytes::Bytes;

use crate::errors::{RelayError, RelayResult};

/// Audio bytes per millisecond for G.711 u-law at 8 kHz (one byte per sample).
const ULAW_BYTES_PER_MS: u64 = 8;

// =============================================================================
// Frames
// =============================================================================

/// Which side of the call produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    /// Audio spoken by the caller, arriving on the telephony link
    Caller,
    /// Audio synthesized by the AI service, arriving as streaming deltas
    Ai,
}

impl std::fmt::Display for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameSource::Caller => write!(f, "caller"),
            FrameSource::Ai => write!(f, "ai"),
        }
    }
}

/// One unit of audio payload moving through the relay.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Producer of this frame
    pub source: FrameSource,
    /// Monotonically increasing per source
    pub sequence: u64,
    /// Raw encoded audio bytes (G.711 u-law)
    pub payload: Bytes,
    /// Milliseconds since call start, for transcript alignment
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Playback duration of this frame's payload.
    pub fn duration_ms(&self) -> u64 {
        ulaw_duration_ms(self.payload.len())
    }
}

/// Playback duration of a G.711 u-law payload of the given byte length.
pub fn ulaw_duration_ms(len: usize) -> u64 {
    len as u64 / ULAW_BYTES_PER_MS
}

// =============================================================================
// Payload codec
// =============================================================================

/// Decode a base64 audio payload from either wire protocol.
pub fn decode_payload(payload: &str) -> RelayResult<Bytes> {
    BASE64_STANDARD
        .decode(payload)
        .map(Bytes::from)
        .map_err(|e| RelayError::Protocol(format!("invalid base64 audio payload: {e}")))
}

/// Encode raw audio bytes as a base64 payload.
pub fn encode_payload(data: &[u8]) -> String {
    BASE64_STANDARD.encode(data)
}

// =============================================================================
// Sequence tracking
// =============================================================================

/// Tracks the last observed sequence number for one frame source.
///
/// Telephony audio is a real-time stream: gaps are reported but never stop the
/// flow, and lost frames are not retried.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: Option<u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a sequence number, returning the size of the gap since the
    /// previous one (`None` when the stream is contiguous or went backwards).
    pub fn observe(&mut self, sequence: u64) -> Option<u64> {
        let gap = match self.last {
            Some(last) if sequence > last + 1 => Some(sequence - last - 1),
            _ => None,
        };
        if self.last.is_none_or(|last| sequence > last) {
            self.last = Some(sequence);
        }
        gap
    }

    /// Next sequence number to assign to a locally produced frame.
    pub fn next(&mut self) -> u64 {
        let next = self.last.map_or(0, |last| last + 1);
        self.last = Some(next);
        next
    }
}

// =============================================================================
// Tests
// =============================================================================
