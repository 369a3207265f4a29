//! Telephony media-stream WebSocket message types.
//!
//! All events are JSON text frames with an `event` discriminator.
//!
//! Inbound (provider -> relay):
//! - `connected` - socket handshake complete
//! - `start` - call established; carries stream/call metadata
//! - `media` - one base64 audio frame from the caller, with a sequence number
//! - `dtmf` - keypad digit
//! - `mark` - playback checkpoint acknowledgement
//! - `stop` - call ended
//!
//! Outbound (relay -> provider):
//! - `media` - one base64 playback frame
//! - `mark` - playback checkpoint request, echoed back once played
//! - `clear` - flush any buffered playback

use serde::{Deserialize, Serialize};

// =============================================================================
// Inbound events
// =============================================================================

/// Events received from the telephony provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    /// Socket handshake complete; precedes `start`
    Connected {},

    /// Call established
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        start: StartMeta,
    },

    /// One audio frame from the caller
    Media {
        #[serde(rename = "sequenceNumber", default)]
        sequence_number: Option<String>,
        media: MediaPayload,
    },

    /// Keypad digit
    Dtmf { dtmf: DtmfPayload },

    /// Playback checkpoint acknowledgement
    Mark { mark: MarkPayload },

    /// Call ended
    Stop {},
}

/// Metadata carried by the `start` event.
#[derive(Debug, Clone, Deserialize)]
pub struct StartMeta {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "accountSid", default)]
    pub account_sid: Option<String>,
    #[serde(rename = "mediaFormat", default)]
    pub media_format: Option<MediaFormat>,
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: Option<serde_json::Value>,
}

/// Sample format advertised by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaFormat {
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(rename = "sampleRate", default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub channels: Option<u32>,
}

/// Payload of an inbound `media` event.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    /// Milliseconds since stream start, as reported by the provider
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Base64-encoded audio bytes
    pub payload: String,
}

/// Payload of a `dtmf` event.
#[derive(Debug, Clone, Deserialize)]
pub struct DtmfPayload {
    pub digit: String,
    #[serde(default)]
    pub track: Option<String>,
}

/// Payload of a `mark` acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

// =============================================================================
// Outbound commands
// =============================================================================

/// Events sent to the telephony provider.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyCommand {
    /// One playback frame
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },

    /// Playback checkpoint; the provider echoes it back once played
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: OutboundMark,
    },

    /// Flush any buffered playback
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

/// Payload of an outbound `media` command.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMedia {
    /// Base64-encoded audio bytes
    pub payload: String,
}

/// Payload of an outbound `mark` command.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMark {
    pub name: String,
}

impl TelephonyCommand {
    /// Build a playback frame command.
    pub fn media(stream_sid: &str, payload: String) -> Self {
        TelephonyCommand::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia { payload },
        }
    }

    /// Build a playback checkpoint command.
    pub fn mark(stream_sid: &str, name: String) -> Self {
        TelephonyCommand::Mark {
            stream_sid: stream_sid.to_string(),
            mark: OutboundMark { name },
        }
    }

    /// Build a flush command.
    pub fn clear(stream_sid: &str) -> Self {
        TelephonyCommand::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
