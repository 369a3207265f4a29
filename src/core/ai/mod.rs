//! AI realtime side of the relay.
//!
//! The relay opens one outbound WebSocket per call to the AI realtime service.
//! [`messages`] models the JSON event protocol (tagged by a `type` field),
//! [`config`] the model/voice/format parameters, and [`link`] owns the
//! connection.

pub mod config;
mod link;
pub mod messages;

pub use config::{
    AiAudioFormat, AiModel, AiVoice, OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL,
};
pub use link::{AiLinkConfig, AiRealtimeLink};
pub use messages::{
    ApiError, ClientEvent, ConversationItem, ServerEvent, SessionConfig, SessionInfo, ToolDef,
    TurnDetection,
};
