//! AI realtime WebSocket message types.
//!
//! All events are JSON text frames with a `type` discriminator.
//!
//! Client events (sent to the service):
//! - session.update - session configuration (system prompt, tools, formats)
//! - input_audio_buffer.append - append caller audio to the input buffer
//! - input_audio_buffer.clear - clear the input buffer
//! - conversation.item.create - add an item (used for tool results)
//! - conversation.item.truncate - truncate a played item after barge-in
//! - response.create - request a response
//! - response.cancel - cancel the in-flight response
//!
//! Server events (received from the service):
//! - session.created / session.updated - configuration lifecycle
//! - input_audio_buffer.speech_started / speech_stopped - caller speech bounds
//! - response.audio.delta / response.audio.done - streaming synthesized audio
//! - response.output_item.added - carries function names for tool calls
//! - response.function_call_arguments.done - a complete tool-call request
//! - conversation.item.input_audio_transcription.completed - caller transcript
//! - response.audio_transcript.done - assistant transcript
//! - response.done - turn complete
//! - error - service-reported error

use base64::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration carried by `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Response modalities (text, audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Voice for audio output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Input audio format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    /// Output audio format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    /// Turn detection configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,

    /// Tool definitions advertised to the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,

    /// Tool choice strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

/// Turn detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        /// Audio prefix padding in ms
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        /// Silence duration in ms
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
        /// Whether to create a response on turn end
        #[serde(skip_serializing_if = "Option::is_none")]
        create_response: Option<bool>,
        /// Whether to interrupt model output on speech
        #[serde(skip_serializing_if = "Option::is_none")]
        interrupt_response: Option<bool>,
    },
}

impl Default for TurnDetection {
    fn default() -> Self {
        TurnDetection::ServerVad {
            threshold: Some(0.5),
            prefix_padding_ms: Some(300),
            silence_duration_ms: Some(500),
            create_response: Some(true),
            interrupt_response: Some(true),
        }
    }
}

/// Tool definition advertised at session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool type (always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Function parameters JSON schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item, trimmed to the fields the relay produces and consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationItem {
    /// Item ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Item type
    #[serde(rename = "type")]
    pub item_type: String,
    /// Call ID for function calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Function name for function calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Function arguments for function calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// Function output for function call results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ConversationItem {
    /// Build a `function_call_output` item for a resolved tool call.
    pub fn function_call_output(call_id: &str, output: String) -> Self {
        Self {
            id: None,
            item_type: "function_call_output".to_string(),
            call_id: Some(call_id.to_string()),
            name: None,
            arguments: None,
            output: Some(output),
        }
    }
}

// =============================================================================
// Client Events (sent to the service)
// =============================================================================

/// Client events sent to the AI realtime service.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionConfig,
    },

    /// Append audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio data
        audio: String,
    },

    /// Clear the input audio buffer
    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear,

    /// Create a conversation item
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// Item to create
        item: ConversationItem,
    },

    /// Truncate a conversation item that was interrupted mid-playback
    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        /// Item ID
        item_id: String,
        /// Content index
        content_index: u32,
        /// Audio end in ms
        audio_end_ms: u32,
    },

    /// Request a response
    #[serde(rename = "response.create")]
    ResponseCreate,

    /// Cancel the in-flight response
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

impl ClientEvent {
    /// Create an audio append event from raw bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }
}

// =============================================================================
// Server Events (received from the service)
// =============================================================================

/// Server events received from the AI realtime service.
///
/// Event types the relay does not consume deserialize into [`ServerEvent::Other`]
/// so a protocol addition never breaks the link.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Error occurred
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Session created
    #[serde(rename = "session.created")]
    SessionCreated {
        /// Session information
        session: SessionInfo,
    },

    /// Session configuration acknowledged
    #[serde(rename = "session.updated")]
    SessionUpdated {
        /// Session information
        session: SessionInfo,
    },

    /// Caller speech detected
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        /// Audio start timestamp in ms
        #[serde(default)]
        audio_start_ms: u64,
        /// Item ID
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Caller speech ended
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        /// Audio end timestamp in ms
        #[serde(default)]
        audio_end_ms: u64,
        /// Item ID
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Caller audio transcription completed
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        /// Item ID
        item_id: String,
        /// Transcript text
        transcript: String,
    },

    /// Assistant transcript complete
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        /// Item ID
        item_id: String,
        /// Full transcript
        transcript: String,
    },

    /// One streaming chunk of synthesized audio
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Response ID
        response_id: String,
        /// Item ID
        item_id: String,
        /// Base64-encoded audio delta
        delta: String,
    },

    /// Synthesized audio complete for the current turn
    #[serde(rename = "response.audio.done")]
    AudioDone {
        /// Response ID
        response_id: String,
        /// Item ID
        item_id: String,
    },

    /// Output item added; carries function names for tool calls
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        /// Response ID
        response_id: String,
        /// Item
        item: ConversationItem,
    },

    /// A complete tool-call request
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        /// Call ID
        call_id: String,
        /// Item ID
        item_id: String,
        /// Full arguments as a JSON string
        arguments: String,
    },

    /// Response complete
    #[serde(rename = "response.done")]
    ResponseDone {
        /// Response information
        response: ResponseInfo,
    },

    /// Any event type the relay does not consume
    #[serde(other)]
    Other,
}

impl ServerEvent {
    /// Decode base64 audio from an `AudioDelta` event.
    pub fn decode_audio_delta(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(delta)
    }
}

// =============================================================================
// Supporting Types
// =============================================================================

/// API error information.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: String,
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Error message
    #[serde(default)]
    pub message: String,
}

/// Session information.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    /// Session ID
    pub id: String,
    /// Model in use
    #[serde(default)]
    pub model: Option<String>,
}

/// Response information.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseInfo {
    /// Response ID
    pub id: String,
    /// Response status
    #[serde(default)]
    pub status: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_update_serialization() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                modalities: Some(vec!["text".to_string(), "audio".to_string()]),
                instructions: Some("Be brief".to_string()),
                voice: Some("alloy".to_string()),
                input_audio_format: Some("g711_ulaw".to_string()),
                output_audio_format: Some("g711_ulaw".to_string()),
                turn_detection: Some(TurnDetection::default()),
                tools: None,
                tool_choice: None,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("session.update"));
        assert!(json.contains("g711_ulaw"));
        assert!(json.contains("server_vad"));
    }

    #[test]
    fn test_audio_append() {
        let data = vec![0u8, 1, 2, 3];
        let event = ClientEvent::audio_append(&data);
        match event {
            ClientEvent::InputAudioBufferAppend { audio } => {
                assert_eq!(BASE64_STANDARD.decode(&audio).unwrap(), data);
            }
            _ => panic!("wrong event type"),
        }
    }

    #[test]
    fn test_response_cancel_serialization() {
        let json = serde_json::to_string(&ClientEvent::ResponseCancel).unwrap();
        assert!(json.contains("response.cancel"));
    }

    #[test]
    fn test_truncate_serialization() {
        let event = ClientEvent::ConversationItemTruncate {
            item_id: "item_1".to_string(),
            content_index: 0,
            audio_end_ms: 1500,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("conversation.item.truncate"));
        assert!(json.contains("1500"));
    }

    #[test]
    fn test_function_call_output_item() {
        let item = ConversationItem::function_call_output("tc1", "{\"ok\":true}".to_string());
        let json = serde_json::to_string(&ClientEvent::ConversationItemCreate { item }).unwrap();
        assert!(json.contains("function_call_output"));
        assert!(json.contains("tc1"));
    }

    #[test]
    fn test_audio_delta_deserialization() {
        let json = r#"{
            "type": "response.audio.delta",
            "response_id": "resp_1",
            "item_id": "item_1",
            "output_index": 0,
            "content_index": 0,
            "delta": "AAAA"
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::AudioDelta { delta, item_id, .. } => {
                assert_eq!(delta, "AAAA");
                assert_eq!(item_id, "item_1");
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn test_function_call_deserialization() {
        let json = r#"{
            "type": "response.function_call_arguments.done",
            "response_id": "resp_1",
            "item_id": "item_2",
            "output_index": 0,
            "call_id": "tc1",
            "arguments": "{\"city\":\"Lisbon\"}"
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::FunctionCallArgumentsDone {
                call_id, arguments, ..
            } => {
                assert_eq!(call_id, "tc1");
                assert!(arguments.contains("Lisbon"));
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_deserializes_as_other() {
        let json = r#"{"type": "rate_limits.updated", "rate_limits": []}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, ServerEvent::Other));
    }

    #[test]
    fn test_error_event_deserialization() {
        let json = r#"{
            "type": "error",
            "error": {"type": "invalid_request_error", "message": "bad event"}
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::Error { error } => assert_eq!(error.message, "bad event"),
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_audio_delta() {
        let original = vec![1u8, 2, 3, 4];
        let encoded = BASE64_STANDARD.encode(&original);
        assert_eq!(ServerEvent::decode_audio_delta(&encoded).unwrap(), original);
    }
}
