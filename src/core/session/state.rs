//! Session lifecycle states and the legal-transition table.

use std::fmt;

/// Lifecycle state of one call session.
///
/// All states are reachable only through [`transition_allowed`]; the session
/// task is the only writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Telephony link open, AI link not yet configured
    #[default]
    Connecting,
    /// Both links ready, no one currently speaking
    Active,
    /// AI audio is being forwarded
    AiSpeaking,
    /// Caller speech detected
    CallerSpeaking,
    /// One or more tool calls pending, AI audio output withheld
    ToolExecuting,
    /// Teardown in progress
    Closing,
    /// Terminal
    Closed,
}

impl SessionState {
    /// Whether the session has begun or finished teardown.
    pub fn is_closing(&self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::AiSpeaking => write!(f, "ai_speaking"),
            SessionState::CallerSpeaking => write!(f, "caller_speaking"),
            SessionState::ToolExecuting => write!(f, "tool_executing"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// The transition table. Any state may enter `Closing`; `Closed` is reached
/// only from `Closing`.
pub(crate) fn transition_allowed(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;
    match (from, to) {
        (_, Closing) => from != Closed,
        (Closing, Closed) => true,
        (Connecting, Active) => true,
        (Active, AiSpeaking) => true,
        (Active, CallerSpeaking) => true,
        (Active, ToolExecuting) => true,
        (AiSpeaking, Active) => true,
        (AiSpeaking, CallerSpeaking) => true,
        (AiSpeaking, ToolExecuting) => true,
        (CallerSpeaking, Active) => true,
        (ToolExecuting, Active) => true,
        _ => false,
    }
}
