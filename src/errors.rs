//! Error taxonomy for the relay.
//!
//! Failures are classified by blast radius:
//!
//! - [`RelayError::Protocol`] — one malformed or unexpected message on a link.
//!   Logged and skipped; the link stays open.
//! - [`RelayError::LinkFailure`] — a socket-level failure of either link.
//!   Always ends the session and closes the peer link.
//! - [`RelayError::ToolExecution`] — a tool raised or timed out. Surfaced to
//!   the AI service as an error payload; non-fatal to the session.
//! - [`RelayError::ConfigurationTimeout`] — the AI service never acknowledged
//!   the session configuration. Fatal to the session.
//!
//! No failure is retried mid-call: audio continuity cannot be reconstructed
//! after a gap, so a dropped link ends the call.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while relaying a call.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed or unexpected message on a link
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Socket-level disconnect or handshake failure
    #[error("link failure: {0}")]
    LinkFailure(String),

    /// Tool invocation raised or exceeded its timeout
    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    /// AI link never acknowledged the session configuration
    #[error("configuration acknowledgement timed out after {0:?}")]
    ConfigurationTimeout(Duration),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::Protocol("bad frame".to_string());
        assert!(err.to_string().contains("protocol error"));

        let err = RelayError::LinkFailure("connection reset".to_string());
        assert!(err.to_string().contains("link failure"));

        let err = RelayError::ConfigurationTimeout(Duration::from_secs(10));
        assert!(err.to_string().contains("timed out"));
    }
}
