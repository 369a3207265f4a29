//! Configuration module for the convrelay server
//!
//! Configuration is loaded from environment variables (with `.env` support via
//! `dotenvy` in `main`). Every value is read once at startup into a
//! [`ServerConfig`] that is shared read-only for the lifetime of the process;
//! nothing mutates it per call.
//!
//! # Example
//! ```rust,no_run
//! use convrelay::config::ServerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Default port when `PORT` is not set.
const DEFAULT_PORT: u16 = 3000;

/// Default bound on waiting for the AI session-configuration acknowledgement.
const DEFAULT_CONFIG_ACK_TIMEOUT_MS: u64 = 10_000;

/// Default bound on a single tool invocation.
const DEFAULT_TOOL_TIMEOUT_MS: u64 = 10_000;

/// Default per-direction audio queue depth, in frames.
/// At 20 ms per telephony frame this is roughly five seconds of audio.
const DEFAULT_AUDIO_QUEUE_FRAMES: usize = 256;

/// Default system prompt when `SYSTEM_PROMPT` is not set.
const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly and helpful AI phone assistant. \
    Keep your responses concise and conversational - you're on a phone call. \
    Respond in one or two sentences unless the caller asks for more detail.";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },

    #[error("invalid public URL '{0}': {1}")]
    InvalidPublicUrl(String, String),
}

/// Server configuration
///
/// Contains everything needed to run the relay server:
/// - Server settings (host, port, public URL)
/// - AI service settings (API key, model, voice, system prompt)
/// - Telephony provider credentials (optional; the relay itself only needs
///   them to print webhook configuration hints)
/// - Session bounds (configuration-ack timeout, tool timeout, queue depth)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used to derive the relay WebSocket URL
    /// embedded in call-control markup.
    pub public_url: String,

    // AI service settings
    pub openai_api_key: Option<String>,
    /// Override of the realtime service endpoint; defaults to the public API
    pub ai_endpoint: Option<String>,
    pub model: String,
    pub voice: String,
    pub system_prompt: String,

    // Telephony provider credentials (informational)
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_phone_number: Option<String>,

    // Session bounds
    pub config_ack_timeout: Duration,
    pub tool_timeout: Duration,
    pub audio_queue_frames: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_env("PORT", DEFAULT_PORT)?;
        let public_url =
            env::var("PUBLIC_URL").unwrap_or_else(|_| format!("http://localhost:{port}"));

        // Validate the public URL up front so markup generation cannot fail later.
        Url::parse(&public_url)
            .map_err(|e| ConfigError::InvalidPublicUrl(public_url.clone(), e.to_string()))?;

        let config_ack_timeout = Duration::from_millis(parse_env(
            "CONFIG_ACK_TIMEOUT_MS",
            DEFAULT_CONFIG_ACK_TIMEOUT_MS,
        )?);
        let tool_timeout =
            Duration::from_millis(parse_env("TOOL_TIMEOUT_MS", DEFAULT_TOOL_TIMEOUT_MS)?);
        let audio_queue_frames = parse_env("AUDIO_QUEUE_FRAMES", DEFAULT_AUDIO_QUEUE_FRAMES)?;

        Ok(Self {
            host,
            port,
            public_url,
            openai_api_key: env_opt("OPENAI_API_KEY"),
            ai_endpoint: env_opt("OPENAI_REALTIME_ENDPOINT"),
            model: env::var("OPENAI_REALTIME_MODEL")
                .unwrap_or_else(|_| "gpt-4o-realtime-preview".to_string()),
            voice: env::var("OPENAI_REALTIME_VOICE").unwrap_or_else(|_| "alloy".to_string()),
            system_prompt: env::var("SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),
            twilio_account_sid: env_opt("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: env_opt("TWILIO_AUTH_TOKEN"),
            twilio_phone_number: env_opt("TWILIO_PHONE_NUMBER"),
            config_ack_timeout,
            tool_timeout,
            audio_queue_frames,
        })
    }

    /// Socket address string the server binds to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether telephony provider credentials are configured.
    pub fn has_telephony_credentials(&self) -> bool {
        self.twilio_account_sid.is_some() && self.twilio_auth_token.is_some()
    }

    /// The relay WebSocket URL for a given session identifier, derived from
    /// the public URL (http -> ws, https -> wss).
    pub fn relay_ws_url(&self, session_id: &str) -> String {
        // public_url was validated in from_env
        let mut url = match Url::parse(&self.public_url) {
            Ok(u) => u,
            Err(_) => return format!("ws://localhost:{}/relay?session={session_id}", self.port),
        };
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        let _ = url.set_scheme(scheme);
        url.set_path("/relay");
        url.set_query(Some(&format!("session={session_id}")));
        url.to_string()
    }

    /// The voice webhook URL to configure on the telephony provider.
    pub fn voice_webhook_url(&self) -> String {
        format!("{}/voice", self.public_url.trim_end_matches('/'))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            public_url: format!("http://localhost:{DEFAULT_PORT}"),
            openai_api_key: None,
            ai_endpoint: None,
            model: "gpt-4o-realtime-preview".to_string(),
            voice: "alloy".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_phone_number: None,
            config_ack_timeout: Duration::from_millis(DEFAULT_CONFIG_ACK_TIMEOUT_MS),
            tool_timeout: Duration::from_millis(DEFAULT_TOOL_TIMEOUT_MS),
            audio_queue_frames: DEFAULT_AUDIO_QUEUE_FRAMES,
        }
    }
}

/// Read an optional environment variable, treating empty strings as unset.
fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable, falling back to a default when unset.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.address(), "0.0.0.0:3000");
        assert!(!config.has_telephony_credentials());
    }

    #[test]
    fn test_relay_ws_url_http() {
        let config = ServerConfig {
            public_url: "http://localhost:3000".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.relay_ws_url("abc"),
            "ws://localhost:3000/relay?session=abc"
        );
    }

    #[test]
    fn test_relay_ws_url_https() {
        let config = ServerConfig {
            public_url: "https://relay.example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.relay_ws_url("abc"),
            "wss://relay.example.com/relay?session=abc"
        );
    }

    #[test]
    fn test_voice_webhook_url_trims_slash() {
        let config = ServerConfig {
            public_url: "https://relay.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.voice_webhook_url(),
            "https://relay.example.com/voice"
        );
    }
}
