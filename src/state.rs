//! Shared application state.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::session::SessionSupervisor;
use crate::core::tools::ToolRegistry;

/// State shared by every HTTP and WebSocket handler.
///
/// Everything in here is process-lifetime and read-only after startup; all
/// per-call mutable state lives inside the sessions owned by the supervisor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub supervisor: Arc<SessionSupervisor>,
}

impl AppState {
    /// Create application state from startup configuration and the tool
    /// registry assembled in `main`.
    pub fn new(config: ServerConfig, tools: Arc<ToolRegistry>) -> Self {
        let config = Arc::new(config);
        let supervisor = Arc::new(SessionSupervisor::new(config.clone(), tools));
        Self { config, supervisor }
    }
}
