//! Tool registry and dispatch.
//!
//! Tools are externally invokable capabilities the AI model may call during a
//! conversation. The registry is assembled at startup and shared read-only by
//! every session; it is used both to advertise tool schemas at session
//! configuration and to resolve dispatch lookups.

mod builtin;
mod dispatch;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use builtin::CurrentTimeTool;
pub use dispatch::{ToolDispatcher, ToolResolution};

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced to the AI as tool-result error payloads.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool with the requested name is registered
    #[error("no tool named '{0}' is registered")]
    NotFound(String),

    /// Arguments were not valid JSON or did not match the schema
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    /// The tool raised an error
    #[error("tool failed: {0}")]
    Failed(String),

    /// The tool exceeded its bounded execution timeout
    #[error("tool timed out after {0:?}")]
    TimedOut(Duration),
}

// =============================================================================
// Tool trait and registry
// =============================================================================

/// One externally invokable capability.
///
/// Implementations may perform arbitrary async work (database lookups, API
/// calls); the dispatcher bounds their execution time.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the AI uses to invoke this tool.
    fn name(&self) -> &str;

    /// Human-readable description advertised to the model.
    fn description(&self) -> &str;

    /// JSON schema of the accepted arguments.
    fn parameters(&self) -> serde_json::Value;

    /// Invoke the tool.
    async fn invoke(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// Declared surface of one registered tool, used to advertise schemas at
/// session configuration.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Mapping from tool name to capability. Process-lifetime and read-only
/// after startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Resolve a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declared schemas of every registered tool.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }
}

// =============================================================================
// Tool calls
// =============================================================================

/// Status of one AI-initiated function invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One AI-initiated function invocation, tracked from the request event until
/// its result is sent back.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw argument payload as received from the AI
    pub arguments: String,
    pub status: ToolCallStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ToolCall {
    pub fn new(id: String, name: String, arguments: String) -> Self {
        Self {
            id,
            name,
            arguments,
            status: ToolCallStatus::Pending,
            result: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the arguments back"
        }
        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn invoke(
            &self,
            arguments: serde_json::Value,
        ) -> Result<serde_json::Value, ToolError> {
            Ok(arguments)
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registry_schemas() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "echo");
    }

    #[test]
    fn test_tool_call_starts_pending() {
        let call = ToolCall::new("tc1".into(), "echo".into(), "{}".into());
        assert_eq!(call.status, ToolCallStatus::Pending);
        assert!(call.result.is_none());
        assert!(call.error.is_none());
    }
}
