//! Tool-call dispatch.
//!
//! The dispatcher resolves the named capability, bounds its execution time,
//! and reports the outcome back to the session over a channel. A pending call
//! is never silently dropped: a missing tool, a raised error, unparseable
//! arguments, and a timeout all resolve to an error outcome the session turns
//! into a tool-result error payload for the AI.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use super::{ToolError, ToolRegistry};

/// Outcome of one dispatched tool call.
#[derive(Debug)]
pub struct ToolResolution {
    pub call_id: String,
    pub name: String,
    pub result: Result<serde_json::Value, ToolError>,
}

/// Dispatches tool calls against the registry with a bounded timeout.
///
/// Calls run concurrently: the AI may request several before any resolve, and
/// each resolution arrives on the channel independently.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Spawn the invocation of one tool call. The outcome, success or error,
    /// is delivered on `out`.
    pub fn dispatch(
        &self,
        call_id: String,
        name: String,
        arguments: String,
        out: mpsc::Sender<ToolResolution>,
    ) {
        let registry = self.registry.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let result = invoke(&registry, &name, &arguments, timeout).await;
            debug!(call_id = %call_id, tool = %name, ok = result.is_ok(), "Tool call resolved");
            let _ = out
                .send(ToolResolution {
                    call_id,
                    name,
                    result,
                })
                .await;
        });
    }
}

async fn invoke(
    registry: &ToolRegistry,
    name: &str,
    arguments: &str,
    timeout: Duration,
) -> Result<serde_json::Value, ToolError> {
    let tool = registry
        .get(name)
        .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

    let arguments: serde_json::Value = if arguments.trim().is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))?
    };

    match tokio::time::timeout(timeout, tool.invoke(arguments)).await {
        Ok(result) => result,
        Err(_) => Err(ToolError::TimedOut(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tools::Tool;
    use async_trait::async_trait;

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

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Never finishes in time"
        }
        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn invoke(&self, _: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(serde_json::json!({}))
        }
    }

    fn dispatcher(timeout: Duration) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(SlowTool));
        ToolDispatcher::new(Arc::new(registry), timeout)
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let (tx, mut rx) = mpsc::channel(4);
        dispatcher(Duration::from_secs(1)).dispatch(
            "tc1".into(),
            "echo".into(),
            r#"{"city":"Lisbon"}"#.into(),
            tx,
        );
        let resolution = rx.recv().await.unwrap();
        assert_eq!(resolution.call_id, "tc1");
        assert_eq!(resolution.result.unwrap()["city"], "Lisbon");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool_resolves_as_error() {
        let (tx, mut rx) = mpsc::channel(4);
        dispatcher(Duration::from_secs(1)).dispatch(
            "tc1".into(),
            "lookup_account".into(),
            "{}".into(),
            tx,
        );
        let resolution = rx.recv().await.unwrap();
        assert_eq!(resolution.call_id, "tc1");
        assert!(matches!(resolution.result, Err(ToolError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_dispatch_timeout_resolves_as_error() {
        let (tx, mut rx) = mpsc::channel(4);
        dispatcher(Duration::from_millis(20)).dispatch("tc2".into(), "slow".into(), "{}".into(), tx);
        let resolution = rx.recv().await.unwrap();
        assert!(matches!(resolution.result, Err(ToolError::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_dispatch_invalid_arguments() {
        let (tx, mut rx) = mpsc::channel(4);
        dispatcher(Duration::from_secs(1)).dispatch(
            "tc3".into(),
            "echo".into(),
            "not json".into(),
            tx,
        );
        let resolution = rx.recv().await.unwrap();
        assert!(matches!(
            resolution.result,
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_arguments_become_empty_object() {
        let (tx, mut rx) = mpsc::channel(4);
        dispatcher(Duration::from_secs(1)).dispatch("tc4".into(), "echo".into(), "".into(), tx);
        let resolution = rx.recv().await.unwrap();
        assert_eq!(resolution.result.unwrap(), serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_resolve_independently() {
        let (tx, mut rx) = mpsc::channel(4);
        let d = dispatcher(Duration::from_millis(50));
        d.dispatch("slow-call".into(), "slow".into(), "{}".into(), tx.clone());
        d.dispatch("fast-call".into(), "echo".into(), "{}".into(), tx);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        // the fast call resolves first even though it was dispatched second
        assert_eq!(first.call_id, "fast-call");
        assert_eq!(second.call_id, "slow-call");
        assert!(second.result.is_err());
    }
}
