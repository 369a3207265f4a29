//! Builtin tools registered by default.

use async_trait::async_trait;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{Tool, ToolError};

/// Reports the current UTC time, so the assistant can answer "what time is
/// it" style questions without guessing.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in UTC"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn invoke(&self, _arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| ToolError::Failed(e.to_string()))?;
        Ok(serde_json::json!({ "utc": now }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_current_time_reports_rfc3339() {
        let result = CurrentTimeTool
            .invoke(serde_json::json!({}))
            .await
            .unwrap();
        let utc = result["utc"].as_str().unwrap();
        assert!(utc.contains('T'));
        assert!(OffsetDateTime::parse(utc, &Rfc3339).is_ok());
    }
}
