//! Tool: browser_wait. Pause between steps.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

pub const MAX_WAIT_SECS: f64 = 60.0;

#[derive(Debug, Deserialize)]
struct WaitParams {
    time: f64,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "browser_wait",
        "Wait for a number of seconds (at most 60)",
        json!({
            "type": "object",
            "properties": {
                "time": { "type": "number", "description": "Seconds to wait", "minimum": 0 }
            },
            "required": ["time"]
        }),
    )
}

pub async fn execute(args: Value) -> McpResult<ToolCallResult> {
    let params: WaitParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;
    if !params.time.is_finite() || params.time < 0.0 {
        return Err(McpError::InvalidParams(
            "'time' must be a non-negative number of seconds".to_string(),
        ));
    }
    let secs = params.time.min(MAX_WAIT_SECS);
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    Ok(ToolCallResult::text(format!("Waited for {secs} seconds")))
}
