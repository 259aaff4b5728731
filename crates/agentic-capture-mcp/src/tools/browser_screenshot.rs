//! Tool: browser_screenshot. PNG of the primary page, kept as an artifact.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::session::CaptureSessionManager;
use crate::types::{McpError, McpResult, ToolCallResult, ToolContent, ToolDefinition};

#[derive(Debug, Deserialize)]
struct ScreenshotParams {
    #[serde(default)]
    name: Option<String>,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "browser_screenshot",
        "Take a screenshot of the current page",
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Artifact name for the PNG" }
            }
        }),
    )
}

pub async fn execute(
    args: Value,
    session: &Arc<CaptureSessionManager>,
) -> McpResult<ToolCallResult> {
    let params: ScreenshotParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;
    let name = params
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("screenshot-{}.png", &uuid::Uuid::new_v4().simple().to_string()[..8]));

    match session.screenshot(&name).await {
        Ok((bytes, stored)) => Ok(ToolCallResult::text(format!(
            "Saved screenshot as artifact://{} ({} bytes)",
            stored.name, stored.size
        ))
        .with(ToolContent::image(&bytes, "image/png"))),
        Err(e) => Ok(super::failure("Screenshot", &e)),
    }
}
