//! Tool: browser_navigate. Load a URL in the primary page.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::session::CaptureSessionManager;
use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct NavigateParams {
    url: String,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "browser_navigate",
        "Navigate the browser to a URL",
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "URL to open" }
            },
            "required": ["url"]
        }),
    )
}

pub async fn execute(
    args: Value,
    session: &Arc<CaptureSessionManager>,
) -> McpResult<ToolCallResult> {
    let params: NavigateParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;
    if params.url.trim().is_empty() {
        return Err(McpError::InvalidParams("'url' must not be empty".to_string()));
    }

    match session.navigate(&params.url).await {
        Ok(url) => Ok(ToolCallResult::text(format!("Navigated to {url}"))),
        Err(e) => Ok(super::failure("Navigation", &e)),
    }
}
