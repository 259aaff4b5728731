//! Tool registration and dispatch.

use std::sync::Arc;

use serde_json::Value;

use crate::session::CaptureSessionManager;
use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

use super::{
    browser_action, browser_navigate, browser_screenshot, browser_wait, click_and_capture,
    download_file, CaptureVariant,
};

pub struct ToolRegistry;

impl ToolRegistry {
    pub fn list_tools() -> Vec<ToolDefinition> {
        let mut tools = vec![browser_navigate::definition()];
        tools.extend(browser_action::definitions());
        tools.push(browser_wait::definition());
        tools.push(browser_screenshot::definition());
        tools.extend(CaptureVariant::ALL.iter().map(|v| click_and_capture::definition(*v)));
        tools.push(download_file::definition());
        tools
    }

    pub async fn call(
        name: &str,
        arguments: Option<Value>,
        session: &Arc<CaptureSessionManager>,
    ) -> McpResult<ToolCallResult> {
        let args = arguments
            .filter(|a| !a.is_null())
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        tracing::debug!(tool = name, "Tool call");

        if let Some(variant) = CaptureVariant::from_tool_name(name) {
            return click_and_capture::execute(variant, args, session).await;
        }
        match name {
            "browser_navigate" => browser_navigate::execute(args, session).await,
            "browser_click" | "browser_hover" | "browser_fill" | "browser_select_option" => {
                browser_action::execute(name, args, session).await
            }
            "browser_wait" => browser_wait::execute(args).await,
            "browser_screenshot" => browser_screenshot::execute(args, session).await,
            "download_file" => download_file::execute(args, session).await,
            _ => Err(McpError::ToolNotFound(name.to_string())),
        }
    }
}
