//! Tools: browser_click, browser_hover, browser_fill, browser_select_option.
//!
//! All four go through the resilient actuator, so a locator matching several
//! elements falls back to the first one.

use std::sync::Arc;

use agentic_capture::{Locator, UiAction};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::session::CaptureSessionManager;
use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct ActionParams {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    values: Option<Vec<String>>,
}

fn locator_schema(extra: Value) -> Value {
    let mut properties = json!({
        "selector": { "type": "string", "description": "CSS selector of the element" },
        "text": { "type": "string", "description": "Visible text of the element" }
    });
    if let (Some(props), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        props.extend(extra.clone());
    }
    properties
}

fn definition(name: &str, description: &str, extra: Value, required: &[&str]) -> ToolDefinition {
    ToolDefinition::new(
        name,
        description,
        json!({
            "type": "object",
            "properties": locator_schema(extra),
            "required": required
        }),
    )
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        definition(
            "browser_click",
            "Click an element located by selector and/or visible text",
            json!({}),
            &[],
        ),
        definition(
            "browser_hover",
            "Hover over an element located by selector and/or visible text",
            json!({}),
            &[],
        ),
        definition(
            "browser_fill",
            "Fill an input located by selector and/or visible text",
            json!({ "value": { "type": "string", "description": "Text to enter" } }),
            &["value"],
        ),
        definition(
            "browser_select_option",
            "Select options in a <select> located by selector and/or visible text",
            json!({
                "values": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Option values or labels to select"
                }
            }),
            &["values"],
        ),
    ]
}

pub async fn execute(
    tool: &str,
    args: Value,
    session: &Arc<CaptureSessionManager>,
) -> McpResult<ToolCallResult> {
    let params: ActionParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;
    let locator = Locator::new(params.selector, params.text);
    if locator.is_empty() {
        return Err(McpError::InvalidParams(
            "Provide 'selector', 'text', or both".to_string(),
        ));
    }

    let action = match tool {
        "browser_click" => UiAction::Click,
        "browser_hover" => UiAction::Hover,
        "browser_fill" => UiAction::Fill(
            params
                .value
                .ok_or_else(|| McpError::InvalidParams("'value' is required".to_string()))?,
        ),
        "browser_select_option" => UiAction::Select(
            params
                .values
                .filter(|v| !v.is_empty())
                .ok_or_else(|| McpError::InvalidParams("'values' must not be empty".to_string()))?,
        ),
        other => return Err(McpError::ToolNotFound(other.to_string())),
    };

    match session.act(&locator, &action).await {
        Ok(()) => Ok(ToolCallResult::text(format!(
            "Performed {} on {locator}",
            action.name()
        ))),
        Err(e) => Ok(super::failure(action.name(), &e)),
    }
}
