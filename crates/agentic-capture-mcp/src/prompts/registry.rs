//! Prompt registration and dispatch.

use std::sync::Arc;

use serde_json::Value;

use crate::session::CaptureSessionManager;
use crate::types::{McpError, McpResult, PromptArgument, PromptDefinition, PromptGetResult};

use super::{download_document, recover_download};

pub struct PromptRegistry;

impl PromptRegistry {
    pub fn list_prompts() -> Vec<PromptDefinition> {
        vec![
            PromptDefinition {
                name: "download_document".to_string(),
                description: "Guide for fetching a file behind a button on a web page".to_string(),
                arguments: vec![
                    PromptArgument::required("url", "Page holding the trigger"),
                    PromptArgument::required("button_text", "Visible text of the trigger"),
                    PromptArgument::optional("file_type", "Expected file type (default pdf)"),
                ],
            },
            PromptDefinition {
                name: "recover_download".to_string(),
                description: "Guide for retrying a capture that failed".to_string(),
                arguments: vec![PromptArgument::optional(
                    "best_url",
                    "Best known URL reported by the failed call",
                )],
            },
        ]
    }

    pub fn get(
        name: &str,
        arguments: Option<Value>,
        session: &Arc<CaptureSessionManager>,
    ) -> McpResult<PromptGetResult> {
        let args = arguments.unwrap_or(Value::Object(serde_json::Map::new()));

        match name {
            "download_document" => download_document::expand(args, session),
            "recover_download" => recover_download::expand(args),
            _ => Err(McpError::PromptNotFound(name.to_string())),
        }
    }
}
