//! `prompts/*` payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tools::ToolContent;

#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl PromptArgument {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, description)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptDefinition {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptListResult {
    pub prompts: Vec<PromptDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptGetParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: ToolContent,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptGetResult {
    pub description: String,
    pub messages: Vec<PromptMessage>,
}

impl PromptGetResult {
    /// A prompt made of a single user turn.
    pub fn user(description: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            messages: vec![PromptMessage {
                role: "user",
                content: ToolContent::Text { text: text.into() },
            }],
        }
    }
}
