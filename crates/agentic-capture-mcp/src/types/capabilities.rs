//! `initialize` handshake payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MCP_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "agentic-capture-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const INSTRUCTIONS: &str = "AgenticCapture drives a browser for you. \
    Use browser_* tools to navigate and interact with pages. \
    When a button produces a file, use one of the browser_click_and_* tools \
    instead of browser_click so the file is captured. \
    Captured files are listed as artifact:// resources.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    /// Kept opaque; the server does not act on any client capability.
    #[serde(default)]
    pub capabilities: Value,
    pub client_info: Implementation,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChanged {
    pub list_changed: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    pub subscribe: bool,
    pub list_changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    pub tools: ListChanged,
    pub resources: ResourcesCapability,
    pub prompts: ListChanged,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: Implementation,
    pub instructions: String,
}

impl InitializeResult {
    /// The fixed answer of this server. Only the resource list changes at
    /// runtime, as artifacts are captured.
    pub fn capture_server() -> Self {
        Self {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ListChanged::default(),
                resources: ResourcesCapability {
                    subscribe: false,
                    list_changed: true,
                },
                prompts: ListChanged::default(),
            },
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            instructions: INSTRUCTIONS.to_string(),
        }
    }
}
