//! Tool: download_file. Fetch a URL with the browser session's cookies and
//! save it under a dated name.

use std::path::PathBuf;
use std::sync::Arc;

use agentic_capture::{PersistTarget, TargetMedia};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::DEFAULT_PREFIX;
use crate::session::CaptureSessionManager;
use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadParams {
    url: String,
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    file_type: Option<String>,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition::new(
        "download_file",
        "Download a file from a URL using the browser's logged-in session",
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "URL of the file" },
                "directory": { "type": "string", "description": "Target directory (default: download directory)" },
                "prefix": { "type": "string", "description": "File name prefix (default: download)" },
                "fileType": { "type": "string", "description": "Expected file type, e.g. pdf (default)" }
            },
            "required": ["url"]
        }),
    )
}

pub async fn execute(
    args: Value,
    session: &Arc<CaptureSessionManager>,
) -> McpResult<ToolCallResult> {
    let params: DownloadParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;
    if params.url.trim().is_empty() {
        return Err(McpError::InvalidParams("'url' must not be empty".to_string()));
    }
    let media = match params.file_type.as_deref() {
        Some(file_type) => TargetMedia::from_file_type(file_type)
            .ok_or_else(|| McpError::InvalidParams(format!("Unknown fileType: {file_type}")))?,
        None => TargetMedia::default(),
    };
    let directory = params
        .directory
        .filter(|d| !d.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| session.config().download_dir.clone());
    let target = PersistTarget::new(
        directory,
        params.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
    );

    match session.download_file(&params.url, &media, &target).await {
        Ok(saved) => Ok(ToolCallResult::json(&json!({
            "saved_to": saved.path,
            "artifact": saved.artifact,
            "resource": format!("artifact://{}", saved.artifact.name),
            "source_url": saved.source_url,
        }))),
        Err(e) => Ok(super::failure("download_file", &e)),
    }
}
