//! The six click-and-capture tools. They share one argument shape and one
//! coordinator and differ only in strategy policy.

use std::sync::Arc;
use std::time::Duration;

use agentic_capture::{
    AcquisitionReport, AcquisitionRequest, ActionTrigger, Locator, PersistTarget, StrategyPolicy,
    TargetMedia,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::DEFAULT_PREFIX;
use crate::session::CaptureSessionManager;
use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

/// Longest deadline a caller may ask for.
pub const MAX_WAIT_MS: u64 = 120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureVariant {
    Capture,
    NewTab,
    ForceDownload,
    Authenticated,
    ExtractUrl,
    DownloadToPath,
}

impl CaptureVariant {
    pub const ALL: [CaptureVariant; 6] = [
        CaptureVariant::Capture,
        CaptureVariant::NewTab,
        CaptureVariant::ForceDownload,
        CaptureVariant::Authenticated,
        CaptureVariant::ExtractUrl,
        CaptureVariant::DownloadToPath,
    ];

    pub fn tool_name(&self) -> &'static str {
        match self {
            CaptureVariant::Capture => "browser_click_and_capture",
            CaptureVariant::NewTab => "browser_click_and_capture_new_tab",
            CaptureVariant::ForceDownload => "browser_click_and_force_download",
            CaptureVariant::Authenticated => "browser_click_and_download_authenticated",
            CaptureVariant::ExtractUrl => "browser_click_and_extract_url",
            CaptureVariant::DownloadToPath => "browser_click_and_download_to_path",
        }
    }

    pub fn from_tool_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.tool_name() == name)
    }

    pub fn policy(&self) -> StrategyPolicy {
        match self {
            CaptureVariant::Capture => StrategyPolicy::capture(),
            CaptureVariant::NewTab => StrategyPolicy::capture_new_tab(),
            CaptureVariant::ForceDownload => StrategyPolicy::force_download(),
            CaptureVariant::Authenticated => StrategyPolicy::download_authenticated(),
            CaptureVariant::ExtractUrl => StrategyPolicy::extract_url(),
            CaptureVariant::DownloadToPath => StrategyPolicy::download_to_path(),
        }
    }

    fn description(&self) -> &'static str {
        match self {
            CaptureVariant::Capture => {
                "Click an element and capture the file it produces, whether it downloads, \
                 opens a new page, or redirects the current one"
            }
            CaptureVariant::NewTab => {
                "Click an element that opens the document in a new tab and capture it"
            }
            CaptureVariant::ForceDownload => {
                "Click an element and capture its file using every technique, including \
                 network responses, new links and script URLs"
            }
            CaptureVariant::Authenticated => {
                "Click an element and download the file through a browser context carrying \
                 the current session's cookies"
            }
            CaptureVariant::ExtractUrl => {
                "Click an element and return the URL of the file it would open, without \
                 downloading it. Pass the URL to download_file."
            }
            CaptureVariant::DownloadToPath => {
                "Click an element, capture the file, and save it to the download directory \
                 under a dated name"
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureParams {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    button_text: Option<String>,
    #[serde(default)]
    wait_time: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    prefix: Option<String>,
}

pub fn definition(variant: CaptureVariant) -> ToolDefinition {
    let mut properties = json!({
        "selector": { "type": "string", "description": "CSS selector of the trigger" },
        "buttonText": { "type": "string", "description": "Visible text of the trigger" },
        "waitTime": {
            "type": "integer",
            "description": "Milliseconds to wait for the file (default 20000)",
            "minimum": 0,
            "maximum": MAX_WAIT_MS
        },
        "name": { "type": "string", "description": "Artifact name for the captured file" },
        "fileType": { "type": "string", "description": "Expected file type, e.g. pdf (default)" }
    });
    if variant == CaptureVariant::DownloadToPath {
        if let Some(props) = properties.as_object_mut() {
            props.insert(
                "directory".to_string(),
                json!({ "type": "string", "description": "Target directory (default: download directory)" }),
            );
            props.insert(
                "prefix".to_string(),
                json!({ "type": "string", "description": "File name prefix (default: download)" }),
            );
        }
    }
    ToolDefinition::new(
        variant.tool_name(),
        variant.description(),
        json!({ "type": "object", "properties": properties }),
    )
}

pub async fn execute(
    variant: CaptureVariant,
    args: Value,
    session: &Arc<CaptureSessionManager>,
) -> McpResult<ToolCallResult> {
    let params: CaptureParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;

    let locator = Locator::new(params.selector, params.button_text);
    if locator.is_empty() {
        return Err(McpError::InvalidParams(
            "Provide 'selector', 'buttonText', or both".to_string(),
        ));
    }
    let media = match params.file_type.as_deref() {
        Some(file_type) => TargetMedia::from_file_type(file_type)
            .ok_or_else(|| McpError::InvalidParams(format!("Unknown fileType: {file_type}")))?,
        None => TargetMedia::default(),
    };
    let config = &session.config().capture;
    let wait = params
        .wait_time
        .map(|ms| Duration::from_millis(ms.min(MAX_WAIT_MS)))
        .unwrap_or_else(|| config.default_wait());

    let mut request = AcquisitionRequest::new(
        ActionTrigger::new(locator, wait),
        variant.policy().with_settle(config.settle()),
    )
    .with_media(media);
    if let Some(name) = params.name.filter(|n| !n.trim().is_empty()) {
        request = request.with_name(name);
    }
    if variant == CaptureVariant::DownloadToPath {
        let directory = params
            .directory
            .filter(|d| !d.trim().is_empty())
            .map(Into::into)
            .unwrap_or_else(|| session.config().download_dir.clone());
        let prefix = params.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        request = request.with_persist(PersistTarget::new(directory, prefix));
    }

    match session.acquire(request).await {
        Ok(report) => Ok(render(variant, &report)),
        Err(e) => Ok(super::failure(variant.tool_name(), &e)),
    }
}

fn render(variant: CaptureVariant, report: &AcquisitionReport) -> ToolCallResult {
    if variant == CaptureVariant::ExtractUrl {
        return ToolCallResult::json(&json!({
            "url": report.source_url,
            "strategy": report.strategy,
            "elapsed_ms": report.elapsed_ms,
        }));
    }
    ToolCallResult::json(&json!({
        "strategy": report.strategy,
        "source_url": report.source_url,
        "artifact": report.artifact,
        "resource": report.artifact.as_ref().map(|a| format!("artifact://{}", a.name)),
        "saved_to": report.saved_to,
        "attempted": report.attempted,
        "elapsed_ms": report.elapsed_ms,
    }))
}
