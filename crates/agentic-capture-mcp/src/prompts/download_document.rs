//! Prompt: download_document. Fetch the file behind a page button.

use std::sync::Arc;

use serde_json::Value;

use crate::session::CaptureSessionManager;
use crate::types::{McpError, McpResult, PromptGetResult};

pub fn expand(args: Value, session: &Arc<CaptureSessionManager>) -> McpResult<PromptGetResult> {
    let url = args
        .get("url")
        .and_then(|v| v.as_str())
        .ok_or_else(|| McpError::InvalidParams("url is required".to_string()))?;
    let button_text = args
        .get("button_text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| McpError::InvalidParams("button_text is required".to_string()))?;
    let file_type = args
        .get("file_type")
        .and_then(|v| v.as_str())
        .unwrap_or("pdf");

    let text = format!(
        "I need the {file_type} file behind the \"{button_text}\" button on {url}.\n\n\
         Please:\n\
         1. Use browser_navigate to open {url}\n\
         2. Call browser_click_and_capture with buttonText \"{button_text}\" and fileType \"{file_type}\"\n\
         3. If the file opens in a new tab, retry with browser_click_and_capture_new_tab\n\
         4. If nothing is captured, try browser_click_and_force_download, then \
            browser_click_and_download_authenticated for pages behind a login\n\
         5. To keep a copy on disk, use browser_click_and_download_to_path. \
            Files are saved under {dir}\n\
         6. Read the result from the artifact:// resource named in the response",
        dir = session.config().download_dir.display()
    );

    Ok(PromptGetResult::user(
        format!("Download a {file_type} from {url}"),
        text,
    ))
}
