//! Prompt: recover_download. Next steps after a failed capture.

use serde_json::Value;

use crate::types::{McpResult, PromptGetResult};

pub fn expand(args: Value) -> McpResult<PromptGetResult> {
    let best_url = args
        .get("best_url")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let url_step = if best_url.is_empty() {
        "2. Use browser_click_and_extract_url to find out where the trigger points\n".to_string()
    } else {
        format!("2. Pass {best_url} to download_file, which reuses the browser's cookies\n")
    };

    let text = format!(
        "A file capture failed and I need to recover it.\n\n\
         Please:\n\
         1. Read console://logs for errors raised by the page\n\
         {url_step}\
         3. Take a browser_screenshot to check the trigger is visible and unique\n\
         4. If the trigger matched several elements, narrow it with a selector\n\
         5. Retry with a longer waitTime if the server is slow"
    );

    Ok(PromptGetResult::user("Recover a failed file capture", text))
}
