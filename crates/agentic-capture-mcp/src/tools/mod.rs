//! MCP tool implementations.

pub mod browser_action;
pub mod browser_navigate;
pub mod browser_screenshot;
pub mod browser_wait;
pub mod click_and_capture;
pub mod download_file;
pub mod registry;

pub use click_and_capture::CaptureVariant;
pub use registry::ToolRegistry;

use crate::session::SessionError;
use crate::types::ToolCallResult;

/// Renders an engine failure as an error result the client can show.
pub(crate) fn failure(context: &str, error: &SessionError) -> ToolCallResult {
    let kind = match error {
        SessionError::Capture(e) => e.kind(),
        SessionError::Action(_) => "action_error",
        SessionError::Resolve(_) => "resolve_error",
        SessionError::Browser(_) => "browser_unavailable",
        SessionError::Io(_) => "io_error",
    };
    let mut text = format!("{context} failed ({kind}): {error}");
    if let Some(url) = error.best_url() {
        text.push_str(&format!("\nBest known URL: {url}"));
    }
    ToolCallResult::error(text)
}
