//! Resource: console://logs

use std::sync::Arc;

use crate::session::CaptureSessionManager;
use crate::types::{McpResult, ReadResourceResult, ResourceContent};

pub const URI: &str = "console://logs";

pub async fn read(session: &Arc<CaptureSessionManager>) -> McpResult<ReadResourceResult> {
    let text = session.console().render().await;
    Ok(ResourceContent::text(URI, "text/plain", text).into())
}
