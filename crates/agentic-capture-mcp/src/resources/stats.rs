//! Resource: capture://stats

use std::sync::Arc;

use crate::session::CaptureSessionManager;
use crate::types::{McpResult, ReadResourceResult, ResourceContent};

pub const URI: &str = "capture://stats";

pub async fn read(session: &Arc<CaptureSessionManager>) -> McpResult<ReadResourceResult> {
    let mut content = serde_json::to_value(session.stats().await)?;
    if let Some(obj) = content.as_object_mut() {
        obj.insert(
            "download_dir".to_string(),
            session.config().download_dir.display().to_string().into(),
        );
    }
    let text = serde_json::to_string_pretty(&content)?;
    Ok(ResourceContent::text(URI, "application/json", text).into())
}
