//! Resource: artifact://{name}

use agentic_capture::ArtifactStore;

use crate::types::{McpError, McpResult, ReadResourceResult, ResourceContent, ResourceDefinition};

pub const SCHEME: &str = "artifact://";

pub fn uri(name: &str) -> String {
    format!("{SCHEME}{name}")
}

pub fn list(store: &ArtifactStore) -> Vec<ResourceDefinition> {
    store
        .list()
        .into_iter()
        .map(|record| ResourceDefinition {
            uri: uri(&record.name),
            description: Some(format!(
                "{} bytes, captured {}",
                record.size,
                record.created_at.to_rfc3339()
            )),
            name: record.name,
            mime_type: Some(record.mime_type),
        })
        .collect()
}

/// Textual bodies go out as `text`, everything else as base64 `blob`.
pub fn read(name: &str, store: &ArtifactStore) -> McpResult<ReadResourceResult> {
    let record = store
        .get(name)
        .ok_or_else(|| McpError::ArtifactNotFound(name.to_string()))?;

    let content = if is_textual(&record.mime_type) {
        match String::from_utf8(record.bytes) {
            Ok(text) => ResourceContent::text(uri(name), &record.mime_type, text),
            Err(e) => ResourceContent::blob(uri(name), &record.mime_type, e.as_bytes()),
        }
    } else {
        ResourceContent::blob(uri(name), &record.mime_type, &record.bytes)
    };
    Ok(content.into())
}

fn is_textual(mime_type: &str) -> bool {
    let mime = mime_type.to_ascii_lowercase();
    mime.starts_with("text/")
        || mime.ends_with("/json")
        || mime.ends_with("+json")
        || mime.ends_with("/xml")
        || mime.ends_with("+xml")
}
