//! Resource listing and dispatch.

use std::sync::Arc;

use crate::session::CaptureSessionManager;
use crate::types::{McpError, McpResult, ReadResourceResult, ResourceDefinition, ResourceTemplateDefinition};

use super::{artifact, console, stats, templates};

pub struct ResourceRegistry;

impl ResourceRegistry {
    pub fn list_templates() -> Vec<ResourceTemplateDefinition> {
        templates::list_templates()
    }

    /// Static resources followed by one entry per stored artifact.
    pub fn list_resources(session: &Arc<CaptureSessionManager>) -> Vec<ResourceDefinition> {
        let mut resources = templates::list_resources();
        resources.extend(artifact::list(session.store()));
        resources
    }

    pub async fn read(
        uri: &str,
        session: &Arc<CaptureSessionManager>,
    ) -> McpResult<ReadResourceResult> {
        if let Some(name) = uri.strip_prefix(artifact::SCHEME) {
            if name.is_empty() {
                return Err(McpError::InvalidParams(
                    "Artifact URI must be artifact://{name}".to_string(),
                ));
            }
            artifact::read(name, session.store())
        } else if uri == console::URI {
            console::read(session).await
        } else if uri == stats::URI {
            stats::read(session).await
        } else {
            Err(McpError::ResourceNotFound(uri.to_string()))
        }
    }
}
