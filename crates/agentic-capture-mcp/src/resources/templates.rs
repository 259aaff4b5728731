//! Resource URI templates and static resource definitions.

use crate::types::{ResourceDefinition, ResourceTemplateDefinition};

use super::{console, stats};

pub fn list_templates() -> Vec<ResourceTemplateDefinition> {
    vec![ResourceTemplateDefinition {
        uri_template: format!("{}{{name}}", super::artifact::SCHEME),
        name: "Captured Artifact".to_string(),
        description: Some("A file captured by a browser tool".to_string()),
        mime_type: None,
    }]
}

fn fixed(uri: &str, name: &str, description: &str, mime_type: &str) -> ResourceDefinition {
    ResourceDefinition {
        uri: uri.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        mime_type: Some(mime_type.to_string()),
    }
}

pub fn list_resources() -> Vec<ResourceDefinition> {
    vec![
        fixed(
            console::URI,
            "Browser Console",
            "Recent console output of the browser page",
            "text/plain",
        ),
        fixed(
            stats::URI,
            "Capture Statistics",
            "Acquisition counters and browser state",
            "application/json",
        ),
    ]
}
