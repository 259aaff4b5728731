//! Records a page's network traffic and picks out document responses.

use std::collections::HashSet;

use super::Collector;
use crate::driver::PageHandle;
use crate::error::DriverResult;
use crate::mime::{self, TargetMedia};
use crate::patterns;
use crate::types::{NetworkEvent, NetworkEventKind};

pub struct NetworkRecorder {
    events: Collector<NetworkEvent>,
}

impl NetworkRecorder {
    pub async fn arm(page: &dyn PageHandle) -> DriverResult<Self> {
        let stream = page.subscribe_network().await?;
        Ok(Self {
            events: Collector::spawn(stream, "network"),
        })
    }

    pub async fn events(&self) -> Vec<NetworkEvent> {
        self.events.snapshot().await
    }

    pub async fn candidates(&self, media: &TargetMedia) -> Vec<String> {
        response_candidates(&self.events().await, media)
    }

    pub fn stop(&self) {
        self.events.stop();
    }
}

/// URLs of successful responses that look like the target, most recent first.
pub fn response_candidates(events: &[NetworkEvent], media: &TargetMedia) -> Vec<String> {
    let mut seen = HashSet::new();
    events
        .iter()
        .rev()
        .filter(|e| e.kind == NetworkEventKind::Response)
        .filter(|e| e.status.is_some_and(|s| (200..300).contains(&s)))
        .filter(|e| is_document_response(e, media))
        .filter(|e| seen.insert(e.url.clone()))
        .map(|e| e.url.clone())
        .collect()
}

fn is_document_response(event: &NetworkEvent, media: &TargetMedia) -> bool {
    let content_type = event.content_type().and_then(mime::normalize_content_type);
    if content_type
        .as_deref()
        .is_some_and(|ct| media.matches_content_type(ct))
    {
        return true;
    }
    if let Some(disposition) = event.header("content-disposition") {
        let disposition = disposition.to_ascii_lowercase();
        if disposition.contains(&format!(".{}", media.extension)) {
            return true;
        }
    }
    // Extension, format query or export-style path, unless the server says
    // it is a web page or a script.
    let markup = content_type.as_deref().is_some_and(|ct| {
        ct.starts_with("text/html") || ct.contains("javascript") || ct.starts_with("text/css")
    });
    !markup && patterns::is_target_url(&event.url, media)
}
