//! Native download events on a browsing context.

use std::sync::Arc;

use super::Collector;
use crate::driver::{BrowsingContext, DownloadHandle};
use crate::error::DriverResult;

pub struct DownloadWatcher {
    downloads: Collector<Arc<dyn DownloadHandle>>,
}

impl DownloadWatcher {
    pub async fn arm(context: &dyn BrowsingContext) -> DriverResult<Self> {
        let stream = context.subscribe_downloads().await?;
        Ok(Self {
            downloads: Collector::spawn(stream, "download"),
        })
    }

    pub async fn fired(&self) {
        self.downloads.fired().await
    }

    /// Downloads in the order they started.
    pub async fn snapshot(&self) -> Vec<Arc<dyn DownloadHandle>> {
        self.downloads.snapshot().await
    }

    pub fn stop(&self) {
        self.downloads.stop();
    }
}
