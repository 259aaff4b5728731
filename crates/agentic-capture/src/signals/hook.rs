//! In-page navigation hook reporting URLs through an exposed callback.

use futures::StreamExt;

use super::Collector;
use crate::driver::PageHandle;
use crate::error::DriverResult;
use crate::mime::TargetMedia;
use crate::patterns;

pub struct NavigationHook {
    binding: String,
    urls: Collector<String>,
}

impl NavigationHook {
    /// Installs the hook under a per-call binding name so concurrent
    /// acquisitions on one page do not see each other's reports.
    pub async fn install(page: &dyn PageHandle, media: &TargetMedia) -> DriverResult<Self> {
        let binding = format!("__captureReport_{}", uuid::Uuid::new_v4().simple());
        let media = media.clone();
        let stream = page
            .install_hook(&binding, &media)
            .await?
            .filter(move |url| {
                let keep = patterns::is_target_url(url, &media);
                if !keep {
                    tracing::debug!(%url, "Hook report ignored");
                }
                futures::future::ready(keep)
            });
        Ok(Self {
            urls: Collector::spawn(stream, "hook"),
            binding,
        })
    }

    pub fn binding(&self) -> &str {
        &self.binding
    }

    pub async fn fired(&self) {
        self.urls.fired().await
    }

    /// Reported URLs in the order they arrived.
    pub async fn urls(&self) -> Vec<String> {
        self.urls.snapshot().await
    }

    /// Stops listening and overwrites the page callback with a no-op.
    pub async fn deactivate(&self, page: &dyn PageHandle) {
        self.urls.stop();
        if page.is_closed() {
            return;
        }
        if let Err(e) = page.deactivate_hook(&self.binding).await {
            tracing::debug!(binding = %self.binding, error = %e, "Hook deactivation failed");
        }
    }
}
