//! Pages opened in the acquisition's context after the click.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::Collector;
use crate::driver::{BrowsingContext, PageHandle};
use crate::error::DriverResult;
use crate::mime::TargetMedia;
use crate::patterns;
use crate::types::CandidateSignal;

/// Pages settling their load at the same time.
const CONCURRENT_LOADS: usize = 8;

pub struct NewPageWatcher {
    /// Every page, recorded as soon as it opens.
    pages: Collector<Arc<dyn PageHandle>>,
    /// Pages that showed evidence of holding the target, in the order they did.
    trusted: Collector<String>,
}

impl NewPageWatcher {
    /// Pages are recorded the moment they open. Separately, each page gets
    /// half the budget left until `deadline` to finish loading; a load that
    /// fails or runs out of time is tolerated.
    pub async fn arm(
        context: &dyn BrowsingContext,
        deadline: Instant,
        media: &TargetMedia,
    ) -> DriverResult<Self> {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel::<Arc<dyn PageHandle>>();
        let stream = context.subscribe_pages().await?.map(move |page| {
            let _ = opened_tx.send(Arc::clone(&page));
            page
        });

        let media = media.clone();
        let settled = futures::stream::unfold(opened_rx, |mut rx| async move {
            rx.recv().await.map(|page| (page, rx))
        })
        .map(move |page| settle(page, deadline, media.clone()))
        .buffer_unordered(CONCURRENT_LOADS)
        .filter_map(futures::future::ready);

        Ok(Self {
            pages: Collector::spawn(stream, "new_page"),
            trusted: Collector::spawn(settled, "new_page_evidence"),
        })
    }

    /// Resolves once some new page shows evidence of holding the target.
    /// A page without evidence never ends the race on its own.
    pub async fn fired_with_evidence(&self) {
        self.trusted.fired().await
    }

    pub async fn pages(&self) -> Vec<Arc<dyn PageHandle>> {
        self.pages.snapshot().await
    }

    /// Open pages as candidates, each flagged with whether it shows
    /// evidence of holding the target document.
    pub async fn candidates(&self, media: &TargetMedia) -> Vec<(CandidateSignal, bool)> {
        let mut out = Vec::new();
        for page in self.pages().await {
            if page.is_closed() {
                continue;
            }
            let Ok(url) = page.url().await else {
                continue;
            };
            let evidence = has_evidence(page.as_ref(), &url, media).await;
            out.push((CandidateSignal::NewPage { page, url }, evidence));
        }
        out
    }

    pub fn stop(&self) {
        self.pages.stop();
        self.trusted.stop();
    }
}

/// URL of `page` once it shows evidence. The URL alone is checked before the
/// load wait so a telling address ends the race without waiting for the body.
async fn settle(page: Arc<dyn PageHandle>, deadline: Instant, media: TargetMedia) -> Option<String> {
    if let Ok(url) = page.url().await {
        if patterns::is_target_url(&url, &media) {
            return Some(url);
        }
    }

    let budget = deadline.saturating_duration_since(Instant::now()) / 2;
    if let Err(e) = page.wait_for_load(budget).await {
        tracing::debug!(page = page.id(), error = %e, "New page did not finish loading");
    }

    let url = page.url().await.ok()?;
    if has_evidence(page.as_ref(), &url, &media).await {
        Some(url)
    } else {
        tracing::debug!(page = page.id(), %url, "New page shows no sign of the document");
        None
    }
}

async fn has_evidence(page: &dyn PageHandle, url: &str, media: &TargetMedia) -> bool {
    if patterns::is_target_url(url, media) {
        return true;
    }
    match page.document_info().await {
        Ok(info) => {
            info.embedded_viewer
                || info
                    .content_type
                    .as_deref()
                    .is_some_and(|ct| media.matches_content_type(ct))
        }
        Err(_) => false,
    }
}
