//! Signal sources raced against one deadline after a trigger click.
//!
//! Each source is armed before the click and collects candidates in the
//! background. The race ends at the deadline or, when early exit is on, at the
//! first definitive signal. Candidates are then ranked by the call's policy.

pub mod dom;
pub mod download;
pub mod hook;
pub mod network;
pub mod new_page;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::driver::{BrowsingContext, PageHandle};
use crate::mime::TargetMedia;
use crate::patterns;
use crate::policy::{Strategy, StrategyPolicy};
use crate::types::{CandidateSignal, RankedCandidate};

use self::dom::LinkSnapshot;
use self::download::DownloadWatcher;
use self::hook::NavigationHook;
use self::network::NetworkRecorder;
use self::new_page::NewPageWatcher;

/// Drains a stream into a shared list on a background task.
pub(crate) struct Collector<T> {
    items: Arc<Mutex<Vec<T>>>,
    count: watch::Receiver<usize>,
    task: JoinHandle<()>,
}

impl<T: Clone + Send + 'static> Collector<T> {
    pub(crate) fn spawn<S>(stream: S, source: &'static str) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let items = Arc::new(Mutex::new(Vec::new()));
        let (tx, count) = watch::channel(0usize);
        let sink = Arc::clone(&items);
        let task = tokio::spawn(async move {
            futures::pin_mut!(stream);
            while let Some(item) = stream.next().await {
                let len = {
                    let mut guard = sink.lock().await;
                    guard.push(item);
                    guard.len()
                };
                tracing::debug!(source, len, "Signal received");
                tx.send_replace(len);
            }
        });
        Self { items, count, task }
    }

    /// Resolves once at least one item has arrived. Never resolves if the
    /// source ends without producing anything.
    pub(crate) async fn fired(&self) {
        let mut count = self.count.clone();
        if count.wait_for(|n| *n > 0).await.is_err() {
            futures::future::pending::<()>().await;
        }
    }

    pub(crate) async fn snapshot(&self) -> Vec<T> {
        self.items.lock().await.clone()
    }

    pub(crate) fn stop(&self) {
        self.task.abort();
    }
}

impl<T> Drop for Collector<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Candidates gathered after the race, grouped by strategy.
#[derive(Debug, Default)]
pub struct CandidatePool {
    pub by_strategy: HashMap<Strategy, Vec<CandidateSignal>>,
    /// New pages that showed no sign of holding the document. Tried last.
    pub weak_pages: Vec<CandidateSignal>,
}

impl CandidatePool {
    pub fn push(&mut self, strategy: Strategy, signal: CandidateSignal) {
        self.by_strategy.entry(strategy).or_default().push(signal);
    }

    pub fn is_empty(&self) -> bool {
        self.by_strategy.values().all(Vec::is_empty) && self.weak_pages.is_empty()
    }
}

/// Orders candidates by the policy's ranking, dropping repeated URLs.
pub fn rank(mut pool: CandidatePool, policy: &StrategyPolicy) -> Vec<RankedCandidate> {
    let mut seen = HashSet::new();
    let mut ranked = Vec::new();
    let mut push = |strategy: Strategy, signal: CandidateSignal| {
        if let Some(url) = signal.url() {
            if !seen.insert(url.to_string()) {
                return;
            }
        }
        ranked.push(RankedCandidate { strategy, signal });
    };

    for strategy in &policy.ranking {
        for signal in pool.by_strategy.remove(strategy).unwrap_or_default() {
            push(*strategy, signal);
        }
    }
    if policy.arms(Strategy::NewPage) {
        for signal in pool.weak_pages.drain(..) {
            push(Strategy::NewPage, signal);
        }
    }
    ranked
}

/// Every source armed for one acquisition call.
pub struct ArmedSignals {
    downloads: Option<DownloadWatcher>,
    pages: Option<NewPageWatcher>,
    network: Option<NetworkRecorder>,
    hook: Option<NavigationHook>,
    links_before: Option<LinkSnapshot>,
    start_url: Option<String>,
}

impl ArmedSignals {
    /// Arms the sources the policy ranks. A source that fails to arm is
    /// logged and left out; the others still run.
    pub async fn arm(
        context: &Arc<dyn BrowsingContext>,
        page: &Arc<dyn PageHandle>,
        policy: &StrategyPolicy,
        media: &TargetMedia,
        deadline: Instant,
    ) -> Self {
        let mut armed = Self {
            downloads: None,
            pages: None,
            network: None,
            hook: None,
            links_before: None,
            start_url: None,
        };

        if policy.arms(Strategy::NativeDownload) {
            armed.downloads = DownloadWatcher::arm(context.as_ref())
                .await
                .map_err(|e| tracing::warn!(error = %e, "Download watcher not armed"))
                .ok();
        }
        if policy.arms(Strategy::NewPage) {
            armed.pages = NewPageWatcher::arm(context.as_ref(), deadline, media)
                .await
                .map_err(|e| tracing::warn!(error = %e, "New-page watcher not armed"))
                .ok();
        }
        if policy.arms(Strategy::NetworkResponse) {
            armed.network = NetworkRecorder::arm(page.as_ref())
                .await
                .map_err(|e| tracing::warn!(error = %e, "Network recorder not armed"))
                .ok();
        }
        if policy.arms(Strategy::HookedUrl) {
            armed.hook = NavigationHook::install(page.as_ref(), media)
                .await
                .map_err(|e| tracing::warn!(error = %e, "Navigation hook not installed"))
                .ok();
        }
        if policy.arms(Strategy::DomLink) {
            armed.links_before = LinkSnapshot::capture(page.as_ref())
                .await
                .map_err(|e| tracing::warn!(error = %e, "Link snapshot failed"))
                .ok();
        }
        if policy.arms(Strategy::CurrentPageRedirect) || policy.arms(Strategy::ScriptLiteral) {
            armed.start_url = page.url().await.ok();
        }
        armed
    }

    /// Waits for the deadline or, with early exit, the first definitive signal:
    /// a download, a new page showing the target, or a hooked URL.
    pub async fn race(&self, policy: &StrategyPolicy, deadline: Instant) -> Option<Strategy> {
        if !policy.early_exit {
            tokio::time::sleep_until(deadline).await;
            return None;
        }

        let download = async {
            match &self.downloads {
                Some(d) => d.fired().await,
                None => futures::future::pending().await,
            }
        };
        let page = async {
            match &self.pages {
                Some(p) => p.fired_with_evidence().await,
                None => futures::future::pending().await,
            }
        };
        let hook = async {
            match &self.hook {
                Some(h) => h.fired().await,
                None => futures::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = download => Some(Strategy::NativeDownload),
            _ = page => Some(Strategy::NewPage),
            _ = hook => Some(Strategy::HookedUrl),
            _ = tokio::time::sleep_until(deadline) => None,
        }
    }

    /// Snapshots every armed source into a pool of candidates.
    pub async fn collect(
        &self,
        page: &Arc<dyn PageHandle>,
        policy: &StrategyPolicy,
        media: &TargetMedia,
    ) -> CandidatePool {
        let mut pool = CandidatePool::default();

        if let Some(downloads) = &self.downloads {
            for handle in downloads.snapshot().await {
                pool.push(Strategy::NativeDownload, CandidateSignal::NativeDownload { handle });
            }
        }

        if let Some(pages) = &self.pages {
            for (signal, evidence) in pages.candidates(media).await {
                if evidence {
                    pool.push(Strategy::NewPage, signal);
                } else {
                    pool.weak_pages.push(signal);
                }
            }
        }

        let current_url = page.url().await.unwrap_or_default();

        if policy.arms(Strategy::CurrentPageRedirect) {
            if let Some(signal) = self.redirect_candidate(page, &current_url, media).await {
                pool.push(Strategy::CurrentPageRedirect, signal);
            }
        }

        if let Some(hook) = &self.hook {
            for url in hook.urls().await {
                pool.push(Strategy::HookedUrl, CandidateSignal::HookedUrl { url });
            }
        }

        if let Some(network) = &self.network {
            for url in network.candidates(media).await {
                pool.push(Strategy::NetworkResponse, CandidateSignal::ResponseUrl { url });
            }
        }

        if let Some(before) = &self.links_before {
            match page.links().await {
                Ok(after) => {
                    for url in before.new_links(&after, &current_url, media) {
                        pool.push(Strategy::DomLink, CandidateSignal::LinkUrl { url });
                    }
                }
                Err(e) => tracing::debug!(error = %e, "Could not read links after click"),
            }
        }

        if policy.arms(Strategy::ScriptLiteral) {
            for url in dom::script_literals(page.as_ref(), &current_url, media).await {
                pool.push(Strategy::ScriptLiteral, CandidateSignal::LinkUrl { url });
            }
        }

        pool
    }

    async fn redirect_candidate(
        &self,
        page: &Arc<dyn PageHandle>,
        current_url: &str,
        media: &TargetMedia,
    ) -> Option<CandidateSignal> {
        if current_url.is_empty() || Some(current_url) == self.start_url.as_deref() {
            return None;
        }
        let evidence = patterns::is_target_url(current_url, media)
            || page
                .document_info()
                .await
                .ok()
                .and_then(|info| info.content_type)
                .is_some_and(|ct| media.matches_content_type(&ct));
        evidence.then(|| CandidateSignal::NewPage {
            page: Arc::clone(page),
            url: current_url.to_string(),
        })
    }

    /// Pages the click opened.
    pub async fn spawned_pages(&self) -> Vec<Arc<dyn PageHandle>> {
        match &self.pages {
            Some(p) => p.pages().await,
            None => Vec::new(),
        }
    }

    /// Stops every collector and neutralises the hook. Safe to call on any
    /// exit path; failures are only logged.
    pub async fn disarm(&self, page: &dyn PageHandle) {
        if let Some(downloads) = &self.downloads {
            downloads.stop();
        }
        if let Some(pages) = &self.pages {
            pages.stop();
        }
        if let Some(network) = &self.network {
            network.stop();
        }
        if let Some(hook) = &self.hook {
            hook.deactivate(page).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_signal(url: &str) -> CandidateSignal {
        CandidateSignal::ResponseUrl { url: url.into() }
    }

    #[test]
    fn test_rank_follows_policy_order() {
        let mut pool = CandidatePool::default();
        pool.push(Strategy::NetworkResponse, url_signal("https://a.test/r.pdf"));
        pool.push(
            Strategy::HookedUrl,
            CandidateSignal::HookedUrl {
                url: "https://a.test/h.pdf".into(),
            },
        );
        let ranked = rank(pool, &StrategyPolicy::capture());
        let order: Vec<_> = ranked.iter().map(|c| c.strategy).collect();
        assert_eq!(order, vec![Strategy::HookedUrl, Strategy::NetworkResponse]);
    }

    #[test]
    fn test_rank_drops_unranked_and_duplicates() {
        let mut pool = CandidatePool::default();
        pool.push(
            Strategy::DomLink,
            CandidateSignal::LinkUrl {
                url: "https://a.test/x.pdf".into(),
            },
        );
        pool.push(Strategy::NetworkResponse, url_signal("https://a.test/x.pdf"));
        pool.push(Strategy::NetworkResponse, url_signal("https://a.test/x.pdf"));
        let ranked = rank(pool, &StrategyPolicy::capture());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].strategy, Strategy::NetworkResponse);
    }

    #[test]
    fn test_empty_pool() {
        let pool = CandidatePool::default();
        assert!(pool.is_empty());
        assert!(rank(pool, &StrategyPolicy::force_download()).is_empty());
    }

    #[tokio::test]
    async fn test_collector_fires_and_snapshots() {
        let collector = Collector::spawn(futures::stream::iter(vec![1, 2, 3]), "test");
        collector.fired().await;
        tokio::task::yield_now().await;
        let items = collector.snapshot().await;
        assert!(!items.is_empty());
        assert_eq!(items[0], 1);
    }

    #[tokio::test]
    async fn test_collector_without_items_never_fires() {
        let collector = Collector::<u8>::spawn(futures::stream::empty(), "test");
        let fired = tokio::time::timeout(std::time::Duration::from_millis(20), collector.fired()).await;
        assert!(fired.is_err());
    }
}
