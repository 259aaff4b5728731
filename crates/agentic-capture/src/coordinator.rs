//! Orchestrates one acquisition: arm, click, race, resolve, store, tear down.

use std::sync::Arc;

use tokio::time::Instant;

use crate::actuator;
use crate::config::CaptureConfig;
use crate::driver::{BrowserDriver, BrowsingContext, PageHandle};
use crate::error::{CaptureError, CaptureResult, ResolveError};
use crate::mime::{self, TargetMedia};
use crate::persist::{self, PersistTarget};
use crate::policy::{Strategy, StrategyPolicy};
use crate::resolver::ContentResolver;
use crate::session::SessionCloner;
use crate::signals::{self, ArmedSignals};
use crate::store::ArtifactStore;
use crate::types::{
    AcquisitionReport, ActionTrigger, RankedCandidate, ResolvedArtifact, StoredArtifact, UiAction,
};

/// Lifecycle of one acquisition call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Armed,
    Triggered,
    Racing,
    Resolving,
    Done,
}

/// Everything one acquisition call needs besides the browser.
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    pub trigger: ActionTrigger,
    /// Store key. Generated from the artifact when absent.
    pub name: Option<String>,
    pub media: TargetMedia,
    pub policy: StrategyPolicy,
    pub persist: Option<PersistTarget>,
}

impl AcquisitionRequest {
    pub fn new(trigger: ActionTrigger, policy: StrategyPolicy) -> Self {
        Self {
            trigger,
            name: None,
            media: TargetMedia::default(),
            policy,
            persist: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_media(mut self, media: TargetMedia) -> Self {
        self.media = media;
        self
    }

    pub fn with_persist(mut self, target: PersistTarget) -> Self {
        self.persist = Some(target);
        self
    }
}

/// Runs acquisitions against contexts of one driver, writing results into
/// one store.
pub struct AcquisitionCoordinator {
    driver: Arc<dyn BrowserDriver>,
    store: ArtifactStore,
    config: CaptureConfig,
}

struct Tracker {
    phase: Phase,
    started: Instant,
}

impl Tracker {
    fn advance(&mut self, next: Phase) {
        tracing::debug!(
            from = ?self.phase,
            to = ?next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Acquisition phase"
        );
        self.phase = next;
    }
}

impl AcquisitionCoordinator {
    pub fn new(driver: Arc<dyn BrowserDriver>, store: ArtifactStore, config: CaptureConfig) -> Self {
        Self {
            driver,
            store,
            config,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    /// Clicks the trigger on `page` and returns the best artifact any
    /// signal source produced before the deadline.
    ///
    /// Every auxiliary context opened during the call is closed before this
    /// returns, whatever the outcome.
    pub async fn acquire(
        &self,
        context: &Arc<dyn BrowsingContext>,
        page: &Arc<dyn PageHandle>,
        request: AcquisitionRequest,
    ) -> CaptureResult<AcquisitionReport> {
        let started = Instant::now();
        let deadline = started + request.trigger.wait;
        let mut tracker = Tracker {
            phase: Phase::Idle,
            started,
        };
        tracing::info!(
            locator = %request.trigger.locator,
            wait_ms = request.trigger.wait.as_millis() as u64,
            "Starting acquisition"
        );

        let cloner = SessionCloner::new(Arc::clone(&self.driver));
        let armed = ArmedSignals::arm(context, page, &request.policy, &request.media, deadline).await;
        tracker.advance(Phase::Armed);

        let result = self
            .run(context, page, &request, &armed, &cloner, deadline, &mut tracker)
            .await;

        armed.disarm(page.as_ref()).await;
        if self.config.close_spawned_pages {
            for spawned in armed.spawned_pages().await {
                if spawned.id() != page.id() && !spawned.is_closed() {
                    if let Err(e) = spawned.close().await {
                        tracing::debug!(page = spawned.id(), error = %e, "Could not close spawned page");
                    }
                }
            }
        }
        cloner.close_all().await;
        tracker.advance(Phase::Done);

        match &result {
            Ok(report) => tracing::info!(
                strategy = %report.strategy,
                url = report.source_url.as_deref().unwrap_or(""),
                elapsed_ms = report.elapsed_ms,
                "Acquisition succeeded"
            ),
            Err(e) => tracing::warn!(kind = e.kind(), error = %e, "Acquisition failed"),
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        context: &Arc<dyn BrowsingContext>,
        page: &Arc<dyn PageHandle>,
        request: &AcquisitionRequest,
        armed: &ArmedSignals,
        cloner: &SessionCloner,
        deadline: Instant,
        tracker: &mut Tracker,
    ) -> CaptureResult<AcquisitionReport> {
        let policy = &request.policy;

        actuator::act(page.as_ref(), &request.trigger.locator, &UiAction::Click).await?;
        tracker.advance(Phase::Triggered);

        tracker.advance(Phase::Racing);
        if let Some(strategy) = armed.race(policy, deadline).await {
            let settle = policy
                .settle
                .min(deadline.saturating_duration_since(Instant::now()));
            tracing::debug!(%strategy, settle_ms = settle.as_millis() as u64, "Early exit");
            tokio::time::sleep(settle).await;
        }

        tracker.advance(Phase::Resolving);
        let pool = armed.collect(page, policy, &request.media).await;
        let candidates = signals::rank(pool, policy);
        tracing::debug!(count = candidates.len(), "Ranked candidates");
        if candidates.is_empty() {
            return Err(CaptureError::NoArtifactFound {
                reason: format!(
                    "no capture technique produced a candidate within {}ms",
                    request.trigger.wait.as_millis()
                ),
                best_url: None,
            });
        }

        if !policy.resolve_bytes {
            return self.report_url(&candidates, tracker.started);
        }

        let resolver = ContentResolver {
            source: context,
            origin: page,
            cloner,
            media: &request.media,
            config: &self.config,
            prefer_cloned_session: policy.prefer_cloned_session,
        };

        let mut attempted = Vec::new();
        let mut first_error: Option<ResolveError> = None;
        for candidate in &candidates {
            match resolver.resolve(&candidate.signal).await {
                Ok(artifact) => {
                    return self
                        .finish(candidate.strategy, artifact, request, attempted, tracker.started)
                        .await;
                }
                Err(e) => {
                    tracing::warn!(strategy = %candidate.strategy, error = %e, "Candidate rejected");
                    if let Some(url) = candidate.signal.url() {
                        attempted.push(url.to_string());
                    }
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(ResolveError::DownloadTimeout { url, waited_ms }) => {
                Err(CaptureError::DownloadTimeout { url, waited_ms })
            }
            Some(e) => Err(CaptureError::NoArtifactFound {
                reason: format!("{} candidate(s) rejected; first: {e}", candidates.len()),
                best_url: attempted.first().cloned(),
            }),
            None => Err(CaptureError::NoArtifactFound {
                reason: "no candidate could be resolved".into(),
                best_url: None,
            }),
        }
    }

    fn report_url(
        &self,
        candidates: &[RankedCandidate],
        started: Instant,
    ) -> CaptureResult<AcquisitionReport> {
        let winner = candidates
            .iter()
            .find_map(|c| c.signal.url().map(|url| (c.strategy, url.to_string())));
        match winner {
            Some((strategy, url)) => Ok(AcquisitionReport {
                strategy,
                source_url: Some(url),
                artifact: None,
                saved_to: None,
                attempted: Vec::new(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
            None => Err(CaptureError::NoArtifactFound {
                reason: "candidates carried no URL".into(),
                best_url: None,
            }),
        }
    }

    async fn finish(
        &self,
        strategy: Strategy,
        artifact: ResolvedArtifact,
        request: &AcquisitionRequest,
        attempted: Vec<String>,
        started: Instant,
    ) -> CaptureResult<AcquisitionReport> {
        // Saved before stored: a failed write leaves no artifact behind.
        let saved_to = match &request.persist {
            Some(target) => {
                match persist::persist(&artifact, target, chrono::Local::now().date_naive()).await {
                    Ok(path) => Some(path),
                    Err(source) => {
                        if let Some(temp) = &artifact.temp_path {
                            persist::remove_temp(temp).await;
                        }
                        return Err(CaptureError::Persist {
                            directory: target.directory.clone(),
                            source_url: artifact.source_url.clone(),
                            source,
                        });
                    }
                }
            }
            None => {
                if let Some(temp) = &artifact.temp_path {
                    persist::remove_temp(temp).await;
                }
                None
            }
        };

        let name = request
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_name(&artifact));
        let record = self
            .store
            .put(&name, artifact.bytes.clone(), &artifact.mime_type);

        Ok(AcquisitionReport {
            strategy,
            source_url: artifact.source_url.clone(),
            artifact: Some(StoredArtifact {
                name: record.name,
                mime_type: record.mime_type,
                size: record.size,
            }),
            saved_to,
            attempted,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// The server's suggested file name, or a timestamped one.
fn default_name(artifact: &ResolvedArtifact) -> String {
    if let Some(suggested) = artifact.suggested_filename.as_deref() {
        if !suggested.is_empty() {
            return suggested.to_string();
        }
    }
    let ext = mime::extension_for_mime(&artifact.mime_type).unwrap_or("bin");
    format!("capture-{}.{}", chrono::Utc::now().format("%Y%m%d-%H%M%S%3f"), ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(suggested: Option<&str>) -> ResolvedArtifact {
        ResolvedArtifact {
            bytes: vec![],
            mime_type: "application/pdf".into(),
            source_url: None,
            suggested_filename: suggested.map(str::to_string),
            temp_path: None,
        }
    }

    #[test]
    fn test_default_name_prefers_suggested() {
        assert_eq!(default_name(&artifact(Some("cert.pdf"))), "cert.pdf");
        let generated = default_name(&artifact(None));
        assert!(generated.starts_with("capture-"));
        assert!(generated.ends_with(".pdf"));
    }
}
