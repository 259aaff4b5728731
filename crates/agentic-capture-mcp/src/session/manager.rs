//! Browser lifecycle, the primary page, and the engine entry points tools call.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;

use agentic_capture::persist::{self, PersistTarget};
use agentic_capture::resolver::ContentResolver;
use agentic_capture::{
    act, AcquisitionCoordinator, AcquisitionReport, AcquisitionRequest, ActionError,
    ArtifactStore, BrowserDriver, BrowsingContext, CandidateSignal, CaptureError, ChromiumDriver,
    ChromiumOptions, ConsoleLog, DriverError, Locator, PageHandle, ResolveError, SessionCloner,
    StoredArtifact, TargetMedia, UiAction,
};

use crate::config::ServerConfig;

/// Failures of a browser operation, rendered to the client as error tool results.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("Browser unavailable: {0}")]
    Browser(#[from] DriverError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// URL worth opening by hand when the failure left one behind.
    pub fn best_url(&self) -> Option<&str> {
        match self {
            SessionError::Capture(e) => e.best_url(),
            SessionError::Resolve(e) => Some(e.url()),
            _ => None,
        }
    }
}

/// How the browser is obtained on first use.
pub enum DriverSource {
    Chromium(ChromiumOptions),
    Provided(Arc<dyn BrowserDriver>),
}

/// Counters served by `capture://stats`.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub acquisitions: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub files_saved: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub acquisitions: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub files_saved: u64,
    pub artifacts: usize,
    pub console_lines: usize,
    pub browser_running: bool,
    pub auxiliary_contexts: usize,
}

/// Result of `download_file`.
#[derive(Debug, Clone, Serialize)]
pub struct SavedFile {
    pub path: PathBuf,
    pub artifact: StoredArtifact,
    pub source_url: String,
}

struct Browser {
    driver: Arc<dyn BrowserDriver>,
    context: Arc<dyn BrowsingContext>,
    page: Mutex<Arc<dyn PageHandle>>,
    coordinator: AcquisitionCoordinator,
    console_task: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the browser for the lifetime of the server. Internally synchronised,
/// so tools share it through an `Arc` without an outer lock.
pub struct CaptureSessionManager {
    config: ServerConfig,
    store: ArtifactStore,
    console: ConsoleLog,
    source: Mutex<Option<DriverSource>>,
    browser: OnceCell<Browser>,
    stats: SessionStats,
}

impl CaptureSessionManager {
    /// Chromium is launched on the first tool call that needs a page.
    pub fn new(config: ServerConfig) -> Self {
        let source = DriverSource::Chromium(config.chromium.clone());
        Self::with_source(config, source)
    }

    pub fn with_driver(config: ServerConfig, driver: Arc<dyn BrowserDriver>) -> Self {
        Self::with_source(config, DriverSource::Provided(driver))
    }

    fn with_source(config: ServerConfig, source: DriverSource) -> Self {
        Self {
            config,
            store: ArtifactStore::new(),
            console: ConsoleLog::default(),
            source: Mutex::new(Some(source)),
            browser: OnceCell::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn console(&self) -> &ConsoleLog {
        &self.console
    }

    pub async fn stats(&self) -> StatsSnapshot {
        let browser = self.browser.get();
        StatsSnapshot {
            acquisitions: self.stats.acquisitions.load(Ordering::Relaxed),
            succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            files_saved: self.stats.files_saved.load(Ordering::Relaxed),
            artifacts: self.store.len(),
            console_lines: self.console.len().await,
            browser_running: browser.is_some(),
            auxiliary_contexts: browser.map_or(0, |b| b.driver.auxiliary_contexts()),
        }
    }

    async fn browser(&self) -> Result<&Browser, SessionError> {
        self.browser
            .get_or_try_init(|| async {
                let mut source = self.source.lock().await;
                let driver: Arc<dyn BrowserDriver> = match source.take() {
                    Some(DriverSource::Provided(driver)) => driver,
                    Some(DriverSource::Chromium(options)) => {
                        match ChromiumDriver::launch(options.clone()).await {
                            Ok(driver) => Arc::new(driver),
                            Err(e) => {
                                // Keep the options so the next call can retry.
                                *source = Some(DriverSource::Chromium(options));
                                return Err(e.into());
                            }
                        }
                    }
                    None => {
                        return Err(DriverError::Unavailable("browser already shut down".into()).into())
                    }
                };
                // A provided driver is kept around for retries too.
                let context = match driver.primary_context().await {
                    Ok(context) => context,
                    Err(e) => {
                        *source = Some(DriverSource::Provided(Arc::clone(&driver)));
                        return Err(e.into());
                    }
                };
                let page = match context.new_page().await {
                    Ok(page) => page,
                    Err(e) => {
                        *source = Some(DriverSource::Provided(Arc::clone(&driver)));
                        return Err(e.into());
                    }
                };
                let console_task = self.watch_console(page.as_ref()).await;
                tracing::info!(context = context.id(), page = page.id(), "Browser session ready");
                Ok(Browser {
                    coordinator: AcquisitionCoordinator::new(
                        Arc::clone(&driver),
                        self.store.clone(),
                        self.config.capture.clone(),
                    ),
                    driver,
                    context,
                    page: Mutex::new(page),
                    console_task: Mutex::new(console_task),
                })
            })
            .await
    }

    async fn watch_console(&self, page: &dyn PageHandle) -> Option<JoinHandle<()>> {
        match page.subscribe_console().await {
            Ok(mut lines) => {
                let console = self.console.clone();
                Some(tokio::spawn(async move {
                    while let Some(entry) = lines.next().await {
                        console.push(entry).await;
                    }
                }))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Console capture unavailable");
                None
            }
        }
    }

    /// The primary context and its current page, replacing the page if the
    /// site closed it.
    pub async fn page(&self) -> Result<(Arc<dyn BrowsingContext>, Arc<dyn PageHandle>), SessionError> {
        let browser = self.browser().await?;
        let mut page = browser.page.lock().await;
        if page.is_closed() {
            tracing::info!("Primary page was closed, opening a new one");
            let fresh = browser.context.new_page().await?;
            let task = self.watch_console(fresh.as_ref()).await;
            if let Some(old) = std::mem::replace(&mut *browser.console_task.lock().await, task) {
                old.abort();
            }
            *page = fresh;
        }
        Ok((Arc::clone(&browser.context), Arc::clone(&page)))
    }

    /// Navigates the primary page and returns the URL it ended on.
    pub async fn navigate(&self, url: &str) -> Result<String, SessionError> {
        let (_, page) = self.page().await?;
        page.goto(url, self.config.capture.navigation_timeout()).await?;
        Ok(page.url().await.unwrap_or_else(|_| url.to_string()))
    }

    pub async fn act(&self, locator: &Locator, action: &UiAction) -> Result<(), SessionError> {
        let (_, page) = self.page().await?;
        act(page.as_ref(), locator, action).await?;
        Ok(())
    }

    /// Screenshot of the primary page, stored as a PNG artifact.
    pub async fn screenshot(&self, name: &str) -> Result<(Vec<u8>, StoredArtifact), SessionError> {
        let (_, page) = self.page().await?;
        let bytes = page.screenshot().await?;
        let record = self.store.put(name, bytes.clone(), "image/png");
        Ok((
            bytes,
            StoredArtifact {
                name: record.name,
                mime_type: record.mime_type,
                size: record.size,
            },
        ))
    }

    pub async fn acquire(&self, request: AcquisitionRequest) -> Result<AcquisitionReport, SessionError> {
        let (context, page) = self.page().await?;
        let browser = self.browser().await?;
        self.stats.acquisitions.fetch_add(1, Ordering::Relaxed);
        match browser.coordinator.acquire(&context, &page, request).await {
            Ok(report) => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                if report.saved_to.is_some() {
                    self.stats.files_saved.fetch_add(1, Ordering::Relaxed);
                }
                Ok(report)
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                Err(e.into())
            }
        }
    }

    /// Fetches `url` with the primary session's cookies and saves it under a
    /// dated name. The bytes are also stored as an artifact.
    pub async fn download_file(
        &self,
        url: &str,
        media: &TargetMedia,
        target: &PersistTarget,
    ) -> Result<SavedFile, SessionError> {
        let (context, page) = self.page().await?;
        let browser = self.browser().await?;
        let cloner = SessionCloner::new(Arc::clone(&browser.driver));
        let resolver = ContentResolver {
            source: &context,
            origin: &page,
            cloner: &cloner,
            media,
            config: &self.config.capture,
            prefer_cloned_session: true,
        };
        let resolved = resolver
            .resolve(&CandidateSignal::LinkUrl {
                url: url.to_string(),
            })
            .await;
        cloner.close_all().await;
        let artifact = resolved?;

        let path = match persist::persist(&artifact, target, chrono::Local::now().date_naive()).await {
            Ok(path) => path,
            Err(e) => {
                if let Some(temp) = &artifact.temp_path {
                    persist::remove_temp(temp).await;
                }
                return Err(e.into());
            }
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| url.to_string());
        let record = self.store.put(&name, artifact.bytes, &artifact.mime_type);
        self.stats.files_saved.fetch_add(1, Ordering::Relaxed);
        Ok(SavedFile {
            path,
            artifact: StoredArtifact {
                name: record.name,
                mime_type: record.mime_type,
                size: record.size,
            },
            source_url: url.to_string(),
        })
    }

    /// Closes the browser if it was started. A browser that never started
    /// will not be started afterwards.
    pub async fn shutdown(&self) {
        let Some(browser) = self.browser.get() else {
            self.source.lock().await.take();
            return;
        };
        if let Some(task) = browser.console_task.lock().await.take() {
            task.abort();
        }
        if let Err(e) = browser.driver.shutdown().await {
            tracing::warn!(error = %e, "Browser shutdown failed");
        }
    }
}
