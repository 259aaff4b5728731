//! Chromium driver over the DevTools protocol, using chromiumoxide.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    CloseParams, DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, CookieParam, EventRequestWillBeSent, EventResponseReceived, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, RemoveScriptToEvaluateOnNewDocumentParams,
    ScriptIdentifier,
};
use chromiumoxide::cdp::browser_protocol::storage::{GetCookiesParams, SetCookiesParams};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
    EventTargetCreated, EventTargetDestroyed, GetTargetsParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    AddBindingParams, EventBindingCalled, EventConsoleApiCalled,
};
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use dashmap::{DashMap, DashSet};
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{Mutex, Notify, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::scripts;
use super::{BrowserDriver, BrowsingContext, DownloadHandle, PageHandle};
use crate::error::{ActionError, DriverError, DriverResult};
use crate::mime::TargetMedia;
use crate::patterns;
use crate::types::{
    ConsoleEntry, Cookie, DocumentInfo, FetchedBody, Locator, NetworkEvent, UiAction,
};

const PRIMARY_CONTEXT_ID: &str = "default";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const PAGE_ATTACH_TIMEOUT: Duration = Duration::from_secs(5);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. CAPTURE_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("CAPTURE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.agentic-capture/chromium/
    if let Some(home) = dirs::home_dir() {
        let root = home.join(".agentic-capture/chromium");
        let candidates = if cfg!(target_os = "macos") {
            vec![
                root.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome"),
            ]
        } else {
            vec![root.join("chrome-linux64/chrome"), root.join("chrome")]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launch settings for [`ChromiumDriver`].
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Where the browser writes downloads before they are read.
    pub download_dir: PathBuf,
    /// How long element lookups keep retrying before giving up.
    pub action_timeout: Duration,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            download_dir: std::env::temp_dir()
                .join("agentic-capture")
                .join(std::process::id().to_string()),
            action_timeout: Duration::from_millis(5_000),
        }
    }
}

/// Chromium-backed [`BrowserDriver`].
pub struct ChromiumDriver {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    options: ChromiumOptions,
    primary: OnceCell<Arc<ChromiumContext>>,
    auxiliary_ids: Arc<DashSet<String>>,
    auxiliary_count: Arc<AtomicUsize>,
}

impl ChromiumDriver {
    /// Launch a Chromium instance.
    pub async fn launch(options: ChromiumOptions) -> DriverResult<Self> {
        let chrome_path = options
            .executable
            .clone()
            .or_else(find_chromium)
            .ok_or_else(|| {
                DriverError::Unavailable(
                    "Chromium not found. Set CAPTURE_CHROMIUM_PATH or pass --chromium.".into(),
                )
            })?;

        tokio::fs::create_dir_all(&options.download_dir).await?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        builder = if options.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| DriverError::Unavailable(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Unavailable(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        tracing::info!(download_dir = %options.download_dir.display(), "Chromium launched");

        Ok(Self {
            browser: Arc::new(browser),
            handler,
            options,
            primary: OnceCell::new(),
            auxiliary_ids: Arc::new(DashSet::new()),
            auxiliary_count: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn scope(&self, context_id: Option<String>) -> ContextScope {
        ContextScope {
            context_id,
            auxiliary_ids: Arc::clone(&self.auxiliary_ids),
        }
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn primary_context(&self) -> DriverResult<Arc<dyn BrowsingContext>> {
        let context = self
            .primary
            .get_or_try_init(|| async {
                let context = ChromiumContext::open(
                    Arc::clone(&self.browser),
                    self.scope(None),
                    self.options.clone(),
                    None,
                )
                .await?;
                Ok::<_, DriverError>(Arc::new(context))
            })
            .await?;
        Ok(Arc::clone(context) as Arc<dyn BrowsingContext>)
    }

    async fn new_context(&self) -> DriverResult<Arc<dyn BrowsingContext>> {
        let created = self
            .browser
            .execute(CreateBrowserContextParams::builder().build())
            .await
            .map_err(protocol)?;
        let id = created.result.browser_context_id.inner().clone();
        self.auxiliary_ids.insert(id.clone());
        self.auxiliary_count.fetch_add(1, Ordering::SeqCst);

        let context = ChromiumContext::open(
            Arc::clone(&self.browser),
            self.scope(Some(id.clone())),
            self.options.clone(),
            Some(Arc::clone(&self.auxiliary_count)),
        )
        .await;
        match context {
            Ok(context) => {
                tracing::debug!(context = %id, "Opened browser context");
                Ok(Arc::new(context) as Arc<dyn BrowsingContext>)
            }
            Err(e) => {
                let _ = self
                    .browser
                    .execute(DisposeBrowserContextParams::new(
                        created.result.browser_context_id.clone(),
                    ))
                    .await;
                self.auxiliary_ids.remove(&id);
                self.auxiliary_count.fetch_sub(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn auxiliary_contexts(&self) -> usize {
        self.auxiliary_count.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> DriverResult<()> {
        if let Some(primary) = self.primary.get() {
            let _ = primary.close().await;
        }
        let _ = self.browser.execute(CloseParams::default()).await;
        self.handler.abort();
        Ok(())
    }
}

fn protocol(e: impl std::fmt::Display) -> DriverError {
    let message = e.to_string();
    if message.contains("No target with given id") || message.contains("Target closed") {
        DriverError::PageClosed
    } else {
        DriverError::Protocol(message)
    }
}

/// Which browser context a target belongs to, as seen from one context.
#[derive(Clone)]
struct ContextScope {
    /// `None` for the default context.
    context_id: Option<String>,
    auxiliary_ids: Arc<DashSet<String>>,
}

impl ContextScope {
    fn owns(&self, target_context: Option<&str>) -> bool {
        match (&self.context_id, target_context) {
            (Some(own), Some(other)) => own == other,
            (Some(_), None) => false,
            (None, Some(other)) => !self.auxiliary_ids.contains(other),
            (None, None) => true,
        }
    }

    /// Looks the target up; `None` if the browser no longer knows it.
    async fn owns_target(&self, browser: &Browser, target_id: &str) -> Option<bool> {
        let targets = browser
            .execute(GetTargetsParams::builder().build())
            .await
            .ok()?
            .result
            .target_infos;
        targets
            .iter()
            .find(|t| t.target_id.inner() == target_id)
            .map(|t| self.owns(t.browser_context_id.as_ref().map(|c| c.inner().as_str())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadState {
    InProgress,
    Completed,
    Canceled,
}

/// Progress of every download the browser reports, keyed by guid.
#[derive(Default)]
struct DownloadTracker {
    states: DashMap<String, DownloadState>,
    changed: Notify,
}

impl DownloadTracker {
    fn update(&self, guid: &str, state: DownloadState) {
        self.states.insert(guid.to_string(), state);
        self.changed.notify_waiters();
    }

    async fn wait(&self, guid: &str, timeout: Duration) -> DriverResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.states.get(guid).map(|s| *s) {
                Some(DownloadState::Completed) => return Ok(()),
                Some(DownloadState::Canceled) => {
                    return Err(DriverError::Protocol(format!("download {guid} was canceled")))
                }
                _ => {}
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(DriverError::Timeout(timeout.as_millis() as u64));
            }
        }
    }
}

/// A browsing context: the default profile or an isolated one.
pub struct ChromiumContext {
    browser: Arc<Browser>,
    scope: ContextScope,
    id: String,
    options: ChromiumOptions,
    downloads: Arc<DownloadTracker>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    /// Set for auxiliary contexts, decremented once on close.
    auxiliary_count: Option<Arc<AtomicUsize>>,
}

impl ChromiumContext {
    async fn open(
        browser: Arc<Browser>,
        scope: ContextScope,
        options: ChromiumOptions,
        auxiliary_count: Option<Arc<AtomicUsize>>,
    ) -> DriverResult<Self> {
        let id = scope
            .context_id
            .clone()
            .unwrap_or_else(|| PRIMARY_CONTEXT_ID.to_string());

        let downloads = Arc::new(DownloadTracker::default());
        let mut progress = browser
            .event_listener::<EventDownloadProgress>()
            .await
            .map_err(protocol)?;
        let tracker = Arc::clone(&downloads);
        let progress_task = tokio::spawn(async move {
            while let Some(event) = progress.next().await {
                let state = match event.state {
                    DownloadProgressState::Completed => DownloadState::Completed,
                    DownloadProgressState::Canceled => DownloadState::Canceled,
                    _ => DownloadState::InProgress,
                };
                tracker.update(&event.guid, state);
            }
        });

        let mut behavior = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::AllowAndName);
        behavior.browser_context_id = scope
            .context_id
            .clone()
            .map(chromiumoxide::cdp::browser_protocol::browser::BrowserContextId::new);
        behavior.download_path = Some(options.download_dir.to_string_lossy().into_owned());
        behavior.events_enabled = Some(true);
        if let Err(e) = browser.execute(behavior).await {
            progress_task.abort();
            return Err(protocol(e));
        }

        Ok(Self {
            browser,
            scope,
            id,
            options,
            downloads,
            tasks: Mutex::new(vec![progress_task]),
            closed: AtomicBool::new(false),
            auxiliary_count,
        })
    }

    async fn attach_page(&self, page: Page) -> Arc<dyn PageHandle> {
        Arc::new(ChromiumPage::new(
            Arc::clone(&self.browser),
            page,
            self.options.action_timeout,
        ).await)
    }
}

/// Polls the browser's attached pages until `target_id` shows up.
async fn find_page(browser: &Browser, target_id: &str) -> Option<Page> {
    let deadline = Instant::now() + PAGE_ATTACH_TIMEOUT;
    while Instant::now() < deadline {
        if let Ok(pages) = browser.pages().await {
            if let Some(page) = pages
                .into_iter()
                .find(|p| p.target_id().inner() == target_id)
            {
                return Some(page);
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    None
}

#[async_trait]
impl BrowsingContext for ChromiumContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn cookies(&self) -> DriverResult<Vec<Cookie>> {
        let mut params = GetCookiesParams::builder().build();
        params.browser_context_id = self
            .scope
            .context_id
            .clone()
            .map(chromiumoxide::cdp::browser_protocol::browser::BrowserContextId::new);
        let cookies = self.browser.execute(params).await.map_err(protocol)?.result.cookies;
        Ok(cookies
            .into_iter()
            .map(|c| Cookie {
                expires: (!c.session).then_some(c.expires),
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect())
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> DriverResult<()> {
        if cookies.is_empty() {
            return Ok(());
        }
        let params: Vec<CookieParam> = cookies
            .iter()
            .map(|c| {
                let mut param = CookieParam::new(c.name.clone(), c.value.clone());
                param.domain = Some(c.domain.clone());
                param.path = Some(c.path.clone());
                param.secure = Some(c.secure);
                param.http_only = Some(c.http_only);
                param.expires = c.expires.map(TimeSinceEpoch::new);
                param
            })
            .collect();
        let mut set = SetCookiesParams::new(params);
        set.browser_context_id = self
            .scope
            .context_id
            .clone()
            .map(chromiumoxide::cdp::browser_protocol::browser::BrowserContextId::new);
        self.browser.execute(set).await.map_err(protocol)?;
        Ok(())
    }

    async fn new_page(&self) -> DriverResult<Arc<dyn PageHandle>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::PageClosed);
        }
        let page = match &self.scope.context_id {
            Some(id) => {
                let params = CreateTargetParams::builder()
                    .url("about:blank")
                    .browser_context_id(
                        chromiumoxide::cdp::browser_protocol::browser::BrowserContextId::new(
                            id.clone(),
                        ),
                    )
                    .build()
                    .map_err(DriverError::Protocol)?;
                self.browser.new_page(params).await
            }
            None => self.browser.new_page("about:blank").await,
        }
        .map_err(protocol)?;
        Ok(self.attach_page(page).await)
    }

    async fn subscribe_pages(&self) -> DriverResult<BoxStream<'static, Arc<dyn PageHandle>>> {
        let events = self
            .browser
            .event_listener::<EventTargetCreated>()
            .await
            .map_err(protocol)?;
        let browser = Arc::clone(&self.browser);
        let scope = self.scope.clone();
        let action_timeout = self.options.action_timeout;

        let stream = events.filter_map(move |event| {
            let browser = Arc::clone(&browser);
            let scope = scope.clone();
            async move {
                let info = &event.target_info;
                if info.r#type != "page" {
                    return None;
                }
                let context = info.browser_context_id.as_ref().map(|c| c.inner().as_str());
                if !scope.owns(context) {
                    return None;
                }
                let page = find_page(&browser, info.target_id.inner()).await?;
                let handle: Arc<dyn PageHandle> =
                    Arc::new(ChromiumPage::new(browser, page, action_timeout).await);
                Some(handle)
            }
        });
        Ok(stream.boxed())
    }

    async fn subscribe_downloads(
        &self,
    ) -> DriverResult<BoxStream<'static, Arc<dyn DownloadHandle>>> {
        let events = self
            .browser
            .event_listener::<EventDownloadWillBegin>()
            .await
            .map_err(protocol)?;
        let browser = Arc::clone(&self.browser);
        let scope = self.scope.clone();
        let tracker = Arc::clone(&self.downloads);
        let dir = self.options.download_dir.clone();

        let stream = events.filter_map(move |event| {
            let browser = Arc::clone(&browser);
            let scope = scope.clone();
            let tracker = Arc::clone(&tracker);
            let dir = dir.clone();
            async move {
                // Top-level frames share their target's id; subframes are
                // credited to the default context.
                let owned = scope
                    .owns_target(&browser, event.frame_id.inner())
                    .await
                    .unwrap_or(scope.context_id.is_none());
                if !owned {
                    return None;
                }
                tracing::debug!(url = %event.url, guid = %event.guid, "Download started");
                let handle: Arc<dyn DownloadHandle> = Arc::new(ChromiumDownload {
                    url: event.url.clone(),
                    suggested_filename: event.suggested_filename.clone(),
                    path: dir.join(&event.guid),
                    guid: event.guid.clone(),
                    tracker,
                });
                Some(handle)
            }
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> DriverResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        if let Some(id) = &self.scope.context_id {
            let result = self
                .browser
                .execute(DisposeBrowserContextParams::new(
                    chromiumoxide::cdp::browser_protocol::browser::BrowserContextId::new(id.clone()),
                ))
                .await;
            self.scope.auxiliary_ids.remove(id);
            if let Some(count) = &self.auxiliary_count {
                count.fetch_sub(1, Ordering::SeqCst);
            }
            result.map_err(protocol)?;
            tracing::debug!(context = %id, "Closed browser context");
        }
        Ok(())
    }
}

/// A download reported by the browser, written to `<download_dir>/<guid>`.
struct ChromiumDownload {
    guid: String,
    url: String,
    suggested_filename: String,
    path: PathBuf,
    tracker: Arc<DownloadTracker>,
}

#[async_trait]
impl DownloadHandle for ChromiumDownload {
    fn url(&self) -> &str {
        &self.url
    }

    fn suggested_filename(&self) -> &str {
        &self.suggested_filename
    }

    async fn wait_for_file(&self, timeout: Duration) -> DriverResult<PathBuf> {
        self.tracker.wait(&self.guid, timeout).await?;
        Ok(self.path.clone())
    }
}

/// A single Chromium tab.
pub struct ChromiumPage {
    page: Page,
    id: String,
    closed: Arc<AtomicBool>,
    action_timeout: Duration,
    hooks: DashMap<String, ScriptIdentifier>,
    watcher: Option<JoinHandle<()>>,
}

impl ChromiumPage {
    async fn new(browser: Arc<Browser>, page: Page, action_timeout: Duration) -> Self {
        let id = page.target_id().inner().clone();
        let closed = Arc::new(AtomicBool::new(false));

        let watcher = match browser.event_listener::<EventTargetDestroyed>().await {
            Ok(mut destroyed) => {
                let closed = Arc::clone(&closed);
                let target = id.clone();
                Some(tokio::spawn(async move {
                    while let Some(event) = destroyed.next().await {
                        if *event.target_id.inner() == target {
                            closed.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                }))
            }
            Err(e) => {
                tracing::debug!(error = %e, "Page close watcher unavailable");
                None
            }
        };

        Self {
            page,
            id,
            closed,
            action_timeout,
            hooks: DashMap::new(),
            watcher,
        }
    }

    async fn eval(&self, script: impl Into<String>) -> DriverResult<serde_json::Value> {
        if self.is_closed() {
            return Err(DriverError::PageClosed);
        }
        let result = self.page.evaluate(script.into()).await.map_err(|e| {
            let err = protocol(e);
            if err == DriverError::PageClosed {
                self.closed.store(true, Ordering::SeqCst);
            }
            err
        })?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Elements matching the locator, in document order.
    async fn query(&self, locator: &Locator) -> Vec<Element> {
        let selector = locator.selector.as_deref().unwrap_or(scripts::CLICKABLE);
        let elements = self.page.find_elements(selector).await.unwrap_or_default();
        let Some(text) = locator.text.as_deref() else {
            return elements;
        };

        let wanted = normalize_text(text);
        let mut matched = Vec::new();
        for element in elements {
            let inner = element.inner_text().await.ok().flatten().unwrap_or_default();
            let value = element.attribute("value").await.ok().flatten().unwrap_or_default();
            if normalize_text(&inner).contains(&wanted) || normalize_text(&value).contains(&wanted) {
                matched.push(element);
            }
        }
        matched
    }

    async fn apply(&self, element: &Element, action: &UiAction) -> Result<(), String> {
        match action {
            UiAction::Click => {
                let _ = element.scroll_into_view().await;
                element.click().await.map(|_| ()).map_err(|e| e.to_string())
            }
            UiAction::Hover => element.hover().await.map(|_| ()).map_err(|e| e.to_string()),
            UiAction::Fill(value) => element
                .call_js_fn(scripts::fill(value), false)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            UiAction::Select(values) => {
                let result = element
                    .call_js_fn(scripts::select(values), false)
                    .await
                    .map_err(|e| e.to_string())?;
                let hits = result
                    .result
                    .value
                    .as_ref()
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                if hits == 0 {
                    return Err(format!("no option matches {values:?}"));
                }
                Ok(())
            }
        }
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[async_trait]
impl PageHandle for ChromiumPage {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn url(&self) -> DriverResult<String> {
        if self.is_closed() {
            return Err(DriverError::PageClosed);
        }
        Ok(self
            .page
            .url()
            .await
            .map_err(protocol)?
            .map(|u| u.to_string())
            .unwrap_or_default())
    }

    async fn goto(&self, url: &str, timeout: Duration) -> DriverResult<()> {
        if self.is_closed() {
            return Err(DriverError::PageClosed);
        }
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(protocol(e)),
            Err(_) => Err(DriverError::Timeout(timeout.as_millis() as u64)),
        }
    }

    async fn wait_for_load(&self, timeout: Duration) -> DriverResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(state) = self.eval(scripts::READY_STATE).await {
                if state.as_str() == Some("complete") {
                    return Ok(());
                }
            }
            if self.is_closed() {
                return Err(DriverError::PageClosed);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout(timeout.as_millis() as u64));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn document_info(&self) -> DriverResult<DocumentInfo> {
        let value = self.eval(scripts::DOCUMENT_INFO).await?;
        serde_json::from_value(value).map_err(|e| DriverError::Script(e.to_string()))
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> DriverResult<FetchedBody> {
        let script = scripts::fetch(url, timeout.as_millis() as u64);
        let result = tokio::time::timeout(timeout + Duration::from_secs(1), self.eval(script))
            .await
            .map_err(|_| DriverError::Timeout(timeout.as_millis() as u64))??;

        if let Some(error) = result.get("error").and_then(|e| e.as_str()) {
            return Err(DriverError::Script(error.to_string()));
        }
        let status = result.get("status").and_then(|s| s.as_u64()).unwrap_or(0) as u16;
        let content_type = result
            .get("contentType")
            .and_then(|c| c.as_str())
            .map(str::to_string);
        let data = result.get("data").and_then(|d| d.as_str()).unwrap_or("");
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| DriverError::Script(format!("invalid base64 body: {e}")))?;
        Ok(FetchedBody {
            status,
            content_type,
            bytes,
        })
    }

    async fn links(&self) -> DriverResult<Vec<String>> {
        let value = self.eval(scripts::LINKS).await?;
        serde_json::from_value(value).map_err(|e| DriverError::Script(e.to_string()))
    }

    async fn inline_scripts(&self) -> DriverResult<String> {
        let value = self.eval(scripts::INLINE_SCRIPTS).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn install_hook(
        &self,
        binding: &str,
        media: &TargetMedia,
    ) -> DriverResult<BoxStream<'static, String>> {
        let calls = self
            .page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(protocol)?;
        self.page
            .execute(AddBindingParams::new(binding))
            .await
            .map_err(protocol)?;

        let source = scripts::hook(binding, &patterns::hook_pattern_source(media));
        let added = self
            .page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source.clone()))
            .await
            .map_err(protocol)?;
        self.hooks.insert(binding.to_string(), added.result.identifier.clone());
        // Already-loaded documents need the hook too.
        if let Err(e) = self.eval(source).await {
            tracing::debug!(error = %e, "Hook not applied to current document");
        }

        let name = binding.to_string();
        let stream = calls.filter_map(move |event| {
            let matches = event.name == name;
            let payload = event.payload.clone();
            async move {
                if !matches {
                    return None;
                }
                match serde_json::from_str::<serde_json::Value>(&payload) {
                    Ok(value) => value.get("url").and_then(|u| u.as_str()).map(str::to_string),
                    Err(_) => Some(payload),
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn deactivate_hook(&self, binding: &str) -> DriverResult<()> {
        if let Some((_, identifier)) = self.hooks.remove(binding) {
            let _ = self
                .page
                .execute(RemoveScriptToEvaluateOnNewDocumentParams::new(identifier))
                .await;
        }
        self.eval(scripts::deactivate_hook(binding)).await?;
        Ok(())
    }

    async fn nudge(&self) -> DriverResult<()> {
        self.eval(scripts::NUDGE).await?;
        Ok(())
    }

    async fn subscribe_network(&self) -> DriverResult<BoxStream<'static, NetworkEvent>> {
        self.page
            .execute(network::EnableParams::default())
            .await
            .map_err(protocol)?;
        let requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(protocol)?
            .map(|event| NetworkEvent::request(event.request.url.clone()));
        let responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(protocol)?
            .map(|event| {
                let response = &event.response;
                let mut headers = std::collections::HashMap::new();
                if let Some(map) = response.headers.inner().as_object() {
                    for (name, value) in map {
                        if let Some(value) = value.as_str() {
                            headers.insert(name.to_ascii_lowercase(), value.to_string());
                        }
                    }
                }
                headers
                    .entry("content-type".to_string())
                    .or_insert_with(|| response.mime_type.clone());
                NetworkEvent::response(response.url.clone(), response.status as u16, headers)
            });
        Ok(futures::stream::select(requests, responses).boxed())
    }

    async fn subscribe_console(&self) -> DriverResult<BoxStream<'static, ConsoleEntry>> {
        let events = self
            .page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(protocol)?;
        Ok(events
            .map(|event| {
                let text = event
                    .args
                    .iter()
                    .map(|arg| match &arg.value {
                        Some(serde_json::Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                        None => arg.description.clone().unwrap_or_default(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                ConsoleEntry {
                    level: format!("{:?}", event.r#type).to_lowercase(),
                    text,
                    timestamp: chrono::Utc::now(),
                }
            })
            .boxed())
    }

    async fn perform(
        &self,
        locator: &Locator,
        index: Option<usize>,
        action: &UiAction,
    ) -> Result<(), ActionError> {
        let deadline = Instant::now() + self.action_timeout;
        let mut matches = self.query(locator).await;
        while matches.is_empty() && Instant::now() < deadline && !self.is_closed() {
            tokio::time::sleep(POLL_INTERVAL).await;
            matches = self.query(locator).await;
        }

        let element = match index {
            None if matches.len() > 1 => {
                return Err(ActionError::StrictViolation {
                    locator: locator.to_string(),
                    count: matches.len(),
                })
            }
            None => matches.first(),
            Some(i) => matches.get(i),
        }
        .ok_or_else(|| ActionError::TargetNotFound(locator.to_string()))?;

        self.apply(element, action)
            .await
            .map_err(|reason| ActionError::Failed {
                action: action.name().to_string(),
                locator: locator.to_string(),
                reason,
            })
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        if self.is_closed() {
            return Err(DriverError::PageClosed);
        }
        self.page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(protocol)
    }

    async fn close(&self) -> DriverResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.page.clone().close().await.map_err(protocol)
    }
}
