//! Scripted in-memory browser for exercising the capture engine.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentic_capture::{
    ActionError, BrowserDriver, BrowsingContext, ConsoleEntry, Cookie, DocumentInfo,
    DownloadHandle, DriverError, DriverResult, FetchedBody, Locator, NetworkEvent, PageHandle,
    TargetMedia, UiAction,
};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

pub const PDF: &[u8] = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n%%EOF";

/// What a URL serves when fetched or navigated to.
#[derive(Clone)]
pub struct Resource {
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// Navigating to it starts a download instead of loading a document.
    pub attachment: bool,
    /// Cookie the request must carry, or the server answers 403.
    pub requires_cookie: Option<String>,
}

impl Resource {
    pub fn pdf() -> Self {
        Self {
            content_type: "application/pdf".into(),
            bytes: PDF.to_vec(),
            attachment: false,
            requires_cookie: None,
        }
    }

    pub fn html(body: &str) -> Self {
        Self {
            content_type: "text/html".into(),
            bytes: body.as_bytes().to_vec(),
            attachment: false,
            requires_cookie: None,
        }
    }

    pub fn requiring(mut self, cookie: &str) -> Self {
        self.requires_cookie = Some(cookie.into());
        self
    }

    pub fn as_attachment(mut self) -> Self {
        self.attachment = true;
        self
    }
}

/// Something that happens a while after a click.
#[derive(Clone)]
pub enum Effect {
    Download {
        after: Duration,
        url: String,
        filename: String,
        bytes: Vec<u8>,
        /// Time from start to completion.
        takes: Duration,
    },
    NewPage {
        after: Duration,
        url: String,
        content_type: String,
        bytes: Vec<u8>,
    },
    Response {
        after: Duration,
        url: String,
        status: u16,
        content_type: String,
    },
    Hook {
        after: Duration,
        url: String,
    },
    Navigate {
        after: Duration,
        url: String,
        content_type: String,
        bytes: Vec<u8>,
    },
    AddLink {
        after: Duration,
        href: String,
    },
}

impl Effect {
    fn delay(&self) -> Duration {
        match self {
            Effect::Download { after, .. }
            | Effect::NewPage { after, .. }
            | Effect::Response { after, .. }
            | Effect::Hook { after, .. }
            | Effect::Navigate { after, .. }
            | Effect::AddLink { after, .. } => *after,
        }
    }
}

/// A clickable element.
#[derive(Clone)]
pub struct FakeElement {
    pub selector: String,
    pub text: String,
    pub effects: Vec<Effect>,
    pub fails: bool,
}

impl FakeElement {
    pub fn button(text: &str) -> Self {
        Self {
            selector: "button".into(),
            text: text.into(),
            effects: Vec::new(),
            fails: false,
        }
    }

    pub fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fails = true;
        self
    }
}

/// State shared by every context and page of one fake browser.
pub struct World {
    pub resources: Mutex<HashMap<String, Resource>>,
    pub download_dir: tempfile::TempDir,
    pub aux_open: AtomicUsize,
    pub aux_created: AtomicUsize,
    pub performs: AtomicUsize,
    pub hooks_installed: AtomicUsize,
    pub hooks_deactivated: Mutex<Vec<String>>,
    pub bindings: Mutex<Vec<String>>,
    /// How long every page takes to finish loading.
    pub page_load: Mutex<Duration>,
    next_id: AtomicUsize,
}

impl World {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn serve(&self, url: &str, resource: Resource) {
        self.resources.lock().unwrap().insert(url.to_string(), resource);
    }
}

pub struct FakeDriver {
    pub world: Arc<World>,
    primary: Arc<FakeContext>,
}

impl FakeDriver {
    pub fn new() -> Self {
        let world = Arc::new(World {
            resources: Mutex::new(HashMap::new()),
            download_dir: tempfile::tempdir().unwrap(),
            aux_open: AtomicUsize::new(0),
            aux_created: AtomicUsize::new(0),
            performs: AtomicUsize::new(0),
            hooks_installed: AtomicUsize::new(0),
            hooks_deactivated: Mutex::new(Vec::new()),
            bindings: Mutex::new(Vec::new()),
            page_load: Mutex::new(Duration::ZERO),
            next_id: AtomicUsize::new(1),
        });
        let primary = FakeContext::new(Arc::clone(&world), "default", false);
        Self { world, primary }
    }

    pub fn primary(&self) -> Arc<FakeContext> {
        Arc::clone(&self.primary)
    }

    /// A page in the primary context showing `url` with the given elements.
    pub fn open_page(&self, url: &str, elements: Vec<FakeElement>) -> Arc<FakePage> {
        let page = FakePage::new(Arc::clone(&self.primary.shared), url);
        *page.state.elements.lock().unwrap() = elements;
        page
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn primary_context(&self) -> DriverResult<Arc<dyn BrowsingContext>> {
        Ok(Arc::clone(&self.primary) as Arc<dyn BrowsingContext>)
    }

    async fn new_context(&self) -> DriverResult<Arc<dyn BrowsingContext>> {
        let id = self.world.next_id("ctx");
        self.world.aux_open.fetch_add(1, Ordering::SeqCst);
        self.world.aux_created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeContext::new(Arc::clone(&self.world), &id, true) as Arc<dyn BrowsingContext>)
    }

    fn auxiliary_contexts(&self) -> usize {
        self.world.aux_open.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> DriverResult<()> {
        Ok(())
    }
}

pub struct ContextShared {
    pub world: Arc<World>,
    pub id: String,
    pub cookies: Mutex<Vec<Cookie>>,
    pages: broadcast::Sender<Arc<FakePage>>,
    downloads: broadcast::Sender<Arc<FakeDownload>>,
}

impl ContextShared {
    fn has_cookie(&self, name: &str) -> bool {
        self.cookies.lock().unwrap().iter().any(|c| c.name == name)
    }

    fn start_download(&self, url: &str, filename: &str, bytes: &[u8], takes: Duration) {
        let path = self.world.download_dir.path().join(self.world.next_id("guid"));
        // Synchronous on purpose: paused test clocks advance during async file IO.
        std::fs::write(&path, bytes).unwrap();
        let download = Arc::new(FakeDownload {
            url: url.into(),
            filename: filename.into(),
            path,
            ready_at: Instant::now() + takes,
        });
        let _ = self.downloads.send(download);
    }
}

pub struct FakeContext {
    pub shared: Arc<ContextShared>,
    auxiliary: bool,
    closed: AtomicBool,
}

impl FakeContext {
    fn new(world: Arc<World>, id: &str, auxiliary: bool) -> Arc<Self> {
        let (pages, _) = broadcast::channel(16);
        let (downloads, _) = broadcast::channel(16);
        Arc::new(Self {
            shared: Arc::new(ContextShared {
                world,
                id: id.to_string(),
                cookies: Mutex::new(Vec::new()),
                pages,
                downloads,
            }),
            auxiliary,
            closed: AtomicBool::new(false),
        })
    }

    pub fn set_cookie(&self, name: &str, value: &str) {
        self.shared.cookies.lock().unwrap().push(Cookie {
            name: name.into(),
            value: value.into(),
            domain: "portal.test".into(),
            path: "/".into(),
            secure: true,
            http_only: true,
            expires: None,
        });
    }
}

fn broadcast_stream<T: Clone + Send + 'static>(
    rx: broadcast::Receiver<T>,
) -> BoxStream<'static, T> {
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(item) => return Some((item, rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

#[async_trait]
impl BrowsingContext for FakeContext {
    fn id(&self) -> &str {
        &self.shared.id
    }

    async fn cookies(&self) -> DriverResult<Vec<Cookie>> {
        Ok(self.shared.cookies.lock().unwrap().clone())
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> DriverResult<()> {
        self.shared.cookies.lock().unwrap().extend_from_slice(cookies);
        Ok(())
    }

    async fn new_page(&self) -> DriverResult<Arc<dyn PageHandle>> {
        Ok(FakePage::new(Arc::clone(&self.shared), "about:blank") as Arc<dyn PageHandle>)
    }

    async fn subscribe_pages(&self) -> DriverResult<BoxStream<'static, Arc<dyn PageHandle>>> {
        Ok(broadcast_stream(self.shared.pages.subscribe())
            .map(|p| p as Arc<dyn PageHandle>)
            .boxed())
    }

    async fn subscribe_downloads(
        &self,
    ) -> DriverResult<BoxStream<'static, Arc<dyn DownloadHandle>>> {
        Ok(broadcast_stream(self.shared.downloads.subscribe())
            .map(|d| d as Arc<dyn DownloadHandle>)
            .boxed())
    }

    async fn close(&self) -> DriverResult<()> {
        if self.auxiliary && !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.world.aux_open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub struct FakeDownload {
    url: String,
    filename: String,
    path: PathBuf,
    ready_at: Instant,
}

#[async_trait]
impl DownloadHandle for FakeDownload {
    fn url(&self) -> &str {
        &self.url
    }

    fn suggested_filename(&self) -> &str {
        &self.filename
    }

    async fn wait_for_file(&self, timeout: Duration) -> DriverResult<PathBuf> {
        if self.ready_at > Instant::now() + timeout {
            tokio::time::sleep(timeout).await;
            return Err(DriverError::Timeout(timeout.as_millis() as u64));
        }
        tokio::time::sleep_until(self.ready_at).await;
        Ok(self.path.clone())
    }
}

pub struct PageState {
    pub url: Mutex<String>,
    pub content_type: Mutex<String>,
    pub bytes: Mutex<Vec<u8>>,
    pub elements: Mutex<Vec<FakeElement>>,
    pub links: Mutex<Vec<String>>,
    pub scripts: Mutex<String>,
    pub hook: Mutex<Option<(String, mpsc::UnboundedSender<String>)>>,
    pub closed: AtomicBool,
    network: broadcast::Sender<NetworkEvent>,
}

pub struct FakePage {
    pub id: String,
    pub context: Arc<ContextShared>,
    pub state: Arc<PageState>,
}

impl FakePage {
    pub fn new(context: Arc<ContextShared>, url: &str) -> Arc<Self> {
        let (network, _) = broadcast::channel(64);
        Arc::new(Self {
            id: context.world.next_id("page"),
            state: Arc::new(PageState {
                url: Mutex::new(url.into()),
                content_type: Mutex::new("text/html".into()),
                bytes: Mutex::new(Vec::new()),
                elements: Mutex::new(Vec::new()),
                links: Mutex::new(Vec::new()),
                scripts: Mutex::new(String::new()),
                hook: Mutex::new(None),
                closed: AtomicBool::new(false),
                network,
            }),
            context,
        })
    }

    pub fn set_scripts(&self, scripts: &str) {
        *self.state.scripts.lock().unwrap() = scripts.into();
    }

    fn load(&self, url: &str, content_type: &str, bytes: Vec<u8>) {
        *self.state.url.lock().unwrap() = url.into();
        *self.state.content_type.lock().unwrap() = content_type.into();
        *self.state.bytes.lock().unwrap() = bytes;
    }

    fn apply(self: &Arc<Self>, effect: Effect) {
        match effect {
            Effect::Download {
                url,
                filename,
                bytes,
                takes,
                ..
            } => self.context.start_download(&url, &filename, &bytes, takes),
            Effect::NewPage {
                url,
                content_type,
                bytes,
                ..
            } => {
                let page = FakePage::new(Arc::clone(&self.context), &url);
                page.load(&url, &content_type, bytes);
                let _ = self.context.pages.send(page);
            }
            Effect::Response {
                url,
                status,
                content_type,
                ..
            } => {
                let headers = HashMap::from([("Content-Type".to_string(), content_type)]);
                let _ = self.state.network.send(NetworkEvent::request(url.clone()));
                let _ = self.state.network.send(NetworkEvent::response(url, status, headers));
            }
            Effect::Hook { url, .. } => {
                if let Some((_, tx)) = self.state.hook.lock().unwrap().as_ref() {
                    let _ = tx.send(url);
                }
            }
            Effect::Navigate {
                url,
                content_type,
                bytes,
                ..
            } => self.load(&url, &content_type, bytes),
            Effect::AddLink { href, .. } => self.state.links.lock().unwrap().push(href),
        }
    }

    fn matching(&self, locator: &Locator) -> Vec<FakeElement> {
        self.state
            .elements
            .lock()
            .unwrap()
            .iter()
            .filter(|e| locator.selector.as_deref().map_or(true, |s| s == e.selector))
            .filter(|e| {
                locator
                    .text
                    .as_deref()
                    .map_or(true, |t| e.text.to_lowercase().contains(&t.to_lowercase()))
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PageHandle for FakePage {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    async fn url(&self) -> DriverResult<String> {
        if self.is_closed() {
            return Err(DriverError::PageClosed);
        }
        Ok(self.state.url.lock().unwrap().clone())
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> DriverResult<()> {
        if self.is_closed() {
            return Err(DriverError::PageClosed);
        }
        let resource = self.context.world.resources.lock().unwrap().get(url).cloned();
        match resource {
            Some(r) if r.attachment => {
                self.context.start_download(url, "attachment.pdf", &r.bytes, Duration::ZERO);
                Err(DriverError::Protocol("net::ERR_ABORTED".into()))
            }
            Some(r) => {
                let allowed = r
                    .requires_cookie
                    .as_deref()
                    .map_or(true, |c| self.context.has_cookie(c));
                if allowed {
                    self.load(url, &r.content_type, r.bytes);
                } else {
                    self.load(url, "text/html", b"<html>login</html>".to_vec());
                }
                Ok(())
            }
            None => {
                self.load(url, "text/html", b"<html>not found</html>".to_vec());
                Ok(())
            }
        }
    }

    async fn wait_for_load(&self, timeout: Duration) -> DriverResult<()> {
        let load = *self.context.world.page_load.lock().unwrap();
        if load <= timeout {
            tokio::time::sleep(load).await;
            Ok(())
        } else {
            tokio::time::sleep(timeout).await;
            Err(DriverError::Timeout(timeout.as_millis() as u64))
        }
    }

    async fn document_info(&self) -> DriverResult<DocumentInfo> {
        if self.is_closed() {
            return Err(DriverError::PageClosed);
        }
        Ok(DocumentInfo {
            url: self.state.url.lock().unwrap().clone(),
            content_type: Some(self.state.content_type.lock().unwrap().clone()),
            embedded_viewer: false,
        })
    }

    async fn fetch(&self, url: &str, _timeout: Duration) -> DriverResult<FetchedBody> {
        if self.is_closed() {
            return Err(DriverError::PageClosed);
        }
        if *self.state.url.lock().unwrap() == url {
            return Ok(FetchedBody {
                status: 200,
                content_type: Some(self.state.content_type.lock().unwrap().clone()),
                bytes: self.state.bytes.lock().unwrap().clone(),
            });
        }
        let resource = self.context.world.resources.lock().unwrap().get(url).cloned();
        match resource {
            Some(r) => {
                if let Some(cookie) = &r.requires_cookie {
                    if !self.context.has_cookie(cookie) {
                        return Ok(FetchedBody {
                            status: 403,
                            content_type: Some("text/html".into()),
                            bytes: b"<html>forbidden</html>".to_vec(),
                        });
                    }
                }
                Ok(FetchedBody {
                    status: 200,
                    content_type: Some(r.content_type),
                    bytes: r.bytes,
                })
            }
            None => Ok(FetchedBody {
                status: 404,
                content_type: Some("text/html".into()),
                bytes: Vec::new(),
            }),
        }
    }

    async fn links(&self) -> DriverResult<Vec<String>> {
        Ok(self.state.links.lock().unwrap().clone())
    }

    async fn inline_scripts(&self) -> DriverResult<String> {
        Ok(self.state.scripts.lock().unwrap().clone())
    }

    async fn install_hook(
        &self,
        binding: &str,
        _media: &TargetMedia,
    ) -> DriverResult<BoxStream<'static, String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.hook.lock().unwrap() = Some((binding.to_string(), tx));
        self.context.world.hooks_installed.fetch_add(1, Ordering::SeqCst);
        self.context.world.bindings.lock().unwrap().push(binding.to_string());
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|url| (url, rx))
        })
        .boxed())
    }

    async fn deactivate_hook(&self, binding: &str) -> DriverResult<()> {
        // Overwritten, not removed: the binding stays registered.
        *self.state.hook.lock().unwrap() = None;
        self.context
            .world
            .hooks_deactivated
            .lock()
            .unwrap()
            .push(binding.to_string());
        Ok(())
    }

    async fn nudge(&self) -> DriverResult<()> {
        Ok(())
    }

    async fn subscribe_network(&self) -> DriverResult<BoxStream<'static, NetworkEvent>> {
        Ok(broadcast_stream(self.state.network.subscribe()))
    }

    async fn subscribe_console(&self) -> DriverResult<BoxStream<'static, ConsoleEntry>> {
        Ok(futures::stream::empty().boxed())
    }

    async fn perform(
        &self,
        locator: &Locator,
        index: Option<usize>,
        action: &UiAction,
    ) -> Result<(), ActionError> {
        self.context.world.performs.fetch_add(1, Ordering::SeqCst);
        let matches = self.matching(locator);
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

        if element.fails {
            return Err(ActionError::Failed {
                action: action.name().into(),
                locator: locator.to_string(),
                reason: "element is detached".into(),
            });
        }
        if *action == UiAction::Click {
            for effect in element.effects.clone() {
                let this = Arc::new(FakePage {
                    id: self.id.clone(),
                    context: Arc::clone(&self.context),
                    state: Arc::clone(&self.state),
                });
                tokio::spawn(async move {
                    tokio::time::sleep(effect.delay()).await;
                    this.apply(effect);
                });
            }
        }
        Ok(())
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn close(&self) -> DriverResult<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// The primary context and a page on it, typed for the engine.
pub fn handles(
    driver: &FakeDriver,
    page: &Arc<FakePage>,
) -> (Arc<dyn BrowsingContext>, Arc<dyn PageHandle>) {
    (
        driver.primary() as Arc<dyn BrowsingContext>,
        Arc::clone(page) as Arc<dyn PageHandle>,
    )
}
