//! Browser driver abstraction.
//!
//! The engine only talks to a browser through these traits. `chromium`
//! implements them over the Chrome DevTools Protocol; [`NoopDriver`] stands in
//! when no browser is available.

pub mod chromium;
mod scripts;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{ActionError, DriverError, DriverResult};
use crate::mime::TargetMedia;
use crate::types::{ConsoleEntry, Cookie, DocumentInfo, FetchedBody, Locator, NetworkEvent, UiAction};

/// A browser that can hand out isolated browsing contexts.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// The long-lived context the user's session lives in.
    async fn primary_context(&self) -> DriverResult<Arc<dyn BrowsingContext>>;
    /// A fresh, isolated context with its own cookie jar.
    async fn new_context(&self) -> DriverResult<Arc<dyn BrowsingContext>>;
    /// Number of contexts opened with `new_context` and not yet closed.
    fn auxiliary_contexts(&self) -> usize;
    async fn shutdown(&self) -> DriverResult<()>;
}

/// A cookie jar plus the pages that share it.
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    fn id(&self) -> &str;
    async fn cookies(&self) -> DriverResult<Vec<Cookie>>;
    async fn add_cookies(&self, cookies: &[Cookie]) -> DriverResult<()>;
    async fn new_page(&self) -> DriverResult<Arc<dyn PageHandle>>;
    /// Pages opened in this context from now on.
    async fn subscribe_pages(&self) -> DriverResult<BoxStream<'static, Arc<dyn PageHandle>>>;
    /// Downloads started in this context from now on.
    async fn subscribe_downloads(&self) -> DriverResult<BoxStream<'static, Arc<dyn DownloadHandle>>>;
    /// Closes the context and every page in it. Idempotent.
    async fn close(&self) -> DriverResult<()>;
}

/// One tab.
#[async_trait]
pub trait PageHandle: Send + Sync {
    fn id(&self) -> &str;
    fn is_closed(&self) -> bool;
    async fn url(&self) -> DriverResult<String>;
    async fn goto(&self, url: &str, timeout: Duration) -> DriverResult<()>;
    /// Waits until the document has finished loading.
    async fn wait_for_load(&self, timeout: Duration) -> DriverResult<()>;
    async fn document_info(&self) -> DriverResult<DocumentInfo>;
    /// Fetches `url` from inside the page with the page's credentials.
    async fn fetch(&self, url: &str, timeout: Duration) -> DriverResult<FetchedBody>;
    /// Absolute URLs of anchors and embedded documents currently in the DOM.
    async fn links(&self) -> DriverResult<Vec<String>>;
    /// Concatenated text of inline scripts and inline event handlers.
    async fn inline_scripts(&self) -> DriverResult<String>;
    /// Installs a navigation hook reporting candidate URLs through `binding`.
    /// The hook survives reloads of this page.
    async fn install_hook(
        &self,
        binding: &str,
        media: &TargetMedia,
    ) -> DriverResult<BoxStream<'static, String>>;
    /// Replaces the hook callback with a no-op. The binding itself stays.
    async fn deactivate_hook(&self, binding: &str) -> DriverResult<()>;
    /// Clicks the document body, which some viewers need to start a download.
    async fn nudge(&self) -> DriverResult<()>;
    async fn subscribe_network(&self) -> DriverResult<BoxStream<'static, NetworkEvent>>;
    async fn subscribe_console(&self) -> DriverResult<BoxStream<'static, ConsoleEntry>>;
    /// Acts on the element `locator` resolves to.
    ///
    /// With `index == None` the lookup is strict: more than one match is an
    /// [`ActionError::StrictViolation`]. With `Some(i)` the i-th match is used.
    async fn perform(
        &self,
        locator: &Locator,
        index: Option<usize>,
        action: &UiAction,
    ) -> Result<(), ActionError>;
    async fn screenshot(&self) -> DriverResult<Vec<u8>>;
    async fn close(&self) -> DriverResult<()>;
}

/// A download the browser has started.
#[async_trait]
pub trait DownloadHandle: Send + Sync {
    fn url(&self) -> &str;
    fn suggested_filename(&self) -> &str;
    /// Resolves to the finished file, or [`DriverError::Timeout`].
    async fn wait_for_file(&self, timeout: Duration) -> DriverResult<PathBuf>;
}

/// A driver used when no browser can be launched. Every operation fails.
pub struct NoopDriver {
    reason: String,
}

impl NoopDriver {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for NoopDriver {
    fn default() -> Self {
        Self::new("no browser configured")
    }
}

#[async_trait]
impl BrowserDriver for NoopDriver {
    async fn primary_context(&self) -> DriverResult<Arc<dyn BrowsingContext>> {
        Err(DriverError::Unavailable(self.reason.clone()))
    }
    async fn new_context(&self) -> DriverResult<Arc<dyn BrowsingContext>> {
        Err(DriverError::Unavailable(self.reason.clone()))
    }
    fn auxiliary_contexts(&self) -> usize {
        0
    }
    async fn shutdown(&self) -> DriverResult<()> {
        Ok(())
    }
}
