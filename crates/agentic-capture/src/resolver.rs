//! Turns a ranked candidate into verified bytes plus a MIME type.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::config::CaptureConfig;
use crate::driver::{BrowsingContext, DownloadHandle, PageHandle};
use crate::error::{DriverError, ResolveError};
use crate::mime::{self, TargetMedia};
use crate::patterns;
use crate::session::SessionCloner;
use crate::types::{CandidateSignal, FetchedBody, ResolvedArtifact};

/// Resolves candidates for one acquisition call.
pub struct ContentResolver<'a> {
    /// Context whose cookies authenticate bare URLs.
    pub source: &'a Arc<dyn BrowsingContext>,
    /// Page the trigger was clicked on. `blob:` URLs are only readable here.
    pub origin: &'a Arc<dyn PageHandle>,
    pub cloner: &'a SessionCloner,
    pub media: &'a TargetMedia,
    pub config: &'a CaptureConfig,
    /// Skip reading new pages in place and always go through a cloned context.
    pub prefer_cloned_session: bool,
}

impl ContentResolver<'_> {
    pub async fn resolve(&self, signal: &CandidateSignal) -> Result<ResolvedArtifact, ResolveError> {
        match signal {
            CandidateSignal::NativeDownload { handle } => self.from_download(handle.as_ref()).await,
            CandidateSignal::NewPage { page, url } => self.from_page(page.as_ref(), url).await,
            CandidateSignal::ResponseUrl { url }
            | CandidateSignal::HookedUrl { url }
            | CandidateSignal::LinkUrl { url } => self.from_url(url).await,
        }
    }

    /// Waits for the browser to finish writing the file, then reads it.
    async fn from_download(&self, handle: &dyn DownloadHandle) -> Result<ResolvedArtifact, ResolveError> {
        let url = handle.url().to_string();
        let path = handle
            .wait_for_file(self.config.download_grace())
            .await
            .map_err(|e| match e {
                DriverError::Timeout(waited_ms) => ResolveError::DownloadTimeout {
                    url: url.clone(),
                    waited_ms,
                },
                source => ResolveError::Driver {
                    url: url.clone(),
                    source,
                },
            })?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| ResolveError::Driver {
            url: url.clone(),
            source: e.into(),
        })?;

        let suggested = Some(handle.suggested_filename()).filter(|n| !n.is_empty());
        let mime_type = mime::infer(None, suggested.or(Some(url.as_str())), &bytes);
        tracing::debug!(%url, size = bytes.len(), %mime_type, "Read native download");
        Ok(ResolvedArtifact {
            bytes,
            mime_type,
            source_url: (!url.is_empty()).then_some(url),
            suggested_filename: suggested.map(str::to_string),
            temp_path: Some(path),
        })
    }

    /// Reads a page directly, then retries it as a download, then falls back
    /// to fetching its URL from a cloned context.
    async fn from_page(&self, page: &dyn PageHandle, url: &str) -> Result<ResolvedArtifact, ResolveError> {
        if page.is_closed() {
            return Err(ResolveError::PageClosed { url: url.to_string() });
        }

        let mut last = None;
        if !self.prefer_cloned_session {
            match self.read_page(page, url).await {
                Ok(artifact) => return Ok(artifact),
                Err(e @ ResolveError::PageClosed { .. }) => return Err(e),
                Err(e) => tracing::debug!(%url, error = %e, "Page not readable in place"),
            }
            match self.download_from_page(page, url).await {
                Ok(artifact) => return Ok(artifact),
                Err(e) => {
                    tracing::debug!(%url, error = %e, "Page did not yield a download");
                    last = Some(e);
                }
            }
        }

        if is_fetchable(url) {
            return self.from_url(url).await;
        }
        Err(last.unwrap_or_else(|| ResolveError::NotTarget {
            url: url.to_string(),
            expected: self.media.mime_type.clone(),
            found: "unfetchable URL".into(),
        }))
    }

    async fn read_page(&self, page: &dyn PageHandle, url: &str) -> Result<ResolvedArtifact, ResolveError> {
        let info = page.document_info().await.map_err(|e| driver_error(url, e))?;
        let page_url = if info.url.is_empty() { url.to_string() } else { info.url.clone() };

        let body = page
            .fetch(&page_url, self.config.fetch_timeout())
            .await
            .map_err(|e| driver_error(&page_url, e))?;
        let direct = self.verify(&page_url, body);
        if direct.is_ok() || !info.embedded_viewer {
            return direct;
        }

        // The document may be embedded rather than being the page itself.
        let links = page.links().await.map_err(|e| driver_error(url, e))?;
        for link in links.iter().filter(|l| patterns::is_target_url(l, self.media)) {
            if let Ok(body) = page.fetch(link, self.config.fetch_timeout()).await {
                if let Ok(artifact) = self.verify(link, body) {
                    return Ok(artifact);
                }
            }
        }
        direct
    }

    /// Reloads the page with a download listener armed on its context.
    async fn download_from_page(
        &self,
        page: &dyn PageHandle,
        url: &str,
    ) -> Result<ResolvedArtifact, ResolveError> {
        let mut downloads = self
            .source
            .subscribe_downloads()
            .await
            .map_err(|e| driver_error(url, e))?;
        if let Err(e) = page.goto(url, self.config.navigation_timeout()).await {
            if e == DriverError::PageClosed {
                return Err(ResolveError::PageClosed { url: url.to_string() });
            }
            tracing::debug!(%url, error = %e, "Reload did not complete");
        }
        match self.await_download(&mut downloads, page).await {
            Some(handle) => self.from_download(handle.as_ref()).await,
            None => Err(ResolveError::NotTarget {
                url: url.to_string(),
                expected: self.media.mime_type.clone(),
                found: "no download".into(),
            }),
        }
    }

    /// Bare URL: fetch it from a context carrying the primary session's cookies.
    async fn from_url(&self, url: &str) -> Result<ResolvedArtifact, ResolveError> {
        if url.starts_with("data:") {
            return self.from_data_url(url);
        }
        if url.starts_with("blob:") {
            let body = self
                .origin
                .fetch(url, self.config.fetch_timeout())
                .await
                .map_err(|e| driver_error(url, e))?;
            return self.verify(url, body);
        }

        let context = self
            .cloner
            .clone_from(self.source.as_ref())
            .await
            .map_err(|e| driver_error(url, e))?;
        let page = context.new_page().await.map_err(|e| driver_error(url, e))?;
        let mut downloads = context
            .subscribe_downloads()
            .await
            .map_err(|e| driver_error(url, e))?;

        // Navigating first puts the fetch on the document's origin. An
        // attachment aborts the navigation and starts a download instead,
        // which the nudge below picks up if the fetch fails.
        if let Err(e) = page.goto(url, self.config.navigation_timeout()).await {
            tracing::debug!(%url, error = %e, "Navigation in cloned context did not complete");
        }

        let last = match page.fetch(url, self.config.fetch_timeout()).await {
            Ok(body) => match self.verify(url, body) {
                Ok(artifact) => return Ok(artifact),
                Err(e) => e,
            },
            Err(e) => driver_error(url, e),
        };
        tracing::debug!(%url, error = %last, "Direct fetch failed, nudging for a download");

        match self.await_download(&mut downloads, page.as_ref()).await {
            Some(handle) => self.from_download(handle.as_ref()).await,
            None => Err(last),
        }
    }

    fn from_data_url(&self, url: &str) -> Result<ResolvedArtifact, ResolveError> {
        let (header, data) = url
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(','))
            .ok_or_else(|| ResolveError::Fetch {
                url: truncate(url),
                reason: "malformed data URL".into(),
            })?;
        let declared = header.split(';').next().filter(|m| !m.is_empty());
        let bytes = if header.ends_with(";base64") {
            base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|e| ResolveError::Fetch {
                    url: truncate(url),
                    reason: format!("invalid base64: {e}"),
                })?
        } else {
            data.as_bytes().to_vec()
        };
        self.verify(
            &truncate(url),
            FetchedBody {
                status: 200,
                content_type: declared.map(str::to_string),
                bytes,
            },
        )
    }

    /// Nudges the page and waits a short while for a download to start.
    async fn await_download(
        &self,
        downloads: &mut BoxStream<'static, Arc<dyn DownloadHandle>>,
        page: &dyn PageHandle,
    ) -> Option<Arc<dyn DownloadHandle>> {
        if let Some(handle) = next_within(downloads, Duration::ZERO).await {
            return Some(handle);
        }
        if let Err(e) = page.nudge().await {
            tracing::debug!(error = %e, "Nudge failed");
        }
        next_within(downloads, self.config.download_probe()).await
    }

    /// Accepts a body when the server or the bytes say it is the target media.
    fn verify(&self, url: &str, body: FetchedBody) -> Result<ResolvedArtifact, ResolveError> {
        if !(200..300).contains(&body.status) {
            return Err(ResolveError::Fetch {
                url: url.to_string(),
                reason: format!("HTTP {}", body.status),
            });
        }
        let declared = body
            .content_type
            .as_deref()
            .is_some_and(|ct| self.media.matches_content_type(ct));
        if !declared && !self.media.matches_bytes(&body.bytes) {
            let found = body
                .content_type
                .as_deref()
                .and_then(mime::normalize_content_type)
                .or_else(|| mime::sniff(&body.bytes).map(str::to_string))
                .unwrap_or_else(|| "unknown content".into());
            return Err(ResolveError::NotTarget {
                url: url.to_string(),
                expected: self.media.mime_type.clone(),
                found,
            });
        }
        let mime_type = mime::infer(body.content_type.as_deref(), Some(url), &body.bytes);
        Ok(ResolvedArtifact {
            bytes: body.bytes,
            mime_type,
            source_url: Some(url.to_string()),
            suggested_filename: None,
            temp_path: None,
        })
    }
}

async fn next_within(
    downloads: &mut BoxStream<'static, Arc<dyn DownloadHandle>>,
    wait: Duration,
) -> Option<Arc<dyn DownloadHandle>> {
    if wait.is_zero() {
        return futures::FutureExt::now_or_never(downloads.next()).flatten();
    }
    tokio::time::timeout(wait, downloads.next()).await.ok().flatten()
}

fn driver_error(url: &str, e: DriverError) -> ResolveError {
    match e {
        DriverError::PageClosed => ResolveError::PageClosed { url: url.to_string() },
        source => ResolveError::Driver {
            url: url.to_string(),
            source,
        },
    }
}

fn is_fetchable(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    ["http://", "https://", "data:", "blob:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Data URLs can be huge; keep error messages readable.
fn truncate(url: &str) -> String {
    match url.char_indices().nth(64) {
        Some((i, _)) => format!("{}...", &url[..i]),
        None => url.to_string(),
    }
}
