//! Core data types shared by the capture engine and its drivers.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::{DownloadHandle, PageHandle};
use crate::policy::Strategy;

/// What to act on. Either part may be absent, but not both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub selector: Option<String>,
    pub text: Option<String>,
}

impl Locator {
    pub fn new(selector: Option<String>, text: Option<String>) -> Self {
        let selector = selector.filter(|s| !s.trim().is_empty());
        let text = text.filter(|t| !t.trim().is_empty());
        Self { selector, text }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Some(selector.into()), None)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(None, Some(text.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.selector.is_none() && self.text.is_none()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.selector, &self.text) {
            (Some(s), Some(t)) => write!(f, "{s} with text \"{t}\""),
            (Some(s), None) => write!(f, "{s}"),
            (None, Some(t)) => write!(f, "text \"{t}\""),
            (None, None) => write!(f, "<empty locator>"),
        }
    }
}

/// A UI action the actuator can perform against a located element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UiAction {
    Click,
    Hover,
    Fill(String),
    Select(Vec<String>),
}

impl UiAction {
    pub fn name(&self) -> &'static str {
        match self {
            UiAction::Click => "click",
            UiAction::Hover => "hover",
            UiAction::Fill(_) => "fill",
            UiAction::Select(_) => "select",
        }
    }
}

/// What to click and how long to wait for a result. Immutable per call.
#[derive(Debug, Clone)]
pub struct ActionTrigger {
    pub locator: Locator,
    pub wait: Duration,
}

impl ActionTrigger {
    pub fn new(locator: Locator, wait: Duration) -> Self {
        Self { locator, wait }
    }
}

/// A browser cookie, detached from any driver representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Seconds since the epoch; `None` for session cookies.
    pub expires: Option<f64>,
}

/// Whether a recorded network event was the outgoing request or the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkEventKind {
    Request,
    Response,
}

/// One request or response observed on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub kind: NetworkEventKind,
    pub url: String,
    pub status: Option<u16>,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
}

impl NetworkEvent {
    pub fn request(url: impl Into<String>) -> Self {
        Self {
            kind: NetworkEventKind::Request,
            url: url.into(),
            status: None,
            headers: HashMap::new(),
        }
    }

    pub fn response(url: impl Into<String>, status: u16, headers: HashMap<String, String>) -> Self {
        Self {
            kind: NetworkEventKind::Response,
            url: url.into(),
            status: Some(status),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// What the document currently loaded in a page declares about itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub url: String,
    pub content_type: Option<String>,
    /// True when the page hosts an `<embed>`/`<object>`/`<iframe>` viewer for a document.
    pub embedded_viewer: bool,
}

/// Bytes fetched from inside a page, crediting that page's session.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A console line emitted by a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: String,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A not-yet-verified reference produced by one signal source.
#[derive(Clone)]
pub enum CandidateSignal {
    NativeDownload { handle: Arc<dyn DownloadHandle> },
    NewPage { page: Arc<dyn PageHandle>, url: String },
    ResponseUrl { url: String },
    HookedUrl { url: String },
    /// A URL found in the page itself: a new link or a script literal.
    LinkUrl { url: String },
}

impl CandidateSignal {
    /// The URL this candidate points at, when one is known.
    pub fn url(&self) -> Option<&str> {
        match self {
            CandidateSignal::NativeDownload { handle } => {
                let url = handle.url();
                (!url.is_empty()).then_some(url)
            }
            CandidateSignal::NewPage { url, .. }
            | CandidateSignal::ResponseUrl { url }
            | CandidateSignal::HookedUrl { url }
            | CandidateSignal::LinkUrl { url } => Some(url.as_str()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CandidateSignal::NativeDownload { .. } => "native_download",
            CandidateSignal::NewPage { .. } => "new_page",
            CandidateSignal::ResponseUrl { .. } => "response_url",
            CandidateSignal::HookedUrl { .. } => "hooked_url",
            CandidateSignal::LinkUrl { .. } => "link_url",
        }
    }
}

impl fmt::Debug for CandidateSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateSignal")
            .field("kind", &self.kind())
            .field("url", &self.url())
            .finish()
    }
}

/// A candidate tagged with the strategy that produced it.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub strategy: Strategy,
    pub signal: CandidateSignal,
}

/// Terminal product of a successful resolution.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub source_url: Option<String>,
    /// Name the server suggested, when the bytes came from a native download.
    pub suggested_filename: Option<String>,
    /// File the browser wrote for a native download, removed after persisting.
    pub temp_path: Option<PathBuf>,
}

/// An entry in the artifact store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub size: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of one acquisition call.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionReport {
    pub strategy: Strategy,
    pub source_url: Option<String>,
    /// Present when bytes were resolved and stored.
    pub artifact: Option<StoredArtifact>,
    pub saved_to: Option<PathBuf>,
    /// Candidate URLs tried and rejected before the winner.
    pub attempted: Vec<String>,
    pub elapsed_ms: u64,
}

/// Summary of a stored artifact, without its bytes.
#[derive(Debug, Clone, Serialize)]
pub struct StoredArtifact {
    pub name: String,
    pub mime_type: String,
    pub size: usize,
}
