//! Error taxonomy for the capture engine.

/// Failures reported by a browser driver.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("Browser not available: {0}")]
    Unavailable(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Page is closed")]
    PageClosed,

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Script error: {0}")]
    Script(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::Io(e.to_string())
    }
}

/// Failures of the resilient actuator.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("No element matches {0}")]
    TargetNotFound(String),

    /// Raised by a driver for a strict attempt; the actuator never returns it.
    #[error("{locator} matched {count} elements")]
    StrictViolation { locator: String, count: usize },

    #[error("{locator} matched {matches} elements and acting on the first one failed: {reason}")]
    AmbiguousTargetFailed {
        locator: String,
        matches: usize,
        reason: String,
    },

    #[error("{action} on {locator} failed: {reason}")]
    Failed {
        action: String,
        locator: String,
        reason: String,
    },
}

/// Failures resolving one candidate. Non-fatal unless it was the last one.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("{url} is not the requested {expected} document (found {found})")]
    NotTarget {
        url: String,
        expected: String,
        found: String,
    },

    #[error("Page closed before its content could be read: {url}")]
    PageClosed { url: String },

    #[error("Fetching {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Download of {url} did not complete within {waited_ms}ms")]
    DownloadTimeout { url: String, waited_ms: u64 },

    #[error("Driver error while resolving {url}: {source}")]
    Driver { url: String, source: DriverError },
}

impl ResolveError {
    pub fn url(&self) -> &str {
        match self {
            ResolveError::NotTarget { url, .. }
            | ResolveError::PageClosed { url }
            | ResolveError::Fetch { url, .. }
            | ResolveError::DownloadTimeout { url, .. }
            | ResolveError::Driver { url, .. } => url,
        }
    }
}

/// Structured failure of a whole acquisition call.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("No artifact found: {reason}")]
    NoArtifactFound {
        reason: String,
        best_url: Option<String>,
    },

    #[error("Download of {url} did not complete within {waited_ms}ms")]
    DownloadTimeout { url: String, waited_ms: u64 },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The artifact resolved but could not be written to its directory.
    /// Nothing was stored in that case.
    #[error("Could not save to {}: {source}", directory.display())]
    Persist {
        directory: std::path::PathBuf,
        source_url: Option<String>,
        source: std::io::Error,
    },
}

impl CaptureError {
    /// The best-known URL for manual follow-up, when there is one.
    pub fn best_url(&self) -> Option<&str> {
        match self {
            CaptureError::NoArtifactFound { best_url, .. } => best_url.as_deref(),
            CaptureError::DownloadTimeout { url, .. } => Some(url),
            CaptureError::Resolve(e) => Some(e.url()),
            CaptureError::Persist { source_url, .. } => source_url.as_deref(),
            _ => None,
        }
    }

    /// Stable, machine-readable kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::Action(ActionError::TargetNotFound(_)) => "target_not_found",
            CaptureError::Action(ActionError::AmbiguousTargetFailed { .. }) => {
                "ambiguous_target_failed"
            }
            CaptureError::Action(_) => "action_error",
            CaptureError::NoArtifactFound { .. } => "no_artifact_found",
            CaptureError::DownloadTimeout { .. } => "download_timeout",
            CaptureError::Resolve(_) => "resolve_error",
            CaptureError::Driver(_) => "driver_error",
            CaptureError::Persist { .. } => "persist_failed",
        }
    }
}

/// Convenience result types.
pub type DriverResult<T> = Result<T, DriverError>;
pub type CaptureResult<T> = Result<T, CaptureError>;
