//! Strategy ranking presets for the acquisition tool variants.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One way an artifact reference can be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NativeDownload,
    NewPage,
    CurrentPageRedirect,
    HookedUrl,
    NetworkResponse,
    DomLink,
    ScriptLiteral,
}

impl Strategy {
    pub const ALL: [Strategy; 7] = [
        Strategy::NativeDownload,
        Strategy::NewPage,
        Strategy::CurrentPageRedirect,
        Strategy::HookedUrl,
        Strategy::NetworkResponse,
        Strategy::DomLink,
        Strategy::ScriptLiteral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::NativeDownload => "native_download",
            Strategy::NewPage => "new_page",
            Strategy::CurrentPageRedirect => "current_page_redirect",
            Strategy::HookedUrl => "hooked_url",
            Strategy::NetworkResponse => "network_response",
            Strategy::DomLink => "dom_link",
            Strategy::ScriptLiteral => "script_literal",
        }
    }

    /// Whether this strategy's signal is strong enough to end the race early.
    pub fn is_definitive(&self) -> bool {
        matches!(
            self,
            Strategy::NativeDownload | Strategy::NewPage | Strategy::HookedUrl
        )
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which signal sources are armed, how their candidates rank, and what the
/// call returns once a candidate is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyPolicy {
    /// Highest priority first. Strategies not listed are never armed.
    pub ranking: Vec<Strategy>,
    /// Fetch bytes and store them; when false the first candidate URL is the result.
    pub resolve_bytes: bool,
    /// Leave the race as soon as a definitive signal fires.
    pub early_exit: bool,
    /// Route bare URLs through a cloned context even when the originating
    /// page could read them directly.
    pub prefer_cloned_session: bool,
    /// Extra time allowed after an early exit for late secondary signals.
    pub settle: Duration,
}

impl StrategyPolicy {
    pub fn arms(&self, strategy: Strategy) -> bool {
        self.ranking.contains(&strategy)
    }

    /// Download, then new page, then redirect, then hook, then responses.
    pub fn capture() -> Self {
        Self {
            ranking: vec![
                Strategy::NativeDownload,
                Strategy::NewPage,
                Strategy::CurrentPageRedirect,
                Strategy::HookedUrl,
                Strategy::NetworkResponse,
            ],
            resolve_bytes: true,
            early_exit: true,
            prefer_cloned_session: false,
            settle: Duration::from_millis(500),
        }
    }

    /// The new tab is the expected outcome, so it ranks ahead of downloads.
    pub fn capture_new_tab() -> Self {
        Self {
            ranking: vec![
                Strategy::NewPage,
                Strategy::NativeDownload,
                Strategy::CurrentPageRedirect,
                Strategy::HookedUrl,
            ],
            ..Self::capture()
        }
    }

    /// Every strategy, in the full fallback order.
    pub fn force_download() -> Self {
        Self {
            ranking: Strategy::ALL.to_vec(),
            ..Self::capture()
        }
    }

    /// Like [`StrategyPolicy::force_download`], but bare URLs always go
    /// through a context carrying the session's cookies.
    pub fn download_authenticated() -> Self {
        Self {
            prefer_cloned_session: true,
            ..Self::force_download()
        }
    }

    /// Report the best candidate URL without fetching it.
    pub fn extract_url() -> Self {
        Self {
            ranking: vec![
                Strategy::HookedUrl,
                Strategy::NewPage,
                Strategy::CurrentPageRedirect,
                Strategy::NetworkResponse,
                Strategy::DomLink,
                Strategy::ScriptLiteral,
            ],
            resolve_bytes: false,
            ..Self::capture()
        }
    }

    /// Same ranking as [`StrategyPolicy::capture`]; the caller persists the result.
    pub fn download_to_path() -> Self {
        Self::capture()
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self::capture()
    }
}
