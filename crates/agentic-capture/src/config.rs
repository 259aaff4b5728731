//! Engine timing and behaviour knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_WAIT_MS: u64 = 20_000;
pub const DEFAULT_SETTLE_MS: u64 = 500;
pub const DEFAULT_DOWNLOAD_GRACE_MS: u64 = 10_000;
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_DOWNLOAD_PROBE_MS: u64 = 1_500;

/// Timeouts used by the coordinator and the content resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Shared deadline for one acquisition when the caller does not give one.
    pub default_wait_ms: u64,
    /// Time left for late signals after an early exit.
    pub settle_ms: u64,
    /// Extra time for a download that started before the deadline.
    pub download_grace_ms: u64,
    pub navigation_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    /// How long to look for a download right after navigating to a bare URL.
    pub download_probe_ms: u64,
    /// Close pages the click opened once the call is over.
    pub close_spawned_pages: bool,
}

impl CaptureConfig {
    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn download_grace(&self) -> Duration {
        Duration::from_millis(self.download_grace_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn download_probe(&self) -> Duration {
        Duration::from_millis(self.download_probe_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            default_wait_ms: DEFAULT_WAIT_MS,
            settle_ms: DEFAULT_SETTLE_MS,
            download_grace_ms: DEFAULT_DOWNLOAD_GRACE_MS,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            download_probe_ms: DEFAULT_DOWNLOAD_PROBE_MS,
            close_spawned_pages: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: CaptureConfig = serde_json::from_str(r#"{"settle_ms": 50}"#).unwrap();
        assert_eq!(config.settle(), Duration::from_millis(50));
        assert_eq!(config.default_wait_ms, DEFAULT_WAIT_MS);
        assert!(config.close_spawned_pages);
    }
}
