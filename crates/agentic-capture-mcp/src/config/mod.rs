//! Server configuration and download directory resolution.

use std::path::PathBuf;

use agentic_capture::{CaptureConfig, ChromiumOptions};

pub const DOWNLOAD_DIR_ENV: &str = "CAPTURE_DOWNLOAD_DIR";

/// Prefix of files written by the persisting tools when the caller gives none.
pub const DEFAULT_PREFIX: &str = "download";

/// Everything the session manager needs to start a browser and run tools.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Where `browser_click_and_download_to_path` and `download_file` write.
    pub download_dir: PathBuf,
    pub chromium: ChromiumOptions,
    pub capture: CaptureConfig,
}

impl ServerConfig {
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            download_dir,
            chromium: ChromiumOptions::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(resolve_download_dir(None))
    }
}

/// Explicit flag, then `CAPTURE_DOWNLOAD_DIR`, then `~/Downloads`, then
/// `./downloads`.
pub fn resolve_download_dir(explicit: Option<&str>) -> PathBuf {
    if let Some(dir) = explicit.filter(|d| !d.trim().is_empty()) {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var(DOWNLOAD_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}
