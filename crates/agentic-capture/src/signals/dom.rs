//! Links and script literals read from the page DOM.

use std::collections::HashSet;

use crate::driver::PageHandle;
use crate::error::DriverResult;
use crate::mime::TargetMedia;
use crate::patterns;

/// Links present before the click.
pub struct LinkSnapshot {
    links: HashSet<String>,
}

impl LinkSnapshot {
    pub async fn capture(page: &dyn PageHandle) -> DriverResult<Self> {
        Ok(Self::from_links(page.links().await?))
    }

    pub fn from_links(links: impl IntoIterator<Item = String>) -> Self {
        Self {
            links: links.into_iter().collect(),
        }
    }

    /// Target-looking links in `after` that were not here before, resolved
    /// against `base`, in document order.
    pub fn new_links(&self, after: &[String], base: &str, media: &TargetMedia) -> Vec<String> {
        let mut seen = HashSet::new();
        after
            .iter()
            .filter(|href| !self.links.contains(*href))
            .filter_map(|href| patterns::resolve_url(base, href))
            .filter(|url| patterns::is_target_url(url, media))
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }
}

/// Target-looking URL literals in the page's inline scripts.
pub async fn script_literals(page: &dyn PageHandle, base: &str, media: &TargetMedia) -> Vec<String> {
    match page.inline_scripts().await {
        Ok(text) => patterns::extract_script_literals(&text, base, media),
        Err(e) => {
            tracing::debug!(error = %e, "Could not read inline scripts");
            Vec::new()
        }
    }
}
