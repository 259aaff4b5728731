//! URL heuristics for recognising document links.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::mime::TargetMedia;

/// Path or query words that usually point at a generated document.
pub const DOCUMENT_KEYWORDS: &[&str] = &[
    "download",
    "export",
    "report",
    "generate",
    "print",
    "attachment",
    "certificate",
    "certificado",
    "descargar",
    "documento",
];

/// True when a URL plausibly serves the target media.
///
/// `blob:` URLs are always accepted since nothing about them can be checked
/// without reading them. `data:` URLs are accepted when they declare the
/// target MIME type.
pub fn is_target_url(url: &str, media: &TargetMedia) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    if lower.starts_with("blob:") {
        return true;
    }
    if let Some(rest) = lower.strip_prefix("data:") {
        let declared = rest.split([';', ',']).next().unwrap_or_default();
        return media.matches_content_type(declared);
    }
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return false;
    }
    if media.matches_extension(&lower) {
        return true;
    }

    let Ok(parsed) = url::Url::parse(&lower) else {
        return false;
    };
    for (key, value) in parsed.query_pairs() {
        if (key == "format" || key == "type" || key == "ext") && value == media.extension {
            return true;
        }
    }
    let haystack = format!("{}?{}", parsed.path(), parsed.query().unwrap_or_default());
    DOCUMENT_KEYWORDS.iter().any(|k| haystack.contains(k))
}

/// Resolves `href` against `base`, keeping only fetchable schemes.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("mailto:") || lower.starts_with("tel:")
    {
        return None;
    }
    if lower.starts_with("blob:") || lower.starts_with("data:") {
        return Some(href.to_string());
    }
    let resolved = match url::Url::parse(base) {
        Ok(base) => base.join(href).ok()?,
        Err(_) => url::Url::parse(href).ok()?,
    };
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

fn literal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"["'`]((?:https?://|/|\./|\.\./)?[A-Za-z0-9_\-./?=&%:+~]{3,2048})["'`]"#)
            .expect("valid regex")
    })
}

/// Pulls quoted URL-ish literals out of script text and keeps the ones that
/// look like the target document. Order of first appearance is preserved.
pub fn extract_script_literals(script: &str, base: &str, media: &TargetMedia) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for cap in literal_regex().captures_iter(script) {
        let Some(raw) = cap.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if !raw.contains('/') && !raw.contains('.') {
            continue;
        }
        let Some(resolved) = resolve_url(base, raw) else {
            continue;
        };
        if is_target_url(&resolved, media) && seen.insert(resolved.clone()) {
            urls.push(resolved);
        }
    }
    urls
}

/// Regex source, usable from page JavaScript, matching the same URLs
/// [`is_target_url`] accepts by extension or keyword.
pub fn hook_pattern_source(media: &TargetMedia) -> String {
    let ext = regex::escape(&media.extension);
    format!(
        r"\.{ext}([?#]|$)|[?&](format|type|ext)={ext}(&|$)|^blob:|{}",
        DOCUMENT_KEYWORDS.join("|")
    )
}
