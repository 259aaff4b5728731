//! MIME inference and the requested target media.

use serde::{Deserialize, Serialize};

pub const GENERIC_BINARY: &str = "application/octet-stream";

/// Extension to MIME type. First entry for a MIME type is its canonical extension.
const EXTENSIONS: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("zip", "application/zip"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
];

pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, m)| *m)
}

pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let mime = normalize_content_type(mime)?;
    EXTENSIONS
        .iter()
        .find(|(_, m)| *m == mime)
        .map(|(e, _)| *e)
}

/// Lower-case extension of the last path segment of a URL or file name.
pub fn extension_of(path_or_url: &str) -> Option<String> {
    let without_query = path_or_url
        .split(['?', '#'])
        .next()
        .unwrap_or(path_or_url);
    let segment = without_query.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Strips parameters and lower-cases a `Content-Type` value.
pub fn normalize_content_type(header: &str) -> Option<String> {
    let base = header.split(';').next()?.trim().to_ascii_lowercase();
    (!base.is_empty()).then_some(base)
}

/// Identifies well-known formats from their leading bytes.
pub fn sniff(bytes: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"%PDF-", "application/pdf"),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xFF\xD8\xFF", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"PK\x03\x04", "application/zip"),
    ];

    // Some servers prepend whitespace or a BOM before the PDF header.
    let trimmed = skip_leading_noise(bytes);
    for (magic, mime) in SIGNATURES {
        if trimmed.starts_with(magic) {
            return Some(mime);
        }
    }
    if trimmed.len() >= 12 && &trimmed[..4] == b"RIFF" && &trimmed[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    let head = String::from_utf8_lossy(&trimmed[..trimmed.len().min(256)]).to_ascii_lowercase();
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        return Some("text/html");
    }
    None
}

fn skip_leading_noise(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start.min(1024)..]
}

/// Content-Type header first, then the URL or filename extension, then the
/// bytes themselves, then a generic binary type. Never fails.
pub fn infer(content_type: Option<&str>, url_or_name: Option<&str>, bytes: &[u8]) -> String {
    if let Some(ct) = content_type.and_then(normalize_content_type) {
        if ct != GENERIC_BINARY && ct != "binary/octet-stream" {
            return ct;
        }
    }
    if let Some(mime) = url_or_name
        .and_then(extension_of)
        .and_then(|ext| mime_for_extension(&ext))
    {
        return mime.to_string();
    }
    sniff(bytes).unwrap_or(GENERIC_BINARY).to_string()
}

/// The document type an acquisition is looking for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMedia {
    pub mime_type: String,
    pub extension: String,
    /// Other content types servers use for the same format.
    pub aliases: Vec<String>,
}

impl TargetMedia {
    pub fn pdf() -> Self {
        Self {
            mime_type: "application/pdf".into(),
            extension: "pdf".into(),
            aliases: vec!["application/x-pdf".into(), "application/acrobat".into()],
        }
    }

    /// Builds a target from a short file type such as `"pdf"` or `"xlsx"`.
    pub fn from_file_type(file_type: &str) -> Option<Self> {
        let ext = file_type.trim().trim_start_matches('.').to_ascii_lowercase();
        if ext == "pdf" {
            return Some(Self::pdf());
        }
        let mime = mime_for_extension(&ext)?;
        let aliases = match ext.as_str() {
            "csv" => vec!["application/csv".into()],
            "xlsx" | "xls" => vec!["application/vnd.ms-excel".into()],
            "zip" => vec!["application/x-zip-compressed".into()],
            _ => Vec::new(),
        };
        Some(Self {
            mime_type: mime.to_string(),
            extension: ext,
            aliases,
        })
    }

    pub fn matches_content_type(&self, content_type: &str) -> bool {
        match normalize_content_type(content_type) {
            Some(ct) => ct == self.mime_type || self.aliases.iter().any(|a| *a == ct),
            None => false,
        }
    }

    pub fn matches_extension(&self, path_or_url: &str) -> bool {
        extension_of(path_or_url).as_deref() == Some(self.extension.as_str())
    }

    /// True when the bytes look like this media type.
    pub fn matches_bytes(&self, bytes: &[u8]) -> bool {
        sniff(bytes).is_some_and(|mime| self.matches_content_type(mime))
    }
}

impl Default for TargetMedia {
    fn default() -> Self {
        Self::pdf()
    }
}
