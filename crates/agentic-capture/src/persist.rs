//! Saving resolved artifacts to disk under dated names.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::mime;
use crate::types::ResolvedArtifact;

/// Where and under which prefix an artifact is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistTarget {
    pub directory: PathBuf,
    pub prefix: String,
}

impl PersistTarget {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
        }
    }
}

/// `{prefix}_{Month}_{DD}_{YYYY}.{ext}`, e.g. `arl_March_07_2025.pdf`.
pub fn dated_file_name(prefix: &str, date: NaiveDate, extension: &str) -> String {
    let prefix = sanitize(prefix);
    let prefix = if prefix.is_empty() { "document".to_string() } else { prefix };
    format!("{}_{}.{}", prefix, date.format("%B_%d_%Y"), extension)
}

fn sanitize(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// First of `name`, `stem-2.ext`, `stem-3.ext`, ... that does not exist yet.
async fn next_free_path(directory: &Path, name: &str) -> PathBuf {
    let first = directory.join(name);
    if !tokio::fs::try_exists(&first).await.unwrap_or(false) {
        return first;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) => (s.to_string(), format!(".{e}")),
        None => (name.to_string(), String::new()),
    };
    let mut n = 2u32;
    loop {
        let candidate = directory.join(format!("{stem}-{n}{ext}"));
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        n += 1;
    }
}

/// Extension for the artifact: its MIME type first, then its suggested name.
pub fn extension_for(artifact: &ResolvedArtifact) -> String {
    mime::extension_for_mime(&artifact.mime_type)
        .map(str::to_string)
        .or_else(|| {
            artifact
                .suggested_filename
                .as_deref()
                .and_then(mime::extension_of)
        })
        .unwrap_or_else(|| "bin".to_string())
}

/// Writes the artifact under a dated, non-clobbering name and removes the
/// browser's temporary download file. Removal failures are only logged.
pub async fn persist(
    artifact: &ResolvedArtifact,
    target: &PersistTarget,
    date: NaiveDate,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(&target.directory).await?;
    let name = dated_file_name(&target.prefix, date, &extension_for(artifact));
    let path = next_free_path(&target.directory, &name).await;
    tokio::fs::write(&path, &artifact.bytes).await?;
    tracing::info!(path = %path.display(), size = artifact.bytes.len(), "Saved artifact");

    if let Some(temp) = &artifact.temp_path {
        remove_temp(temp).await;
    }
    Ok(path)
}

/// Best-effort removal of a browser temp file.
pub async fn remove_temp(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Could not remove temporary download");
        }
    }
}
