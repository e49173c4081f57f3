//! Utility functions for document persistence and artifact naming

use crate::error::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Read a JSON document, falling back to `T::default()` when the file is
/// missing, unreadable or corrupt
///
/// Corruption is logged and never returned as an error: a damaged document
/// must not stop the process from starting.
pub async fn load_json_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Document not found, starting empty");
            return T::default();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read document, starting empty");
            return T::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Corrupt document, starting empty");
            T::default()
        }
    }
}

/// Serialize `value` as pretty JSON and replace `path` atomically
///
/// The document is written to a sibling temp file and renamed over the
/// target, so readers see either the old or the new content.
pub async fn write_json_atomic<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let data = serde_json::to_vec_pretty(value)?;
    let temp_path = unique_sibling(path, "tmp");
    tokio::fs::write(&temp_path, &data).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

/// A sibling path of `path` that no other caller in this process will use
///
/// Used for temp documents and partial downloads so concurrent writers never
/// share a scratch file.
pub fn unique_sibling(path: &Path, suffix: &str) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        "{}.{}.{}.{}",
        file_name,
        std::process::id(),
        n,
        suffix
    ))
}

/// File extension of the last path segment of a download URL
///
/// Returns `None` for URLs without a usable extension, e.g.
/// `https://cdn.example.com/get?id=1`.
///
/// # Examples
///
/// ```
/// use mirror_watch::utils::extension_from_url;
///
/// assert_eq!(extension_from_url("https://cdn.example.com/a/MaaCore.7z?t=1").as_deref(), Some("7z"));
/// assert_eq!(extension_from_url("https://cdn.example.com/download"), None);
/// ```
pub fn extension_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Replace characters that are not safe in local file names
pub fn sanitize_file_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Compute the lowercase hex sha256 of a file
pub async fn sha256_file(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
