//! Materializing `@import` sources into the local cache
//!
//! Supported locators:
//! - local files and directories (relative to the working directory, optional `file://`)
//! - `.tar.gz` / `.tgz` archives, local or over `http(s)://`
//! - plain `http(s)://` files
//! - git repositories: `git::<url>`, `git@host:org/repo`, or URLs ending in `.git`,
//!   with an optional `?ref=<branch-or-tag>`

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{CoreError, Result};

/// Retrieves an import source to a local path
pub trait SourceFetcher: Send + Sync {
    /// Fetch `source` so that it exists at `dest`
    ///
    /// File sources become a file at `dest`; directory, archive and git sources
    /// become a directory at `dest`.
    fn fetch(&self, source: &str, dest: &Path) -> Result<()>;
}

/// Deterministic cache location for an import source
///
/// The alphanumeric slug keeps the directory recognizable, the hash suffix
/// keeps sources that only differ in punctuation apart.
pub fn cache_path(cache_dir: &Path, source: &str) -> PathBuf {
    let slug: String = source
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(64)
        .collect();
    let digest = Sha256::digest(source.as_bytes());
    let hash = hex::encode(&digest[..6]);
    cache_dir.join(format!("{}-{}", slug, hash))
}

/// What kind of locator an import source is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Local(PathBuf),
    LocalArchive(PathBuf),
    RemoteArchive(String),
    RemoteFile(String),
    Git { url: String, reference: Option<String> },
}

impl SourceKind {
    /// Classify a source string
    pub fn classify(source: &str, working_dir: &Path) -> Self {
        let source = source.trim();

        if let Some(rest) = source.strip_prefix("git::") {
            let (url, reference) = split_ref(rest);
            return SourceKind::Git { url, reference };
        }
        let (without_ref, reference) = split_ref(source);
        if source.starts_with("git@") || without_ref.ends_with(".git") {
            return SourceKind::Git {
                url: without_ref,
                reference,
            };
        }

        if source.starts_with("http://") || source.starts_with("https://") {
            return if is_archive(source) {
                SourceKind::RemoteArchive(source.to_string())
            } else {
                SourceKind::RemoteFile(source.to_string())
            };
        }

        let local = source.strip_prefix("file://").unwrap_or(source);
        let path = if Path::new(local).is_absolute() {
            PathBuf::from(local)
        } else {
            working_dir.join(local)
        };
        if is_archive(local) {
            SourceKind::LocalArchive(path)
        } else {
            SourceKind::Local(path)
        }
    }
}

fn split_ref(source: &str) -> (String, Option<String>) {
    match source.split_once("?ref=") {
        Some((url, reference)) => (url.to_string(), Some(reference.to_string())),
        None => (source.to_string(), None),
    }
}

fn is_archive(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.ends_with(".tar.gz") || lower.ends_with(".tgz")
}

/// Fetcher used by default: filesystem, HTTP and git
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    working_dir: PathBuf,
}

impl DefaultFetcher {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    fn fetch_kind(&self, source: &str, kind: SourceKind, dest: &Path) -> Result<()> {
        match kind {
            SourceKind::Local(path) => {
                if path.is_dir() {
                    copy_dir_recursive(&path, dest)
                } else if path.is_file() {
                    if let Some(parent) = dest.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::copy(&path, dest)?;
                    Ok(())
                } else {
                    Err(fetch_error(source, format!("{} does not exist", path.display())))
                }
            }
            SourceKind::LocalArchive(path) => {
                let data = std::fs::read(&path)?;
                extract_archive(&data, dest)
            }
            SourceKind::RemoteArchive(url) => {
                let data = download(source, &url)?;
                extract_archive(&data, dest)
            }
            SourceKind::RemoteFile(url) => {
                let data = download(source, &url)?;
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(dest, data)?;
                Ok(())
            }
            SourceKind::Git { url, reference } => git_clone(source, &url, reference.as_deref(), dest),
        }
    }
}

impl SourceFetcher for DefaultFetcher {
    fn fetch(&self, source: &str, dest: &Path) -> Result<()> {
        let kind = SourceKind::classify(source, &self.working_dir);
        tracing::debug!(source, dest = %dest.display(), ?kind, "fetching import source");

        let result = self.fetch_kind(source, kind, dest);
        if result.is_err() {
            // Never leave a half-written entry that would look like a cache hit
            let _ = std::fs::remove_dir_all(dest).or_else(|_| std::fs::remove_file(dest));
        }
        result.map_err(|e| match e {
            CoreError::ImportFetch { .. } => e,
            other => fetch_error(source, other.to_string()),
        })
    }
}

fn fetch_error(source: &str, message: impl Into<String>) -> CoreError {
    CoreError::ImportFetch {
        source_ref: source.to_string(),
        message: message.into(),
    }
}

fn download(source: &str, url: &str) -> Result<Vec<u8>> {
    let url = url::Url::parse(url).map_err(|e| fetch_error(source, format!("invalid URL: {}", e)))?;
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| fetch_error(source, e.to_string()))?;
    let bytes = response
        .bytes()
        .map_err(|e| fetch_error(source, e.to_string()))?;
    Ok(bytes.to_vec())
}

fn git_clone(source: &str, url: &str, reference: Option<&str>, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut cmd = Command::new("git");
    cmd.arg("clone").arg("--depth").arg("1");
    if let Some(reference) = reference {
        cmd.arg("--branch").arg(reference);
    }
    cmd.arg(url).arg(dest);

    let output = cmd
        .output()
        .map_err(|e| fetch_error(source, format!("failed to run git: {}", e)))?;
    if !output.status.success() {
        return Err(fetch_error(
            source,
            format!(
                "git clone exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    Ok(())
}

/// Extract a tar.gz archive
fn extract_archive(data: &[u8], dest: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let gz = GzDecoder::new(std::io::Cursor::new(data));
    let mut archive = Archive::new(gz);

    std::fs::create_dir_all(dest)?;
    archive.unpack(dest)?;

    Ok(())
}

/// Copy directory recursively
fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|e| CoreError::Io(std::io::Error::other(e.to_string())))?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}
