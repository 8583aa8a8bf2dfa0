//! Local file storage collaborator.
//!
//! Attachments never cross the wire as local paths. The sender registers the
//! path and sends an opaque `fid:<id>`; the receiver fetches the bytes from the
//! sender's `/fs?id=<id>` endpoint into a path allocated here.

use crate::error::{Result, TetherError};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// URI scheme for attachments that still live on the remote device.
pub const FILE_ID_SCHEME: &str = "fid:";

/// Build a `fid:<id>` URI.
#[must_use]
pub fn file_uri(file_id: &str) -> String {
    format!("{FILE_ID_SCHEME}{file_id}")
}

/// File id of a `fid:<id>` URI, or `None` for anything else.
#[must_use]
pub fn parse_file_uri(uri: &str) -> Option<&str> {
    uri.strip_prefix(FILE_ID_SCHEME).filter(|id| !id.is_empty())
}

/// Where downloads go and which local files may be served to peers.
pub trait LocalFileStore: Send + Sync {
    /// Reserve a fresh local path for a download of `file_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the download directory cannot be prepared.
    fn allocate_download_path(&self, file_name: &str) -> Result<PathBuf>;

    /// Register `path` for serving and return its opaque id. Registering the
    /// same path twice yields the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a readable file.
    fn file_id_for(&self, path: &Path) -> Result<String>;

    /// Local path behind a registered id.
    fn resolve(&self, file_id: &str) -> Option<PathBuf>;

    /// Hand a completed download to the platform media index.
    fn index_media(&self, path: &Path);
}

/// [`LocalFileStore`] rooted at a downloads directory.
#[derive(Debug)]
pub struct DirFileStore {
    download_dir: PathBuf,
    by_id: DashMap<String, PathBuf>,
    by_path: DashMap<PathBuf, String>,
    indexed: Mutex<Vec<PathBuf>>,
}

impl DirFileStore {
    /// Create a store placing downloads under `download_dir`.
    #[must_use]
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            by_id: DashMap::new(),
            by_path: DashMap::new(),
            indexed: Mutex::new(Vec::new()),
        }
    }

    /// Downloads directory.
    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Paths passed to [`LocalFileStore::index_media`] so far.
    #[must_use]
    pub fn indexed(&self) -> Vec<PathBuf> {
        self.indexed.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

/// Reduce a peer-supplied name to a single safe path component.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() || c == ':' { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        "download".to_owned()
    } else {
        trimmed.to_owned()
    }
}

impl LocalFileStore for DirFileStore {
    fn allocate_download_path(&self, file_name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.download_dir)?;

        let name = sanitize_file_name(file_name);
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_owned(), format!(".{ext}")),
            _ => (name.clone(), String::new()),
        };

        for n in 0u32.. {
            let candidate = if n == 0 {
                self.download_dir.join(&name)
            } else {
                self.download_dir.join(format!("{stem} ({n}){ext}"))
            };
            // create_new reserves the name against concurrent allocations
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(_) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(TetherError::invalid_state("download names exhausted"))
    }

    fn file_id_for(&self, path: &Path) -> Result<String> {
        let path = path.canonicalize()?;
        if !path.is_file() {
            return Err(TetherError::Io(format!("{} is not a file", path.display())));
        }
        let id = self
            .by_path
            .entry(path.clone())
            .or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .value()
            .clone();
        self.by_id.insert(id.clone(), path);
        Ok(id)
    }

    fn resolve(&self, file_id: &str) -> Option<PathBuf> {
        self.by_id.get(file_id).map(|p| p.value().clone())
    }

    fn index_media(&self, path: &Path) {
        tracing::debug!(path = %path.display(), "indexing media");
        if let Ok(mut indexed) = self.indexed.lock() {
            indexed.push(path.to_path_buf());
        }
    }
}
