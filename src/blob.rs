//! Durable storage for attachment bytes.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._-]").unwrap();
}

/// Stores attachment bytes under keys chosen by the store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `bytes` and returns the key they can be read back with.
    async fn put(&self, filename: &str, bytes: &[u8]) -> io::Result<String>;

    async fn get(&self, key: &str) -> io::Result<Vec<u8>>;

    async fn remove(&self, key: &str) -> io::Result<()>;
}

/// Keeps blobs as files in a single directory.
#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    root: PathBuf,
}

impl DiskBlobStore {
    /// Opens the store, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid blob key `{}`", key),
            ));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn put(&self, filename: &str, bytes: &[u8]) -> io::Result<String> {
        let key = storage_key(filename);
        tokio::fs::write(self.path_for(&key)?, bytes).await?;
        Ok(key)
    }

    async fn get(&self, key: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.path_for(key)?).await
    }

    async fn remove(&self, key: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Reduces a client-supplied filename to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Builds a collision-resistant key: `<unix millis>-<uuid>-<sanitized name>`.
pub fn storage_key(filename: &str) -> String {
    format!(
        "{}-{}-{}",
        chrono::Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        sanitize_filename(filename)
    )
}
