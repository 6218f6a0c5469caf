//! Content store: raw file bytes and their fingerprints.
//!
//! The [`ContentStore`] trait is the only way the synchronizer and the
//! editor session touch file contents, so tests can substitute a store
//! and the core never assumes a particular backing. [`FsContentStore`]
//! is the local-disk implementation; [`MemoryContentStore`] keeps
//! everything in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};

/// Read/write access to document bytes.
///
/// Paths are resolved by the implementation; [`FsContentStore`] treats
/// relative paths as relative to its root.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Content hash of the bytes currently stored under `path`.
    async fn fingerprint(&self, path: &str) -> Result<String>;

    async fn modified_at(&self, path: &str) -> Result<DateTime<Utc>>;
}

/// Lowercase hex SHA-256.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Plain filesystem store rooted at a notes directory.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute paths pass through unchanged.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        tokio::fs::read(&full).await.map_err(|e| Error::io(full, e))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| Error::io(full, e))
    }

    async fn fingerprint(&self, path: &str) -> Result<String> {
        let bytes = self.read(path).await?;
        Ok(fingerprint_bytes(&bytes))
    }

    async fn modified_at(&self, path: &str) -> Result<DateTime<Utc>> {
        let full = self.resolve(path);
        let metadata = tokio::fs::metadata(&full)
            .await
            .map_err(|e| Error::io(&full, e))?;
        let modified = metadata.modified().map_err(|e| Error::io(&full, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

/// In-memory store for hosts without a disk and for tests.
///
/// [`insert`](Self::insert) simulates an external writer: it changes
/// content without counting as a write through the store.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    files: Mutex<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.lock().insert(path.to_string(), (bytes.into(), Utc::now()));
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().get(path).map(|(bytes, _)| bytes.clone())
    }

    /// Number of successful [`ContentStore::write`] calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes subsequent writes fail with a permission error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Vec<u8>, DateTime<Utc>)>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn missing(path: &str) -> Error {
        Error::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such document"),
        )
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.get(path).ok_or_else(|| Self::missing(path))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "writes disabled"),
            ));
        }
        self.insert(path, bytes);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fingerprint(&self, path: &str) -> Result<String> {
        let bytes = self.read(path).await?;
        Ok(fingerprint_bytes(&bytes))
    }

    async fn modified_at(&self, path: &str) -> Result<DateTime<Utc>> {
        self.lock()
            .get(path)
            .map(|(_, modified)| *modified)
            .ok_or_else(|| Self::missing(path))
    }
}
