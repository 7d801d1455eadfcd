//! Persisted key → [`CacheEntry`] mapping behind an injectable trait.
//!
//! Reads never fail: a missing, unreadable, or unparsable store is an empty
//! store, and an entry that no longer decodes is a miss. Writes rewrite the
//! whole document and report failures to the caller. There is no locking;
//! concurrent writers to the same file race and the last one wins.
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::record::CacheEntry;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Entry for `key`, or `None` when absent or unreadable.
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Set `key` to `entry`, keeping every other entry.
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;
}

/// Process-local store, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn snapshot(&self) -> HashMap<String, CacheEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.lock().await.insert(key.to_string(), entry);
        Ok(())
    }
}

/// Human-readable JSON document on local disk, e.g. `cache.json`.
///
/// The file is created on first write. Entries that do not decode as a
/// [`CacheEntry`] are left in place on rewrite.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw document; empty when the file is missing or corrupt.
    pub async fn entries(&self) -> BTreeMap<String, Value> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "cache.file.corrupt");
                    BTreeMap::new()
                }
            },
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "cache.file.unreadable");
                BTreeMap::new()
            }
        }
    }

    async fn write_document(&self, doc: &BTreeMap<String, Value>) -> Result<(), CacheError> {
        let io_err = |source: std::io::Error| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let body = serde_json::to_string_pretty(doc)?;
        let mut tmp: OsString = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for JsonFileCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let value = self.entries().await.remove(key)?;
        match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(key, error = %err, "cache.file.undecodable_entry");
                None
            }
        }
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut doc = self.entries().await;
        doc.insert(key.to_string(), serde_json::to_value(entry)?);
        self.write_document(&doc).await?;
        debug!(path = %self.path.display(), entries = doc.len(), "cache.file.written");
        Ok(())
    }
}
