//! Persistent tier backends.
//!
//! `SessionStorage` is the browser-style session storage contract: string keys,
//! string values, an enumerable key list, and writes that may be refused when
//! the store is full. The store is shared with unrelated application state, so
//! the cache only ever touches keys under its own prefix.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Default quota, in bytes, for a session store (browser session storage size).
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// A session file untouched for this long belongs to a finished session.
const SESSION_IDLE_MINUTES: i64 = 30;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage quota exceeded: {required} bytes needed, quota is {quota}")]
    QuotaExceeded { required: usize, quota: usize },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

pub trait SessionStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&mut self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Bytes used by the items if `key` were set to a value of `value_len` bytes.
fn projected_size(items: &BTreeMap<String, String>, key: &str, value_len: usize) -> usize {
    let current: usize = items
        .iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, v)| k.len() + v.len())
        .sum();
    current + key.len() + value_len
}

// ============================================================================
// In-process storage
// ============================================================================

/// Session storage that lives in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: BTreeMap<String, String>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: BTreeMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.items.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl SessionStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota_bytes {
            let required = projected_size(&self.items, key, value.len());
            if required > quota {
                return Err(StorageError::QuotaExceeded { required, quota });
            }
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        self.items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.items.keys().cloned().collect())
    }
}

// ============================================================================
// File-backed session storage
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    touched_at: DateTime<Utc>,
    #[serde(default)]
    items: BTreeMap<String, String>,
}

/// Session storage persisted to a JSON file.
///
/// Items survive process restarts within a session. A file that has not been
/// written for `SESSION_IDLE_MINUTES` is treated as a finished session and
/// discarded when opened.
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    items: BTreeMap<String, String>,
    quota_bytes: usize,
}

impl FileSessionStorage {
    pub fn open(path: impl Into<PathBuf>, quota_bytes: usize) -> Result<Self, StorageError> {
        let path = path.into();
        let items = Self::load_items(&path)?;
        Ok(Self {
            path,
            items,
            quota_bytes,
        })
    }

    fn load_items(path: &Path) -> Result<BTreeMap<String, String>, StorageError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = std::fs::read_to_string(path)?;
        let file: SessionFile = match serde_json::from_str(&contents) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable session file");
                return Ok(BTreeMap::new());
            }
        };

        let idle = Utc::now() - file.touched_at;
        if idle > Duration::minutes(SESSION_IDLE_MINUTES) {
            debug!(
                path = %path.display(),
                idle_minutes = idle.num_minutes(),
                "Session expired, starting fresh"
            );
            std::fs::remove_file(path)?;
            return Ok(BTreeMap::new());
        }

        Ok(file.items)
    }

    fn flush(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = SessionFile {
            touched_at: Utc::now(),
            items: self.items.clone(),
        };
        let contents = serde_json::to_string(&file)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// End the session: drop every item and delete the backing file.
    pub fn end_session(self) -> Result<(), StorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

impl SessionStorage for FileSessionStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let required = projected_size(&self.items, key, value.len());
        if required > self.quota_bytes {
            return Err(StorageError::QuotaExceeded {
                required,
                quota: self.quota_bytes,
            });
        }

        let previous = self.items.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush() {
            // Keep memory and disk in agreement
            match previous {
                Some(old) => self.items.insert(key.to_string(), old),
                None => self.items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        let Some(old) = self.items.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.flush() {
            // Still on disk, so it stays listed and a later remove retries it
            self.items.insert(key.to_string(), old);
            return Err(e);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.items.keys().cloned().collect())
    }
}
