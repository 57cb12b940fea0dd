//! Local persistence backends
//!
//! This module provides the key/value storage shared by every client process
//! of the same user:
//! - [`FileStorage`] - one file per key in the user's data directory
//! - [`MemoryStorage`] - process-local storage for tests and ephemeral runs
//!
//! Both enforce an optional byte quota. Cache entries (keys prefixed with
//! [`CACHE_KEY_PREFIX`]) carry an expiry and may be evicted to make room.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::constants::CACHE_KEY_PREFIX;

/// Errors raised by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEnvelope {
    expires_at: i64,
    value: String,
}

/// Keys are restricted so they map directly onto file names.
pub(crate) fn check_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Key/value storage shared by all client processes of one user.
pub trait SharedStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All keys currently stored, cache entries included.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Directory other processes can use for coordination files, if any.
    fn coordination_dir(&self) -> Option<std::path::PathBuf> {
        None
    }

    /// Store a cache entry that becomes evictable at `expires_at`.
    fn set_cached(&self, key: &str, value: &str, expires_at: i64) -> Result<(), StorageError> {
        let envelope = CacheEnvelope {
            expires_at,
            value: value.to_string(),
        };
        self.set(&format!("{CACHE_KEY_PREFIX}{key}"), &serde_json::to_string(&envelope)?)
    }

    /// Read a cache entry, ignoring it once expired.
    fn get_cached(&self, key: &str, now: i64) -> Result<Option<String>, StorageError> {
        let Some(raw) = self.get(&format!("{CACHE_KEY_PREFIX}{key}"))? else {
            return Ok(None);
        };
        match serde_json::from_str::<CacheEnvelope>(&raw) {
            Ok(envelope) if envelope.expires_at > now => Ok(Some(envelope.value)),
            _ => Ok(None),
        }
    }

    /// Delete expired (or unreadable) cache entries. Returns how many were removed.
    fn evict_expired(&self, now: i64) -> Result<usize, StorageError> {
        let mut evicted = 0;
        for key in self.keys()? {
            if !key.starts_with(CACHE_KEY_PREFIX) {
                continue;
            }
            let expired = match self.get(&key)? {
                Some(raw) => serde_json::from_str::<CacheEnvelope>(&raw)
                    .map(|envelope| envelope.expires_at <= now)
                    .unwrap_or(true),
                None => false,
            };
            if expired {
                self.remove(&key)?;
                evicted += 1;
            }
        }
        Ok(evicted)
    }
}

/// Write `value`, evicting expired cache entries once if the quota is hit.
///
/// The quota error is surfaced only when eviction did not free enough room.
pub fn set_or_evict(storage: &dyn SharedStorage, key: &str, value: &str, now: i64) -> Result<(), StorageError> {
    match storage.set(key, value) {
        Err(err) if err.is_quota_exceeded() => {
            warn!("💾 Storage quota exceeded writing '{key}', evicting expired cache entries");
            match storage.evict_expired(now) {
                Ok(count) => debug!("Evicted {count} expired cache entries"),
                Err(evict_err) => warn!("Cache eviction failed: {evict_err}"),
            }
            storage.set(key, value)
        }
        other => other,
    }
}
