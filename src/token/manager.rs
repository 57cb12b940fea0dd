//! Client-side token issuance.
//!
//! Several client processes may share one data directory. Issuing a token
//! must happen exactly once, so issuance holds an in-process async mutex and
//! an exclusive file lease in the storage's coordination directory, then
//! re-reads storage before generating anything.

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{ExpirationStatus, RetentionPolicy};
use crate::constants::{LOG_TOKEN_ISSUED, TOKEN_KEY, TOKEN_LEASE_FILE};
use crate::storage::{self, SharedStorage, StorageError};
use crate::utils::datetime;

const LEASE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Errors raised while reading or issuing tokens.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Timed out after {0:?} waiting for the token issuance lease")]
    LeaseTimeout(Duration),

    #[error("Lease I/O error: {0}")]
    Lease(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Token record kept in shared storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToken {
    pub token: String,
    pub created_at: i64,
}

/// Exclusive lock on the lease file, released on drop.
struct LeaseGuard {
    file: File,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release token lease: {e}");
        }
    }
}

/// Issues, adopts and reports on the local recovery token.
pub struct TokenManager {
    storage: Arc<dyn SharedStorage>,
    lease_path: Option<PathBuf>,
    lease_timeout: Duration,
    policy: RetentionPolicy,
    issuing: Mutex<()>,
}

impl TokenManager {
    /// Create a manager over `storage`.
    ///
    /// The cross-process lease lives in the storage's coordination directory;
    /// storage without one (e.g. [`crate::storage::MemoryStorage`]) relies on
    /// the in-process mutex only.
    pub fn new(storage: Arc<dyn SharedStorage>, policy: RetentionPolicy, lease_timeout: Duration) -> Self {
        let lease_path = storage.coordination_dir().map(|dir| dir.join(TOKEN_LEASE_FILE));
        Self {
            storage,
            lease_path,
            lease_timeout,
            policy,
            issuing: Mutex::new(()),
        }
    }

    /// Read the stored token, if any.
    pub fn current(&self) -> Result<Option<StoredToken>, TokenError> {
        let Some(raw) = self.storage.get(TOKEN_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<StoredToken>(&raw) {
            Ok(stored) if super::is_valid(&stored.token) => Ok(Some(stored)),
            Ok(stored) => {
                warn!("Ignoring malformed stored token '{}'", stored.token);
                Ok(None)
            }
            Err(e) => {
                warn!("Ignoring unreadable stored token: {e}");
                Ok(None)
            }
        }
    }

    /// Return the stored token, issuing one if none exists.
    ///
    /// Concurrent callers, in this process or in others sharing the storage
    /// directory, all observe the same token.
    pub async fn ensure_token(&self) -> Result<String, TokenError> {
        if let Some(stored) = self.current()? {
            return Ok(stored.token);
        }

        let _local = self.issuing.lock().await;
        let _lease = self.acquire_lease().await?;

        // Another holder may have issued while we waited.
        if let Some(stored) = self.current()? {
            debug!("Token issued concurrently, reusing it");
            return Ok(stored.token);
        }

        let stored = StoredToken {
            token: super::generate(),
            created_at: datetime::now_millis(),
        };
        self.write(&stored)?;
        info!("{LOG_TOKEN_ISSUED}");
        Ok(stored.token)
    }

    /// Replace the local token with one supplied by the user (restore).
    ///
    /// Returns the normalized token.
    pub async fn adopt(&self, token: &str) -> Result<String, TokenError> {
        let normalized = super::normalize(token).ok_or_else(|| TokenError::Invalid(token.to_string()))?;

        let _local = self.issuing.lock().await;
        let _lease = self.acquire_lease().await?;

        if matches!(self.current()?, Some(ref stored) if stored.token == normalized) {
            return Ok(normalized);
        }
        self.write(&StoredToken {
            token: normalized.clone(),
            created_at: datetime::now_millis(),
        })?;
        info!("🔑 Adopted restored sync token");
        Ok(normalized)
    }

    /// Forget the local token.
    pub fn clear(&self) -> Result<(), TokenError> {
        self.storage.remove(TOKEN_KEY)?;
        Ok(())
    }

    /// Expiration status of the local token given the last sync cursor.
    pub fn expiration(&self, last_sync_at: Option<i64>, now: i64) -> Result<ExpirationStatus, TokenError> {
        let created_at = self.current()?.map(|stored| stored.created_at);
        Ok(self.policy.status(created_at, last_sync_at, now))
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    fn write(&self, stored: &StoredToken) -> Result<(), TokenError> {
        let raw = serde_json::to_string(stored).map_err(StorageError::from)?;
        storage::set_or_evict(self.storage.as_ref(), TOKEN_KEY, &raw, datetime::now_millis())?;
        Ok(())
    }

    async fn acquire_lease(&self) -> Result<Option<LeaseGuard>, TokenError> {
        let Some(path) = &self.lease_path else {
            return Ok(None);
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let deadline = tokio::time::Instant::now() + self.lease_timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Some(LeaseGuard { file })),
                Err(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(LEASE_POLL_INTERVAL).await;
                }
                Err(_) => return Err(TokenError::LeaseTimeout(self.lease_timeout)),
            }
        }
    }
}
