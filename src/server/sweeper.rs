//! Scheduled deletion of inactive accounts.
//!
//! An account is due once its last activity (`last_sync_at`, or `created_at`
//! if it never synced) is older than the retention window. Each account is
//! purged in its own transaction so one failure never blocks the rest.

use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tokio::task::JoinHandle;

use crate::repositories::{AccountRepository, PriorityRepository, TodoRepository};
use crate::token::RetentionPolicy;
use crate::utils::datetime;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Accounts found past the cutoff
    pub examined: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Deletes accounts that stayed inactive longer than the retention window.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    db: DatabaseConnection,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(db: DatabaseConnection, policy: RetentionPolicy) -> Self {
        Self { db, policy }
    }

    /// Delete every account inactive at `now`.
    ///
    /// Only listing the candidates can fail the sweep as a whole; per-account
    /// failures are logged and counted in the report.
    pub async fn sweep(&self, now: i64) -> Result<SweepReport> {
        let cutoff = self.policy.cutoff(now);
        let candidates = AccountRepository::find_inactive_since(&self.db, cutoff).await?;
        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        for account in candidates {
            match self.purge(&account.token, cutoff).await {
                Ok(true) => report.deleted += 1,
                Ok(false) => info!("Account {} synced during the sweep, kept", account.token),
                Err(e) => {
                    error!("Failed to delete expired account {}: {e:#}", account.token);
                    report.failed += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                "🧹 Retention sweep: {} expired, {} deleted, {} failed",
                report.examined, report.deleted, report.failed
            );
        }
        Ok(report)
    }

    /// Delete an account with its tasks and buckets if it is still inactive.
    async fn purge(&self, token: &str, cutoff: i64) -> Result<bool> {
        let txn = self.db.begin().await?;
        let Some(account) = AccountRepository::get(&txn, token).await? else {
            return Ok(false);
        };
        if account.last_activity() >= cutoff {
            return Ok(false);
        }

        TodoRepository::delete_all(&txn, token).await?;
        PriorityRepository::delete_all(&txn, token).await?;
        AccountRepository::delete(&txn, token).await?;
        txn.commit().await?;
        Ok(true)
    }

    /// Run a sweep every `interval`, starting immediately.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep(datetime::now_millis()).await {
                    warn!("Retention sweep failed: {e:#}");
                }
            }
        })
    }
}
