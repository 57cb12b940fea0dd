//! Client-side synchronization
//!
//! This module provides the [`SyncClient`] which pushes the local store to
//! the server and restores it from a token. It:
//! - debounces bursts of local mutations into a single push
//! - keeps at most one push in flight, remembering further requests in a
//!   single `pending_sync` flag
//! - defers work while offline and resumes on reconnect
//! - retries retryable failures with capped exponential backoff
//! - exposes its [`SyncState`] to subscribers
//!
//! The sync state machine is `idle → syncing → {synced, failed}`, with any
//! state moving to `offline` on network loss and back to `idle` on reconnect.

pub mod restore;
pub mod retry;

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::constants::{
    LOG_RESTORE_FAILED, LOG_RESTORE_STARTED, LOG_SYNC_FAILED, LOG_SYNC_OFFLINE, LOG_SYNC_STARTED, LOG_SYNC_SUCCEEDED,
};
use crate::model::{SyncRequest, SyncResponse};
use crate::notify::{Listeners, Subscription};
use crate::store::{StoreError, StoreEvent, TaskStore};
use crate::token::{self, TokenError, TokenManager};
use crate::transport::{SyncApi, SyncError};
use restore::RestoredSnapshot;
use retry::{RetryDecision, RetryPolicy};

/// Timing settings of the sync client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Quiet period before a scheduled sync runs
    pub debounce: Duration,
    pub retry: RetryPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

/// Represents the current status of synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Nothing in progress; a backoff retry may be armed
    Idle,
    /// A push or restore is in flight
    Syncing,
    /// The last push or restore succeeded
    Synced,
    /// The last attempt failed and no automatic retry is armed
    Failed,
    /// The network is unavailable; work is deferred
    Offline,
}

/// Observable sync state.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub status: SyncStatus,
    pub last_sync_at: Option<i64>,
    pub last_error: Option<SyncError>,
    pub is_online: bool,
    pub retry_count: u32,
    pub pending_sync: bool,
    /// Conflicts reported by the last successful push
    pub last_conflicts: usize,
}

struct Inner {
    state: SyncState,
    generation: u64,
    in_flight: Option<u64>,
    debounce: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
}

impl Inner {
    fn cancel_timers(&mut self) {
        if let Some(handle) = self.debounce.take() {
            handle.abort();
        }
        if let Some(handle) = self.retry.take() {
            handle.abort();
        }
    }

    /// Start a new attempt, superseding any attempt still in flight.
    fn begin_attempt(&mut self) -> u64 {
        self.cancel_timers();
        self.generation += 1;
        self.in_flight = Some(self.generation);
        self.state.pending_sync = false;
        self.state.status = SyncStatus::Syncing;
        self.generation
    }

    /// Finish attempt `generation`. Returns false if it was superseded.
    fn end_attempt(&mut self, generation: u64) -> bool {
        if self.in_flight != Some(generation) {
            return false;
        }
        self.in_flight = None;
        true
    }
}

struct Shared {
    store: TaskStore,
    tokens: Arc<TokenManager>,
    api: Arc<dyn SyncApi>,
    settings: SyncSettings,
    inner: Mutex<Inner>,
    listeners: Listeners<SyncState>,
    store_subscription: Mutex<Option<Subscription>>,
}

/// Pushes the local store to the server and restores it from tokens.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct SyncClient {
    shared: Arc<Shared>,
}

fn token_error(err: TokenError) -> SyncError {
    match err {
        TokenError::Storage(storage) if storage.is_quota_exceeded() => SyncError::StorageQuota(storage.to_string()),
        TokenError::Invalid(token) => SyncError::Validation(format!("invalid token '{token}'")),
        other => SyncError::LocalState(other.to_string()),
    }
}

fn store_error(err: StoreError) -> SyncError {
    if err.is_quota_exceeded() {
        SyncError::StorageQuota(err.to_string())
    } else {
        SyncError::LocalState(err.to_string())
    }
}

/// Run `sync()` on a fresh task after `delay`.
///
/// The sync is spawned separately so aborting the timer never cancels a
/// sync that already started.
fn spawn_after(delay: Duration, client: SyncClient) -> Option<JoinHandle<()>> {
    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            warn!("No async runtime available, sync timer not armed");
            return None;
        }
    };
    Some(runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        tokio::spawn(async move {
            client.sync().await;
        });
    }))
}

impl SyncClient {
    /// Creates a new `SyncClient`.
    ///
    /// # Arguments
    /// * `store` - The local store to push and restore
    /// * `tokens` - Token manager used to obtain and adopt tokens
    /// * `api` - Transport to the server
    /// * `settings` - Debounce and retry timing
    pub fn new(store: TaskStore, tokens: Arc<TokenManager>, api: Arc<dyn SyncApi>, settings: SyncSettings) -> Self {
        let last_sync_at = store.last_sync_at().unwrap_or(None);
        let state = SyncState {
            status: SyncStatus::Idle,
            last_sync_at,
            last_error: None,
            is_online: true,
            retry_count: 0,
            pending_sync: false,
            last_conflicts: 0,
        };
        Self {
            shared: Arc::new(Shared {
                store,
                tokens,
                api,
                settings,
                inner: Mutex::new(Inner {
                    state,
                    generation: 0,
                    in_flight: None,
                    debounce: None,
                    retry: None,
                }),
                listeners: Listeners::new(),
                store_subscription: Mutex::new(None),
            }),
        }
    }

    /// Schedule a sync after every local mutation of the store.
    pub fn start(&self) {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let subscription = self.shared.store.subscribe(move |event| {
            if *event != StoreEvent::Mutated {
                return;
            }
            if let Some(shared) = weak.upgrade() {
                SyncClient { shared }.schedule();
            }
        });
        let mut slot = self
            .shared
            .store_subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(subscription);
    }

    /// Stop reacting to store mutations and disarm timers.
    pub fn stop(&self) {
        let subscription = self
            .shared
            .store_subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(subscription);
        self.update(Inner::cancel_timers);
    }

    /// Current sync state.
    pub fn state(&self) -> SyncState {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            .clone()
    }

    /// Register a listener called with the new state after every change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncState) + Send + Sync + 'static,
    {
        self.shared.listeners.subscribe(listener)
    }

    pub fn store(&self) -> &TaskStore {
        &self.shared.store
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.shared.tokens
    }

    /// Mark local state dirty and (re)arm the debounce timer.
    ///
    /// Calls within the quiet period coalesce into one sync. While offline
    /// nothing is armed; the dirty flag is pushed on reconnect.
    pub fn schedule(&self) {
        let debounce = self.shared.settings.debounce;
        let client = self.clone();
        self.update(move |inner| {
            inner.state.pending_sync = true;
            if !inner.state.is_online {
                inner.state.status = SyncStatus::Offline;
                return;
            }
            if let Some(handle) = inner.debounce.take() {
                handle.abort();
            }
            inner.debounce = spawn_after(debounce, client);
        });
    }

    /// Push the local snapshot now unless a push is already in flight.
    ///
    /// Returns true if this call performed a successful push. A call made
    /// while another is in flight, or while offline, only sets
    /// `pending_sync` and returns false.
    pub async fn sync(&self) -> bool {
        let generation = self.update(|inner| {
            if !inner.state.is_online {
                inner.state.pending_sync = true;
                inner.state.status = SyncStatus::Offline;
                return None;
            }
            if inner.in_flight.is_some() {
                inner.state.pending_sync = true;
                return None;
            }
            Some(inner.begin_attempt())
        });

        match generation {
            Some(generation) => self.run_push(generation).await,
            None => {
                debug!("Sync deferred (offline or already in flight)");
                false
            }
        }
    }

    /// Push now, resetting the retry budget and superseding any push in flight.
    pub async fn force_sync(&self) -> bool {
        let generation = self.update(|inner| {
            inner.cancel_timers();
            inner.state.retry_count = 0;
            inner.state.last_error = None;
            if !inner.state.is_online {
                inner.state.pending_sync = true;
                inner.state.status = SyncStatus::Offline;
                return None;
            }
            if inner.in_flight.is_some() {
                debug!("Forced sync supersedes the push in flight");
            }
            Some(inner.begin_attempt())
        });

        match generation {
            Some(generation) => self.run_push(generation).await,
            None => {
                info!("{LOG_SYNC_OFFLINE}");
                false
            }
        }
    }

    /// Network availability signal.
    ///
    /// Going offline disarms timers and moves to `offline`. Coming back
    /// online moves to `idle` and immediately syncs if work is pending.
    /// Returns the result of that sync, or false if none ran.
    pub async fn set_online(&self, online: bool) -> bool {
        let resume = self.update(|inner| {
            if inner.state.is_online == online {
                return false;
            }
            inner.state.is_online = online;
            if online {
                if inner.state.status == SyncStatus::Offline {
                    inner.state.status = SyncStatus::Idle;
                }
                inner.state.pending_sync
            } else {
                if inner.debounce.is_some() || inner.retry.is_some() {
                    inner.state.pending_sync = true;
                }
                inner.cancel_timers();
                inner.state.status = SyncStatus::Offline;
                false
            }
        });

        if online {
            info!("🌐 Back online");
        } else {
            info!("{LOG_SYNC_OFFLINE}");
        }
        if resume {
            self.sync().await
        } else {
            false
        }
    }

    /// Dismiss the last error; a failed state returns to idle.
    pub fn clear_error(&self) {
        self.update(|inner| {
            inner.state.last_error = None;
            if inner.state.status == SyncStatus::Failed {
                inner.state.status = SyncStatus::Idle;
                inner.state.retry_count = 0;
            }
        });
    }

    /// Replace local state with the snapshot stored under `token`.
    ///
    /// Invalid records are dropped individually. On success the token and
    /// the remote cursor are adopted.
    pub async fn restore(&self, token: &str) -> bool {
        let Some(token) = token::normalize(token) else {
            self.update(|inner| {
                inner.state.status = SyncStatus::Failed;
                inner.state.last_error = Some(SyncError::Validation("invalid token format".to_string()));
            });
            return false;
        };

        let generation = self.update(|inner| {
            if !inner.state.is_online {
                inner.state.status = SyncStatus::Offline;
                inner.state.last_error = Some(SyncError::Network("offline".to_string()));
                return None;
            }
            Some(inner.begin_attempt())
        });
        let Some(generation) = generation else {
            return false;
        };

        info!("{LOG_RESTORE_STARTED} {token}");
        match self.run_restore(&token).await {
            Ok(restored) => self.update(|inner| {
                if !inner.end_attempt(generation) {
                    return false;
                }
                inner.state.status = SyncStatus::Synced;
                inner.state.last_sync_at = restored.last_sync_at;
                inner.state.retry_count = 0;
                inner.state.last_error = None;
                inner.state.last_conflicts = 0;
                true
            }),
            Err(err) => {
                error!("{LOG_RESTORE_FAILED}: {err}");
                self.update(|inner| {
                    if inner.end_attempt(generation) {
                        inner.state.status = SyncStatus::Failed;
                        inner.state.last_error = Some(err);
                    }
                    false
                })
            }
        }
    }

    /// Ask the server to email the current token to `email`.
    pub async fn send_recovery_email(&self, email: &str) -> Result<(), SyncError> {
        let stored = self.shared.tokens.current().map_err(token_error)?.ok_or(SyncError::NotFound)?;
        self.shared.api.send_recovery_email(email, &stored.token).await
    }

    /// Probe server health every `interval` and feed the result to [`Self::set_online`].
    pub fn spawn_connectivity_monitor(&self, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let client = SyncClient { shared };
                let reachable = client.shared.api.health().await.is_ok();
                if reachable != client.state().is_online {
                    client.set_online(reachable).await;
                }
            }
        })
    }

    fn update<R>(&self, apply: impl FnOnce(&mut Inner) -> R) -> R {
        let (result, state) = {
            let mut inner = self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let result = apply(&mut inner);
            (result, inner.state.clone())
        };
        self.shared.listeners.notify(&state);
        result
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            == Some(generation)
    }

    async fn build_request(&self) -> Result<SyncRequest, SyncError> {
        let token = self.shared.tokens.ensure_token().await.map_err(token_error)?;
        let snapshot = self.shared.store.snapshot().map_err(store_error)?;
        Ok(SyncRequest {
            token,
            todos: snapshot.tasks,
            priorities: snapshot.buckets,
            last_sync_at: snapshot.last_sync_at,
        })
    }

    async fn run_push(&self, generation: u64) -> bool {
        info!("{LOG_SYNC_STARTED}");
        let result = match self.build_request().await {
            Ok(request) => match self.shared.api.push(&request).await {
                Ok(response) if response.success => Ok(response),
                Ok(_) => Err(SyncError::Rejected),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        match result {
            Ok(response) => self.complete_push(generation, response),
            Err(err) => self.fail_push(generation, err),
        }
    }

    fn complete_push(&self, generation: u64, response: SyncResponse) -> bool {
        if !self.is_current(generation) {
            debug!("Ignoring the outcome of a superseded sync");
            return false;
        }
        if let Err(e) = self.shared.store.set_last_sync_at(response.synced_at) {
            warn!("Failed to persist sync cursor: {e}");
        }

        let conflicts = response.conflict_count();
        if conflicts > 0 {
            warn!("⚠️  Server kept {conflicts} records changed by another device");
        }
        info!(
            "{LOG_SYNC_SUCCEEDED}: {} todos, {} priorities, {} + {} deleted",
            response.todos_count, response.priorities_count, response.deleted_todos, response.deleted_priorities
        );

        self.update(|inner| {
            if !inner.end_attempt(generation) {
                return false;
            }
            inner.state.status = if inner.state.is_online {
                SyncStatus::Synced
            } else {
                SyncStatus::Offline
            };
            inner.state.last_sync_at = Some(response.synced_at);
            inner.state.retry_count = 0;
            inner.state.last_error = None;
            inner.state.last_conflicts = conflicts;
            true
        })
    }

    fn fail_push(&self, generation: u64, err: SyncError) -> bool {
        let policy = self.shared.settings.retry;
        let client = self.clone();
        self.update(move |inner| {
            if !inner.end_attempt(generation) {
                debug!("Ignoring the failure of a superseded sync: {err}");
                return false;
            }
            if !inner.state.is_online {
                inner.state.pending_sync = true;
                inner.state.status = SyncStatus::Offline;
                inner.state.last_error = Some(err);
                return false;
            }
            match retry::decide(&policy, inner.state.retry_count, &err) {
                RetryDecision::Retry { attempt, delay } => {
                    warn!("{LOG_SYNC_FAILED} (attempt {attempt}), retrying in {delay:?}: {err}");
                    inner.state.retry_count = attempt;
                    inner.state.status = SyncStatus::Idle;
                    inner.state.last_error = Some(err);
                    inner.retry = spawn_after(delay, client);
                }
                RetryDecision::GiveUp { attempt } => {
                    error!("{LOG_SYNC_FAILED} (attempt {attempt}), giving up: {err}");
                    inner.state.retry_count = attempt;
                    inner.state.status = SyncStatus::Failed;
                    inner.state.last_error = Some(err);
                }
            }
            false
        })
    }

    async fn run_restore(&self, token: &str) -> Result<RestoredSnapshot, SyncError> {
        let payload = self.shared.api.restore(token).await?;
        let restored = restore::partition_payload(payload);
        if restored.skipped() > 0 {
            warn!(
                "⚠️  Skipped {} invalid records during restore ({} tasks, {} buckets)",
                restored.skipped(),
                restored.skipped_tasks,
                restored.skipped_buckets
            );
        }

        self.shared
            .store
            .replace_all(restored.tasks.clone(), restored.buckets.clone(), restored.last_sync_at)
            .map_err(store_error)?;
        self.shared.tokens.adopt(token).await.map_err(token_error)?;

        info!(
            "✅ Restored {} tasks and {} buckets",
            restored.tasks.len(),
            restored.buckets.len()
        );
        Ok(restored)
    }
}
