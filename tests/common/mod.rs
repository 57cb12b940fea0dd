#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tasksync::model::{RawRestorePayload, SyncRequest, SyncResponse};
use tasksync::storage::{MemoryStorage, SharedStorage};
use tasksync::sync::{SyncClient, SyncSettings};
use tasksync::token::{RetentionPolicy, TokenManager};
use tasksync::transport::{SyncApi, SyncError};
use tasksync::TaskStore;

/// What a scripted push answers.
#[derive(Debug, Clone)]
pub enum PushOutcome {
    Accept,
    /// The server answers with `success: false`
    Reject,
    Fail(SyncError),
}

/// Scripted in-process stand-in for the sync server.
#[derive(Default)]
pub struct MockApi {
    pushes: Mutex<Vec<SyncRequest>>,
    push_results: Mutex<VecDeque<PushOutcome>>,
    push_delay: Mutex<Option<Duration>>,
    restore_payload: Mutex<Option<Result<RawRestorePayload, SyncError>>>,
    emails: Mutex<Vec<(String, String)>>,
    unreachable: AtomicBool,
    clock: AtomicI64,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clock: AtomicI64::new(1_000),
            ..Self::default()
        })
    }

    /// Queue outcomes for upcoming pushes; pushes past the queue succeed.
    pub fn script_pushes(&self, results: impl IntoIterator<Item = Result<(), SyncError>>) {
        self.push_results.lock().unwrap().extend(results.into_iter().map(|result| match result {
            Ok(()) => PushOutcome::Accept,
            Err(err) => PushOutcome::Fail(err),
        }));
    }

    /// Queue raw outcomes, including server rejections.
    pub fn script_outcomes(&self, outcomes: impl IntoIterator<Item = PushOutcome>) {
        self.push_results.lock().unwrap().extend(outcomes);
    }

    pub fn set_push_delay(&self, delay: Duration) {
        *self.push_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_restore(&self, payload: Result<RawRestorePayload, SyncError>) {
        *self.restore_payload.lock().unwrap() = Some(payload);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn pushes(&self) -> Vec<SyncRequest> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn push_count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }

    pub fn emails(&self) -> Vec<(String, String)> {
        self.emails.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncApi for MockApi {
    async fn push(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError> {
        self.pushes.lock().unwrap().push(request.clone());
        // Claim the outcome on entry so overlapping pushes stay deterministic
        let scripted = self.push_results.lock().unwrap().pop_front();
        let delay = *self.push_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let success = match scripted {
            Some(PushOutcome::Fail(err)) => return Err(err),
            Some(PushOutcome::Reject) => false,
            Some(PushOutcome::Accept) | None => true,
        };
        Ok(SyncResponse {
            success,
            synced_at: self.clock.fetch_add(1_000, Ordering::SeqCst),
            todos_count: request.todos.len(),
            priorities_count: request.priorities.len(),
            deleted_todos: 0,
            deleted_priorities: 0,
            inserted_todos: 0,
            updated_todos: 0,
            inserted_priorities: 0,
            updated_priorities: 0,
            has_conflicts: false,
            conflicts: None,
        })
    }

    async fn last_sync(&self, _token: &str) -> Result<Option<i64>, SyncError> {
        Ok(None)
    }

    async fn restore(&self, _token: &str) -> Result<RawRestorePayload, SyncError> {
        self.restore_payload
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Err(SyncError::NotFound))
    }

    async fn send_recovery_email(&self, email: &str, token: &str) -> Result<(), SyncError> {
        self.emails.lock().unwrap().push((email.to_string(), token.to_string()));
        Ok(())
    }

    async fn health(&self) -> Result<(), SyncError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(SyncError::Network("unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

pub fn settings() -> SyncSettings {
    SyncSettings::default()
}

/// A client over in-memory storage and the given mock.
pub fn client_with(api: Arc<MockApi>, settings: SyncSettings) -> SyncClient {
    let storage: Arc<dyn SharedStorage> = Arc::new(MemoryStorage::new());
    let store = TaskStore::open(storage.clone()).unwrap();
    let tokens = Arc::new(TokenManager::new(storage, RetentionPolicy::default(), Duration::from_secs(1)));
    SyncClient::new(store, tokens, api, settings)
}

/// Let spawned tasks run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
