//! Local task store
//!
//! [`TaskStore`] is the authoritative local copy of tasks and buckets. It is
//! a cheap-to-clone handle around shared state: construct it once and pass
//! it to whatever needs it (the sync client, the CLI).
//!
//! Every mutation refreshes `updatedAt` on the records it touches, heals
//! ordering, persists the state to [`SharedStorage`] and notifies
//! subscribers.

use std::sync::{Arc, RwLock};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    BACKUP_RETENTION_DAYS, CORRUPT_STATE_BACKUP_KEY, DEFAULT_BUCKETS, MAX_BUCKET_NAME_LEN, MAX_TASK_TEXT_LEN,
    PRE_RESTORE_BACKUP_KEY, STATE_KEY,
};
use crate::model::{normalize_bucket_orders, normalize_task_orders, Bucket, Task};
use crate::notify::{Listeners, Subscription};
use crate::storage::{self, MemoryStorage, SharedStorage, StorageError};
use crate::utils::{color, datetime};

/// Errors raised by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Default bucket '{0}' cannot be deleted")]
    DefaultBucket(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("State encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_quota_exceeded())
    }
}

/// What changed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// Tasks or buckets were edited locally
    Mutated,
    /// Local state was replaced wholesale (restore)
    Replaced,
    /// The sync cursor moved
    CursorUpdated,
}

/// Full local state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    pub buckets: Vec<Bucket>,
    pub last_sync_at: Option<i64>,
}

impl Snapshot {
    fn seeded() -> Self {
        let buckets = DEFAULT_BUCKETS
            .iter()
            .enumerate()
            .map(|(order, (name, color))| Bucket {
                id: Uuid::new_v4().to_string(),
                name: (*name).to_string(),
                color: (*color).to_string(),
                order: order as i32,
                is_default: true,
            })
            .collect();
        Self {
            tasks: Vec::new(),
            buckets,
            last_sync_at: None,
        }
    }

    fn heal(&mut self) {
        normalize_task_orders(&mut self.tasks);
        normalize_bucket_orders(&mut self.buckets);
    }

    /// Heal ordering and refresh `updatedAt` on every task whose order moved.
    fn heal_at(&mut self, now: i64) {
        let before: Vec<i32> = self.tasks.iter().map(|task| task.order).collect();
        if normalize_task_orders(&mut self.tasks) {
            for (task, order) in self.tasks.iter_mut().zip(before) {
                if task.order != order {
                    task.updated_at = now;
                }
            }
        }
        normalize_bucket_orders(&mut self.buckets);
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task, StoreError> {
        self.tasks.iter_mut().find(|task| task.id == id).ok_or_else(|| StoreError::NotFound {
            kind: "Task",
            id: id.to_string(),
        })
    }

    fn bucket_exists(&self, id: &str) -> bool {
        self.buckets.iter().any(|bucket| bucket.id == id)
    }

    fn next_task_order(&self, bucket: Option<&str>) -> i32 {
        self.tasks
            .iter()
            .filter(|task| task.priority_id.as_deref() == bucket)
            .map(|task| task.order + 1)
            .max()
            .unwrap_or(0)
    }
}

struct StoreInner {
    state: RwLock<Snapshot>,
    storage: Arc<dyn SharedStorage>,
    listeners: Listeners<StoreEvent>,
}

/// Shared handle to the local task state.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<StoreInner>,
}

fn clean_text(text: &str) -> Result<String, StoreError> {
    let text = text.trim();
    if text.is_empty() || text.chars().count() > MAX_TASK_TEXT_LEN {
        return Err(StoreError::Invalid(format!(
            "task text must be between 1 and {MAX_TASK_TEXT_LEN} characters"
        )));
    }
    Ok(text.to_string())
}

fn clean_bucket(name: &str, bucket_color: &str) -> Result<(String, String), StoreError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_BUCKET_NAME_LEN {
        return Err(StoreError::Invalid(format!(
            "bucket name must be between 1 and {MAX_BUCKET_NAME_LEN} characters"
        )));
    }
    let bucket_color = color::normalize_color(bucket_color)
        .ok_or_else(|| StoreError::Invalid(format!("invalid color '{bucket_color}'")))?;
    Ok((name.to_string(), bucket_color))
}

impl TaskStore {
    /// Load the store from `storage`, seeding default buckets on first use.
    ///
    /// An unreadable state blob is kept as an expiring backup cache entry and
    /// the store starts fresh.
    pub fn open(storage: Arc<dyn SharedStorage>) -> Result<Self, StoreError> {
        let now = datetime::now_millis();
        let mut state = match storage.get(STATE_KEY)? {
            Some(raw) => match serde_json::from_str::<Snapshot>(&raw) {
                Ok(state) => state,
                Err(e) => {
                    warn!("⚠️  Local state is unreadable ({e}), keeping a backup and starting fresh");
                    let expires_at = now + datetime::days_to_millis(BACKUP_RETENTION_DAYS);
                    if let Err(backup_err) = storage.set_cached(CORRUPT_STATE_BACKUP_KEY, &raw, expires_at) {
                        warn!("Failed to back up unreadable state: {backup_err}");
                    }
                    Snapshot::seeded()
                }
            },
            None => Snapshot::seeded(),
        };
        state.heal();

        let store = Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(state.clone()),
                storage,
                listeners: Listeners::new(),
            }),
        };
        store.persist(&state)?;
        debug!(
            "Opened local store with {} tasks and {} buckets",
            state.tasks.len(),
            state.buckets.len()
        );
        Ok(store)
    }

    /// A store backed by fresh in-memory storage.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(Arc::new(MemoryStorage::new()))
    }

    /// The storage this store persists to.
    pub fn storage(&self) -> Arc<dyn SharedStorage> {
        Arc::clone(&self.inner.storage)
    }

    /// Register a change listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(listener)
    }

    /// Copy of the full local state.
    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let state = self.inner.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.clone())
    }

    /// Tasks ordered by bucket order, then task order.
    pub fn tasks(&self) -> Result<Vec<Task>, StoreError> {
        let state = self.inner.state.read().map_err(|_| StoreError::Poisoned)?;
        let bucket_rank = |task: &Task| {
            task.priority_id
                .as_deref()
                .and_then(|id| state.buckets.iter().find(|b| b.id == id))
                .map_or(i32::MAX, |b| b.order)
        };
        let mut tasks = state.tasks.clone();
        tasks.sort_by(|a, b| bucket_rank(a).cmp(&bucket_rank(b)).then(a.order.cmp(&b.order)));
        Ok(tasks)
    }

    pub fn buckets(&self) -> Result<Vec<Bucket>, StoreError> {
        let state = self.inner.state.read().map_err(|_| StoreError::Poisoned)?;
        let mut buckets = state.buckets.clone();
        buckets.sort_by_key(|bucket| bucket.order);
        Ok(buckets)
    }

    pub fn last_sync_at(&self) -> Result<Option<i64>, StoreError> {
        let state = self.inner.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.last_sync_at)
    }

    /// Create a task at the end of `bucket` (or of the unbucketed list).
    pub fn add_task(&self, text: &str, bucket: Option<&str>) -> Result<Task, StoreError> {
        let text = clean_text(text)?;
        self.mutate(|state, now| {
            if let Some(bucket) = bucket {
                if !state.bucket_exists(bucket) {
                    return Err(StoreError::NotFound {
                        kind: "Bucket",
                        id: bucket.to_string(),
                    });
                }
            }
            let task = Task {
                id: Uuid::new_v4().to_string(),
                text,
                completed: false,
                priority_id: bucket.map(str::to_string),
                order: state.next_task_order(bucket),
                created_at: now,
                updated_at: now,
            };
            state.tasks.push(task.clone());
            Ok(task)
        })
    }

    pub fn update_task_text(&self, id: &str, text: &str) -> Result<Task, StoreError> {
        let text = clean_text(text)?;
        self.mutate(|state, now| {
            let task = state.task_mut(id)?;
            task.text = text;
            task.updated_at = now;
            Ok(task.clone())
        })
    }

    /// Flip a task's completed flag.
    pub fn toggle_task(&self, id: &str) -> Result<Task, StoreError> {
        self.mutate(|state, now| {
            let task = state.task_mut(id)?;
            task.completed = !task.completed;
            task.updated_at = now;
            Ok(task.clone())
        })
    }

    /// Move a task into `bucket` at `position` (clamped to the bucket's length).
    pub fn move_task(&self, id: &str, bucket: Option<&str>, position: usize) -> Result<Task, StoreError> {
        self.mutate(|state, now| {
            if let Some(bucket) = bucket {
                if !state.bucket_exists(bucket) {
                    return Err(StoreError::NotFound {
                        kind: "Bucket",
                        id: bucket.to_string(),
                    });
                }
            }
            state.task_mut(id)?;

            let mut siblings: Vec<usize> = state
                .tasks
                .iter()
                .enumerate()
                .filter(|(_, task)| task.priority_id.as_deref() == bucket && task.id != id)
                .map(|(index, _)| index)
                .collect();
            siblings.sort_by_key(|&index| state.tasks[index].order);
            let position = position.min(siblings.len());

            for (rank, &index) in siblings.iter().enumerate() {
                let order = (if rank < position { rank } else { rank + 1 }) as i32;
                let sibling = &mut state.tasks[index];
                if sibling.order != order {
                    sibling.order = order;
                    sibling.updated_at = now;
                }
            }

            let task = state.task_mut(id)?;
            task.priority_id = bucket.map(str::to_string);
            task.order = position as i32;
            task.updated_at = now;
            Ok(task.clone())
        })
    }

    pub fn delete_task(&self, id: &str) -> Result<Task, StoreError> {
        self.mutate(|state, _| {
            let index = state
                .tasks
                .iter()
                .position(|task| task.id == id)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "Task",
                    id: id.to_string(),
                })?;
            Ok(state.tasks.remove(index))
        })
    }

    /// Remove every completed task. Returns how many were removed.
    pub fn clear_completed(&self) -> Result<usize, StoreError> {
        self.mutate(|state, _| {
            let before = state.tasks.len();
            state.tasks.retain(|task| !task.completed);
            Ok(before - state.tasks.len())
        })
    }

    pub fn add_bucket(&self, name: &str, bucket_color: &str) -> Result<Bucket, StoreError> {
        let (name, bucket_color) = clean_bucket(name, bucket_color)?;
        self.mutate(|state, _| {
            let bucket = Bucket {
                id: Uuid::new_v4().to_string(),
                name,
                color: bucket_color,
                order: state.buckets.iter().map(|b| b.order + 1).max().unwrap_or(0),
                is_default: false,
            };
            state.buckets.push(bucket.clone());
            Ok(bucket)
        })
    }

    pub fn update_bucket(&self, id: &str, name: &str, bucket_color: &str) -> Result<Bucket, StoreError> {
        let (name, bucket_color) = clean_bucket(name, bucket_color)?;
        self.mutate(|state, _| {
            let bucket = state
                .buckets
                .iter_mut()
                .find(|bucket| bucket.id == id)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "Bucket",
                    id: id.to_string(),
                })?;
            bucket.name = name;
            bucket.color = bucket_color;
            Ok(bucket.clone())
        })
    }

    /// Delete a user-created bucket; its tasks lose their bucket reference.
    pub fn delete_bucket(&self, id: &str) -> Result<Bucket, StoreError> {
        self.mutate(|state, now| {
            let index = state
                .buckets
                .iter()
                .position(|bucket| bucket.id == id)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "Bucket",
                    id: id.to_string(),
                })?;
            if state.buckets[index].is_default {
                return Err(StoreError::DefaultBucket(state.buckets[index].name.clone()));
            }

            let mut next_order = state.next_task_order(None);
            for task in state.tasks.iter_mut().filter(|task| task.priority_id.as_deref() == Some(id)) {
                task.priority_id = None;
                task.order = next_order;
                task.updated_at = now;
                next_order += 1;
            }
            Ok(state.buckets.remove(index))
        })
    }

    /// Record the server timestamp of the last successful sync.
    pub fn set_last_sync_at(&self, synced_at: i64) -> Result<(), StoreError> {
        let result = {
            let mut state = self.inner.state.write().map_err(|_| StoreError::Poisoned)?;
            state.last_sync_at = Some(synced_at);
            self.persist(&state)
        };
        self.inner.listeners.notify(&StoreEvent::CursorUpdated);
        result
    }

    /// Replace all local state, keeping an expiring backup of what was there.
    pub fn replace_all(&self, tasks: Vec<Task>, buckets: Vec<Bucket>, last_sync_at: Option<i64>) -> Result<(), StoreError> {
        let now = datetime::now_millis();
        let result = {
            let mut state = self.inner.state.write().map_err(|_| StoreError::Poisoned)?;
            if !state.tasks.is_empty() {
                let backup = serde_json::to_string(&*state)?;
                let expires_at = now + datetime::days_to_millis(BACKUP_RETENTION_DAYS);
                if let Err(e) = self.inner.storage.set_cached(PRE_RESTORE_BACKUP_KEY, &backup, expires_at) {
                    warn!("Failed to back up local state before replacing it: {e}");
                }
            }
            *state = Snapshot {
                tasks,
                buckets,
                last_sync_at,
            };
            state.heal();
            self.persist(&state)
        };
        self.inner.listeners.notify(&StoreEvent::Replaced);
        result
    }

    /// The state that the last `replace_all` overwrote, while its backup lasts.
    pub fn pre_restore_backup(&self) -> Result<Option<Snapshot>, StoreError> {
        let raw = self
            .inner
            .storage
            .get_cached(PRE_RESTORE_BACKUP_KEY, datetime::now_millis())?;
        Ok(match raw {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        })
    }

    /// Apply a mutation, heal ordering, persist and notify.
    ///
    /// The state is written while the write lock is held, so the stored blob
    /// always matches the latest in-memory state. Listeners are notified even
    /// if persisting fails, so the in-memory change still reaches the sync
    /// client.
    fn mutate<T>(&self, apply: impl FnOnce(&mut Snapshot, i64) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let now = datetime::now_millis();
        let (value, persisted) = {
            let mut state = self.inner.state.write().map_err(|_| StoreError::Poisoned)?;
            let value = apply(&mut state, now)?;
            state.heal_at(now);
            (value, self.persist(&state))
        };
        self.inner.listeners.notify(&StoreEvent::Mutated);
        persisted.map(|()| value)
    }

    fn persist(&self, state: &Snapshot) -> Result<(), StoreError> {
        let raw = serde_json::to_string(state)?;
        storage::set_or_evict(self.inner.storage.as_ref(), STATE_KEY, &raw, datetime::now_millis())?;
        Ok(())
    }
}
