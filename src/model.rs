//! Records shared by the local store, the wire protocol and the server.
//!
//! Field names are camelCase on the wire and every timestamp is epoch
//! milliseconds. The same validation rules guard the reconciliation
//! endpoint and the client-side restore schema check.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_BUCKET_NAME_LEN, MAX_EMAIL_LEN, MAX_ID_LEN, MAX_TASK_TEXT_LEN};
use crate::token;
use crate::utils::color;

/// A record failed field validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A single task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    pub completed: bool,
    /// Bucket this task belongs to, if any
    pub priority_id: Option<String>,
    pub order: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A priority bucket grouping tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub id: String,
    pub name: String,
    pub color: String,
    pub order: i32,
    pub is_default: bool,
}

/// Records that take part in reconciliation.
pub trait SyncRecord: Clone + PartialEq {
    /// Entity name used in logs and error messages
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn validate(&self) -> Result<(), ValidationError>;
}

fn validate_id(kind: &str, id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(ValidationError::new(format!(
            "{kind} id must be between 1 and {MAX_ID_LEN} characters"
        )));
    }
    if id.chars().any(char::is_control) {
        return Err(ValidationError::new(format!("{kind} id contains control characters")));
    }
    Ok(())
}

impl SyncRecord for Task {
    const KIND: &'static str = "task";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_id(Self::KIND, &self.id)?;
        let text = self.text.trim();
        if text.is_empty() || text.chars().count() > MAX_TASK_TEXT_LEN {
            return Err(ValidationError::new(format!(
                "task {} text must be between 1 and {MAX_TASK_TEXT_LEN} characters",
                self.id
            )));
        }
        if let Some(priority_id) = &self.priority_id {
            validate_id("priority", priority_id)?;
        }
        if self.order < 0 {
            return Err(ValidationError::new(format!("task {} has a negative order", self.id)));
        }
        if self.created_at < 0 || self.updated_at < self.created_at {
            return Err(ValidationError::new(format!("task {} has invalid timestamps", self.id)));
        }
        Ok(())
    }
}

impl SyncRecord for Bucket {
    const KIND: &'static str = "priority";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_id(Self::KIND, &self.id)?;
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > MAX_BUCKET_NAME_LEN {
            return Err(ValidationError::new(format!(
                "priority {} name must be between 1 and {MAX_BUCKET_NAME_LEN} characters",
                self.id
            )));
        }
        if !color::is_hex_color(&self.color) {
            return Err(ValidationError::new(format!(
                "priority {} color must be #RRGGBB, got {}",
                self.id, self.color
            )));
        }
        if self.order < 0 {
            return Err(ValidationError::new(format!("priority {} has a negative order", self.id)));
        }
        Ok(())
    }
}

/// Validate a slice of records: field rules, size limit and id uniqueness.
pub fn validate_records<T: SyncRecord>(records: &[T], max: usize) -> Result<(), ValidationError> {
    if records.len() > max {
        return Err(ValidationError::new(format!(
            "too many {} records: {} (max {max})",
            T::KIND,
            records.len()
        )));
    }
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        record.validate()?;
        if !seen.insert(record.id()) {
            return Err(ValidationError::new(format!("duplicate {} id {}", T::KIND, record.id())));
        }
    }
    Ok(())
}

/// Heal task ordering into a dense `0..n-1` sequence per bucket.
///
/// Tasks keep their relative order (by current `order`, then `createdAt`,
/// then id). `updatedAt` is not touched. Returns true if any order changed.
pub fn normalize_task_orders(tasks: &mut [Task]) -> bool {
    let mut groups: BTreeMap<Option<String>, Vec<usize>> = BTreeMap::new();
    for (index, task) in tasks.iter().enumerate() {
        groups.entry(task.priority_id.clone()).or_default().push(index);
    }

    let mut changed = false;
    for indices in groups.values_mut() {
        indices.sort_by(|&a, &b| {
            let (ta, tb) = (&tasks[a], &tasks[b]);
            ta.order
                .cmp(&tb.order)
                .then(ta.created_at.cmp(&tb.created_at))
                .then(ta.id.cmp(&tb.id))
        });
        for (position, &index) in indices.iter().enumerate() {
            let position = position as i32;
            if tasks[index].order != position {
                tasks[index].order = position;
                changed = true;
            }
        }
    }
    changed
}

/// Heal bucket ordering into a dense `0..n-1` sequence.
pub fn normalize_bucket_orders(buckets: &mut [Bucket]) -> bool {
    let mut indices: Vec<usize> = (0..buckets.len()).collect();
    indices.sort_by(|&a, &b| buckets[a].order.cmp(&buckets[b].order).then(buckets[a].id.cmp(&buckets[b].id)));

    let mut changed = false;
    for (position, index) in indices.into_iter().enumerate() {
        let position = position as i32;
        if buckets[index].order != position {
            buckets[index].order = position;
            changed = true;
        }
    }
    changed
}

/// Body of `POST /sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub token: String,
    pub todos: Vec<Task>,
    pub priorities: Vec<Bucket>,
    /// Server timestamp of this client's last successful sync
    pub last_sync_at: Option<i64>,
}

/// Request size limits enforced by the server.
#[derive(Debug, Clone, Copy)]
pub struct PayloadLimits {
    pub max_tasks: usize,
    pub max_buckets: usize,
}

impl SyncRequest {
    /// Check token grammar, payload sizes and every record.
    pub fn validate(&self, limits: PayloadLimits) -> Result<(), ValidationError> {
        if !token::is_valid(&self.token) {
            return Err(ValidationError::new("invalid token format"));
        }
        if matches!(self.last_sync_at, Some(cursor) if cursor < 0) {
            return Err(ValidationError::new("lastSyncAt must not be negative"));
        }
        validate_records(&self.todos, limits.max_tasks)?;
        validate_records(&self.priorities, limits.max_buckets)?;
        Ok(())
    }
}

/// Marker sent as the client version when the client deleted a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedMarker {
    pub deleted: bool,
}

/// What the client sent for a conflicting record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientVersion<T> {
    Record(T),
    Deleted(DeletedMarker),
}

impl<T> ClientVersion<T> {
    pub fn deleted() -> Self {
        Self::Deleted(DeletedMarker { deleted: true })
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }
}

/// A record the server kept because it changed after the client's cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict<T> {
    pub id: String,
    pub client_version: ClientVersion<T>,
    pub server_version: T,
}

/// Conflicts of one reconciliation call, per entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSet {
    pub todos: Vec<Conflict<Task>>,
    pub priorities: Vec<Conflict<Bucket>>,
}

impl ConflictSet {
    pub fn is_empty(&self) -> bool {
        self.todos.is_empty() && self.priorities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.todos.len() + self.priorities.len()
    }
}

/// Response of `POST /sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub synced_at: i64,
    pub todos_count: usize,
    pub priorities_count: usize,
    pub deleted_todos: usize,
    pub deleted_priorities: usize,
    #[serde(default)]
    pub inserted_todos: usize,
    #[serde(default)]
    pub updated_todos: usize,
    #[serde(default)]
    pub inserted_priorities: usize,
    #[serde(default)]
    pub updated_priorities: usize,
    pub has_conflicts: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<ConflictSet>,
}

impl SyncResponse {
    pub fn conflict_count(&self) -> usize {
        self.conflicts.as_ref().map_or(0, ConflictSet::len)
    }
}

/// Response of `GET /sync/:token`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSyncResponse {
    pub last_sync_at: Option<i64>,
}

/// Settings block of a restore payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSettings {
    pub last_sync_at: Option<i64>,
}

/// Response of `GET /restore/:token` as produced by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreResponse {
    pub todos: Vec<Task>,
    pub priorities: Vec<Bucket>,
    pub settings: RestoreSettings,
}

/// Restore payload as received by the client, before per-record validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRestorePayload {
    #[serde(default)]
    pub todos: Vec<serde_json::Value>,
    #[serde(default)]
    pub priorities: Vec<serde_json::Value>,
    #[serde(default)]
    pub settings: RestoreSettings,
}

/// Body of `POST /email`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub email: String,
    pub token: String,
}

impl EmailRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !token::is_valid(&self.token) {
            return Err(ValidationError::new("invalid token format"));
        }
        if !is_plausible_email(&self.email) {
            return Err(ValidationError::new("invalid email address"));
        }
        Ok(())
    }
}

/// Cheap structural email check: one `@`, non-empty local part, dotted domain.
pub fn is_plausible_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Plain acknowledgement body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

/// Machine-readable error codes carried in error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    TokenExpired,
    RateLimited,
    DatabaseError,
    MailError,
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}
