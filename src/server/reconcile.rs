//! Reconciliation of a client snapshot into stored account state.
//!
//! Conflicts are whole-record and decided against the server-assigned
//! `synced_at` of each stored row: a row written by the server after the
//! client's cursor is kept and reported instead of being overwritten or
//! deleted. A client without a cursor never deletes server rows.
//!
//! [`plan_changes`] is the pure decision step; [`reconcile`] loads, plans and
//! applies everything in one transaction.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use log::{debug, info};
use sea_orm::TransactionTrait;

use crate::model::{Bucket, ClientVersion, Conflict, ConflictSet, SyncRecord, SyncRequest, SyncResponse, Task};
use crate::repositories::{AccountRepository, PriorityRepository, TodoRepository};

/// A stored record plus the server time it was last written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow<T> {
    pub record: T,
    pub synced_at: i64,
}

/// Changes to apply for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<T> {
    pub inserts: Vec<T>,
    pub updates: Vec<T>,
    pub deletes: Vec<String>,
    pub conflicts: Vec<Conflict<T>>,
}

impl<T> Default for Plan<T> {
    fn default() -> Self {
        Self {
            inserts: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
            conflicts: Vec::new(),
        }
    }
}

impl<T> Plan<T> {
    /// Inserts and updates, in payload order.
    pub fn upserts(&self) -> impl Iterator<Item = &T> {
        self.inserts.iter().chain(self.updates.iter())
    }

    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Decide what to do with every incoming and stored record.
///
/// # Arguments
/// * `incoming` - Records of the client snapshot (ids unique)
/// * `stored` - Rows currently stored for the account
/// * `cursor` - Server time of the client's last successful sync
pub fn plan_changes<T: SyncRecord>(incoming: &[T], stored: Vec<StoredRow<T>>, cursor: Option<i64>) -> Plan<T> {
    let mut plan = Plan::default();
    let changed_since_cursor = |row: &StoredRow<T>| cursor.is_some_and(|cursor| row.synced_at > cursor);

    let mut stored_by_id: HashMap<String, StoredRow<T>> =
        stored.into_iter().map(|row| (row.record.id().to_string(), row)).collect();

    let mut seen = HashSet::with_capacity(incoming.len());
    for record in incoming {
        seen.insert(record.id());
        match stored_by_id.get(record.id()) {
            None => plan.inserts.push(record.clone()),
            Some(row) if row.record == *record => {}
            Some(row) if changed_since_cursor(row) => plan.conflicts.push(Conflict {
                id: record.id().to_string(),
                client_version: ClientVersion::Record(record.clone()),
                server_version: row.record.clone(),
            }),
            Some(_) => plan.updates.push(record.clone()),
        }
    }

    if cursor.is_none() {
        return plan;
    }

    let mut missing: Vec<String> = stored_by_id
        .keys()
        .filter(|id| !seen.contains(id.as_str()))
        .cloned()
        .collect();
    missing.sort();
    for id in missing {
        let Some(row) = stored_by_id.remove(&id) else {
            continue;
        };
        if changed_since_cursor(&row) {
            plan.conflicts.push(Conflict {
                id,
                client_version: ClientVersion::deleted(),
                server_version: row.record,
            });
        } else {
            plan.deletes.push(id);
        }
    }
    plan
}

/// Merge `request` into the account's stored state at server time `now`.
///
/// The request must already be validated. Every write, including creating
/// or touching the account row, happens in a single transaction; on error
/// nothing is applied.
pub async fn reconcile<C>(db: &C, request: &SyncRequest, now: i64) -> Result<SyncResponse>
where
    C: TransactionTrait,
{
    let token = request.token.as_str();
    let txn = db.begin().await?;

    let stored_todos = TodoRepository::get_all(&txn, token)
        .await?
        .into_iter()
        .map(|row| StoredRow {
            synced_at: row.synced_at,
            record: Task::from(row),
        })
        .collect();
    let stored_priorities = PriorityRepository::get_all(&txn, token)
        .await?
        .into_iter()
        .map(|row| StoredRow {
            synced_at: row.synced_at,
            record: Bucket::from(row),
        })
        .collect();

    let todos = plan_changes(&request.todos, stored_todos, request.last_sync_at);
    let priorities = plan_changes(&request.priorities, stored_priorities, request.last_sync_at);

    AccountRepository::record_sync(&txn, token, now).await?;
    for bucket in priorities.upserts() {
        PriorityRepository::upsert(&txn, token, bucket, now).await?;
    }
    for task in todos.upserts() {
        TodoRepository::upsert(&txn, token, task, now).await?;
    }
    let deleted_todos = TodoRepository::delete_ids(&txn, token, &todos.deletes).await?;
    let deleted_priorities = PriorityRepository::delete_ids(&txn, token, &priorities.deletes).await?;

    txn.commit().await?;

    if todos.is_noop() && priorities.is_noop() {
        debug!("Sync for {token}: nothing changed");
    }
    let conflicts = ConflictSet {
        todos: todos.conflicts,
        priorities: priorities.conflicts,
    };
    info!(
        "Sync for {token}: todos +{} ~{} -{}, priorities +{} ~{} -{}, {} conflicts",
        todos.inserts.len(),
        todos.updates.len(),
        deleted_todos,
        priorities.inserts.len(),
        priorities.updates.len(),
        deleted_priorities,
        conflicts.len()
    );

    let has_conflicts = !conflicts.is_empty();
    Ok(SyncResponse {
        success: true,
        synced_at: now,
        todos_count: todos.inserts.len() + todos.updates.len(),
        priorities_count: priorities.inserts.len() + priorities.updates.len(),
        deleted_todos: deleted_todos as usize,
        deleted_priorities: deleted_priorities as usize,
        inserted_todos: todos.inserts.len(),
        updated_todos: todos.updates.len(),
        inserted_priorities: priorities.inserts.len(),
        updated_priorities: priorities.updates.len(),
        has_conflicts,
        conflicts: has_conflicts.then_some(conflicts),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, text: &str, updated_at: i64) -> Task {
        Task {
            id: id.to_string(),
            text: text.to_string(),
            completed: false,
            priority_id: None,
            order: 0,
            created_at: 1,
            updated_at,
        }
    }

    fn stored(record: Task, synced_at: i64) -> StoredRow<Task> {
        StoredRow { record, synced_at }
    }

    #[test]
    fn test_identical_records_are_noop() {
        let record = task("a", "same", 10);
        let plan = plan_changes(&[record.clone()], vec![stored(record, 500)], Some(50));
        assert!(plan.is_noop());
        assert!(plan.conflicts.is_empty());
    }

    #[test]
    fn test_newer_server_row_wins() {
        let client = task("a", "client", 100);
        let server = task("a", "server", 200);
        let plan = plan_changes(&[client.clone()], vec![stored(server.clone(), 200)], Some(50));
        assert!(plan.updates.is_empty());
        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.conflicts[0].client_version, ClientVersion::Record(client));
        assert_eq!(plan.conflicts[0].server_version, server);
    }

    #[test]
    fn test_missing_rows_without_cursor_are_kept() {
        let plan = plan_changes(&[], vec![stored(task("a", "x", 1), 10)], None);
        assert!(plan.deletes.is_empty());
        assert!(plan.conflicts.is_empty());
    }

    #[test]
    fn test_missing_rows_deleted_or_conflicted() {
        let rows = vec![stored(task("old", "x", 1), 10), stored(task("new", "y", 1), 90)];
        let plan = plan_changes(&[], rows, Some(50));
        assert_eq!(plan.deletes, vec!["old".to_string()]);
        assert_eq!(plan.conflicts.len(), 1);
        assert!(plan.conflicts[0].client_version.is_deleted());
    }
}
