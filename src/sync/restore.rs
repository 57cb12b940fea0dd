//! Strict per-record validation of restore payloads.
//!
//! A restore never aborts because of one bad record: each record is checked
//! on its own and invalid ones are dropped and counted.

use log::debug;
use serde::de::DeserializeOwned;

use crate::model::{normalize_bucket_orders, normalize_task_orders, Bucket, RawRestorePayload, SyncRecord, Task};

/// Valid records of a restore payload plus what was dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoredSnapshot {
    pub tasks: Vec<Task>,
    pub buckets: Vec<Bucket>,
    pub last_sync_at: Option<i64>,
    pub skipped_tasks: usize,
    pub skipped_buckets: usize,
}

impl RestoredSnapshot {
    pub fn skipped(&self) -> usize {
        self.skipped_tasks + self.skipped_buckets
    }
}

fn keep_valid<T: SyncRecord + DeserializeOwned>(values: Vec<serde_json::Value>) -> (Vec<T>, usize) {
    let mut valid: Vec<T> = Vec::with_capacity(values.len());
    let mut skipped = 0;
    for value in values {
        let record = match serde_json::from_value::<T>(value) {
            Ok(record) => record,
            Err(e) => {
                debug!("Dropping malformed {} record: {e}", T::KIND);
                skipped += 1;
                continue;
            }
        };
        if let Err(e) = record.validate() {
            debug!("Dropping invalid {} record: {e}", T::KIND);
            skipped += 1;
            continue;
        }
        if valid.iter().any(|existing| existing.id() == record.id()) {
            debug!("Dropping duplicate {} record {}", T::KIND, record.id());
            skipped += 1;
            continue;
        }
        valid.push(record);
    }
    (valid, skipped)
}

/// Split a raw payload into valid records and skip counts.
///
/// Task references to buckets that did not survive validation are cleared,
/// and ordering is healed.
pub fn partition_payload(payload: RawRestorePayload) -> RestoredSnapshot {
    let (mut tasks, skipped_tasks) = keep_valid::<Task>(payload.todos);
    let (mut buckets, skipped_buckets) = keep_valid::<Bucket>(payload.priorities);

    for task in &mut tasks {
        let dangling = task
            .priority_id
            .as_deref()
            .is_some_and(|id| !buckets.iter().any(|bucket| bucket.id == id));
        if dangling {
            task.priority_id = None;
        }
    }
    normalize_task_orders(&mut tasks);
    normalize_bucket_orders(&mut buckets);

    RestoredSnapshot {
        tasks,
        buckets,
        last_sync_at: payload.settings.last_sync_at,
        skipped_tasks,
        skipped_buckets,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::model::RestoreSettings;

    fn task(id: &str, order: i32) -> Value {
        json!({
            "id": id,
            "text": format!("task {id}"),
            "completed": false,
            "priorityId": "p1",
            "order": order,
            "createdAt": 10,
            "updatedAt": 20
        })
    }

    fn bucket(id: &str, color: &str) -> Value {
        json!({"id": id, "name": "High", "color": color, "order": 0, "isDefault": true})
    }

    fn payload(todos: Vec<Value>, priorities: Vec<Value>) -> RawRestorePayload {
        RawRestorePayload {
            todos,
            priorities,
            settings: RestoreSettings { last_sync_at: Some(99) },
        }
    }

    #[test]
    fn test_one_malformed_task_is_skipped() {
        let restored = partition_payload(payload(
            vec![task("a", 0), task("b", 1), json!({"id": "broken", "text": 42}), task("c", 2)],
            vec![bucket("p1", "#ef4444")],
        ));

        assert_eq!(restored.tasks.len(), 3);
        assert_eq!(restored.skipped_tasks, 1);
        assert_eq!(restored.skipped_buckets, 0);
        assert_eq!(restored.skipped(), 1);
        assert_eq!(restored.last_sync_at, Some(99));
    }

    #[test]
    fn test_records_failing_validation_are_skipped() {
        let mut backwards = task("late", 3);
        backwards["updatedAt"] = json!(5);
        let mut blank = task("blank", 4);
        blank["text"] = json!("   ");

        let restored = partition_payload(payload(
            vec![task("a", 0), backwards, task("a", 1), blank],
            vec![bucket("p1", "#ef4444"), bucket("p2", "red"), bucket("p1", "#000000")],
        ));

        let ids: Vec<&str> = restored.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(restored.skipped_tasks, 3);
        assert_eq!(restored.buckets.len(), 1);
        assert_eq!(restored.buckets[0].color, "#ef4444");
        assert_eq!(restored.skipped_buckets, 2);
    }

    #[test]
    fn test_dangling_bucket_references_are_cleared() {
        let restored = partition_payload(payload(vec![task("a", 4), task("b", 7)], vec![bucket("p1", "nope")]));

        assert_eq!(restored.skipped_buckets, 1);
        assert!(restored.buckets.is_empty());
        assert!(restored.tasks.iter().all(|t| t.priority_id.is_none()));
        let orders: Vec<i32> = restored.tasks.iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[test]
    fn test_empty_payload() {
        let restored = partition_payload(RawRestorePayload::default());
        assert_eq!(restored, RestoredSnapshot::default());
    }
}
