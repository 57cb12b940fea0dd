use sea_orm::{ConnectionTrait, DatabaseConnection};
use tasksync::model::{Bucket, SyncRequest, Task};
use tasksync::repositories::{AccountRepository, PriorityRepository, TodoRepository};
use tasksync::server::clock::SyncClock;
use tasksync::server::reconcile::reconcile;
use tasksync::server::storage::connect_in_memory;

const TOKEN: &str = "ABC-DEF-GHJ";

fn task(id: &str, text: &str, updated_at: i64) -> Task {
    Task {
        id: id.to_string(),
        text: text.to_string(),
        completed: false,
        priority_id: Some("p1".to_string()),
        order: 0,
        created_at: 1,
        updated_at,
    }
}

fn bucket(id: &str, name: &str) -> Bucket {
    Bucket {
        id: id.to_string(),
        name: name.to_string(),
        color: "#ef4444".to_string(),
        order: 0,
        is_default: true,
    }
}

fn request(todos: Vec<Task>, priorities: Vec<Bucket>, last_sync_at: Option<i64>) -> SyncRequest {
    SyncRequest {
        token: TOKEN.to_string(),
        todos,
        priorities,
        last_sync_at,
    }
}

async fn stored_texts(db: &DatabaseConnection) -> Vec<String> {
    TodoRepository::get_all(db, TOKEN)
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.text)
        .collect()
}

#[tokio::test]
async fn test_first_sync_creates_account_and_rows() {
    let db = connect_in_memory().await.unwrap();
    let req = request(vec![task("t1", "one", 10), task("t2", "two", 10)], vec![bucket("p1", "High")], None);

    let response = reconcile(&db, &req, 1_000).await.unwrap();
    assert!(response.success);
    assert_eq!(response.synced_at, 1_000);
    assert_eq!(response.inserted_todos, 2);
    assert_eq!(response.inserted_priorities, 1);
    assert!(!response.has_conflicts);
    assert!(response.conflicts.is_none());

    let account = AccountRepository::get(&db, TOKEN).await.unwrap().unwrap();
    assert_eq!(account.created_at, 1_000);
    assert_eq!(account.last_sync_at, Some(1_000));
    assert_eq!(stored_texts(&db).await, vec!["one", "two"]);
}

#[tokio::test]
async fn test_identical_payload_is_idempotent() {
    let db = connect_in_memory().await.unwrap();
    let req = request(vec![task("t1", "one", 10)], vec![bucket("p1", "High")], Some(500));

    reconcile(&db, &req, 1_000).await.unwrap();
    let before = TodoRepository::get_all(&db, TOKEN).await.unwrap();

    let second = reconcile(&db, &req, 2_000).await.unwrap();
    assert!(!second.has_conflicts);
    assert_eq!(second.todos_count, 0);
    assert_eq!(second.deleted_todos, 0);

    let after = TodoRepository::get_all(&db, TOKEN).await.unwrap();
    assert_eq!(before, after);
    // The account still counts as active
    let account = AccountRepository::get(&db, TOKEN).await.unwrap().unwrap();
    assert_eq!(account.last_sync_at, Some(2_000));
    assert_eq!(account.created_at, 1_000);
}

#[tokio::test]
async fn test_server_version_newer_than_cursor_is_kept() {
    let db = connect_in_memory().await.unwrap();
    // Another device wrote the record at server time 200
    reconcile(&db, &request(vec![task("t1", "server", 200)], vec![bucket("p1", "High")], None), 200)
        .await
        .unwrap();

    // This device last synced at 50 and edited the record at 100
    let stale = request(vec![task("t1", "client", 100)], vec![bucket("p1", "High")], Some(50));
    let response = reconcile(&db, &stale, 300).await.unwrap();

    assert!(response.success);
    assert!(response.has_conflicts);
    let conflicts = response.conflicts.unwrap();
    assert_eq!(conflicts.todos.len(), 1);
    let conflict = &conflicts.todos[0];
    assert_eq!(conflict.id, "t1");
    assert_eq!(conflict.server_version.text, "server");
    assert!(!conflict.client_version.is_deleted());
    assert_eq!(stored_texts(&db).await, vec!["server"]);
}

#[tokio::test]
async fn test_update_after_cursor_wins() {
    let db = connect_in_memory().await.unwrap();
    reconcile(&db, &request(vec![task("t1", "old", 10)], vec![bucket("p1", "High")], None), 1_000)
        .await
        .unwrap();

    let response = reconcile(
        &db,
        &request(vec![task("t1", "new", 20)], vec![bucket("p1", "High")], Some(1_000)),
        2_000,
    )
    .await
    .unwrap();
    assert_eq!(response.updated_todos, 1);
    assert!(!response.has_conflicts);
    assert_eq!(stored_texts(&db).await, vec!["new"]);
}

#[tokio::test]
async fn test_missing_records_are_deleted_only_with_cursor() {
    let db = connect_in_memory().await.unwrap();
    let both = request(vec![task("t1", "one", 10), task("t2", "two", 10)], vec![bucket("p1", "High")], None);
    reconcile(&db, &both, 1_000).await.unwrap();

    // A client without a cursor never deletes
    let fresh = request(vec![task("t1", "one", 10)], vec![bucket("p1", "High")], None);
    let response = reconcile(&db, &fresh, 1_500).await.unwrap();
    assert_eq!(response.deleted_todos, 0);
    assert_eq!(stored_texts(&db).await.len(), 2);

    let synced = request(vec![task("t1", "one", 10)], vec![bucket("p1", "High")], Some(1_500));
    let response = reconcile(&db, &synced, 2_000).await.unwrap();
    assert_eq!(response.deleted_todos, 1);
    assert_eq!(stored_texts(&db).await, vec!["one"]);
}

#[tokio::test]
async fn test_delete_of_record_changed_elsewhere_is_a_conflict() {
    let db = connect_in_memory().await.unwrap();
    reconcile(&db, &request(vec![task("t1", "one", 10)], vec![bucket("p1", "High")], None), 1_000)
        .await
        .unwrap();
    // Another device edits t1 after our cursor
    reconcile(
        &db,
        &request(vec![task("t1", "edited", 20)], vec![bucket("p1", "High")], Some(1_000)),
        2_000,
    )
    .await
    .unwrap();

    let response = reconcile(&db, &request(vec![], vec![bucket("p1", "High")], Some(1_000)), 3_000)
        .await
        .unwrap();
    assert_eq!(response.deleted_todos, 0);
    let conflicts = response.conflicts.unwrap();
    assert!(conflicts.todos[0].client_version.is_deleted());
    assert_eq!(stored_texts(&db).await, vec!["edited"]);
}

#[tokio::test]
async fn test_failed_write_rolls_back_everything() {
    let db = connect_in_memory().await.unwrap();
    db.execute_unprepared(
        "CREATE TRIGGER reject_boom BEFORE INSERT ON todos WHEN NEW.text = 'boom' \
         BEGIN SELECT RAISE(ABORT, 'boom'); END",
    )
    .await
    .unwrap();

    let req = request(
        vec![task("t1", "fine", 10), task("t2", "boom", 10)],
        vec![bucket("p1", "High")],
        None,
    );
    assert!(reconcile(&db, &req, 1_000).await.is_err());

    assert!(AccountRepository::get(&db, TOKEN).await.unwrap().is_none());
    assert!(TodoRepository::get_all(&db, TOKEN).await.unwrap().is_empty());
    assert!(PriorityRepository::get_all(&db, TOKEN).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_accounts_are_isolated() {
    let db = connect_in_memory().await.unwrap();
    reconcile(&db, &request(vec![task("t1", "mine", 10)], vec![bucket("p1", "High")], None), 1_000)
        .await
        .unwrap();

    let other = SyncRequest {
        token: "XYZ-XYZ-XYZ".to_string(),
        todos: vec![task("t1", "theirs", 10)],
        priorities: vec![bucket("p1", "High")],
        last_sync_at: Some(1_000),
    };
    let response = reconcile(&db, &other, 2_000).await.unwrap();
    assert_eq!(response.inserted_todos, 1);
    assert!(!response.has_conflicts);

    assert_eq!(stored_texts(&db).await, vec!["mine"]);
    assert_eq!(AccountRepository::count(&db).await.unwrap(), 2);
}

#[tokio::test]
async fn test_same_millisecond_syncs_still_detect_conflicts() {
    let db = connect_in_memory().await.unwrap();
    let clock = SyncClock::new();
    let wall = 5_000;

    // Device A syncs and receives its cursor
    let first = reconcile(
        &db,
        &request(vec![task("t1", "original", 10)], vec![bucket("p1", "High")], None),
        clock.stamp(wall),
    )
    .await
    .unwrap();
    let cursor = first.synced_at;

    // Device B edits t1 within the same wall-clock millisecond
    reconcile(
        &db,
        &request(vec![task("t1", "from B", 20)], vec![bucket("p1", "High")], Some(cursor)),
        clock.stamp(wall),
    )
    .await
    .unwrap();

    // Device A pushes its own stale edit with the old cursor
    let response = reconcile(
        &db,
        &request(vec![task("t1", "from A", 30)], vec![bucket("p1", "High")], Some(cursor)),
        clock.stamp(wall),
    )
    .await
    .unwrap();

    assert!(response.has_conflicts);
    assert_eq!(response.conflicts.unwrap().todos[0].server_version.text, "from B");
    assert_eq!(stored_texts(&db).await, vec!["from B"]);
}

#[tokio::test]
async fn test_latest_sync_stamp_seeds_the_clock() {
    let db = connect_in_memory().await.unwrap();
    assert_eq!(AccountRepository::latest_sync_at(&db).await.unwrap(), None);

    reconcile(&db, &request(vec![], vec![bucket("p1", "High")], None), 9_000).await.unwrap();
    let latest = AccountRepository::latest_sync_at(&db).await.unwrap().unwrap();
    assert_eq!(latest, 9_000);

    // After a restart with a clock that went backwards
    let clock = SyncClock::new();
    clock.observe(latest);
    assert!(clock.stamp(1_000) > 9_000);
}
