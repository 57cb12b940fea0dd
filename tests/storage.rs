use tasksync::storage::{self, FileStorage, MemoryStorage, SharedStorage};

#[test]
fn test_memory_storage_roundtrip() {
    let storage = MemoryStorage::new();
    assert_eq!(storage.get("state").unwrap(), None);

    storage.set("state", "{}").unwrap();
    assert_eq!(storage.get("state").unwrap().as_deref(), Some("{}"));
    assert_eq!(storage.keys().unwrap(), vec!["state".to_string()]);

    storage.remove("state").unwrap();
    assert_eq!(storage.get("state").unwrap(), None);
    // Removing a missing key is not an error
    storage.remove("state").unwrap();
}

#[test]
fn test_invalid_keys_are_rejected() {
    let storage = MemoryStorage::new();
    assert!(storage.set("../escape", "x").is_err());
    assert!(storage.set(".hidden", "x").is_err());
    assert!(storage.set("", "x").is_err());
}

#[test]
fn test_memory_quota_is_enforced() {
    let storage = MemoryStorage::with_quota(20);
    storage.set("a", "0123456789").unwrap();

    let err = storage.set("b", "0123456789").unwrap_err();
    assert!(err.is_quota_exceeded());

    // Overwriting a key does not count its previous value
    storage.set("a", "0123456789012345678").unwrap();
    assert_eq!(storage.used_bytes(), 20);
}

#[test]
fn test_cache_entries_expire() {
    let storage = MemoryStorage::new();
    storage.set_cached("backup", "payload", 1_000).unwrap();

    assert_eq!(storage.get_cached("backup", 999).unwrap().as_deref(), Some("payload"));
    assert_eq!(storage.get_cached("backup", 1_000).unwrap(), None);

    assert_eq!(storage.evict_expired(500).unwrap(), 0);
    assert_eq!(storage.evict_expired(1_000).unwrap(), 1);
    assert!(storage.keys().unwrap().is_empty());
}

#[test]
fn test_evict_expired_keeps_regular_keys() {
    let storage = MemoryStorage::new();
    storage.set("state", "{}").unwrap();
    storage.set("cache.broken", "not json").unwrap();

    assert_eq!(storage.evict_expired(0).unwrap(), 1);
    assert_eq!(storage.keys().unwrap(), vec!["state".to_string()]);
}

#[test]
fn test_set_or_evict_frees_room() {
    let storage = MemoryStorage::with_quota(120);
    storage.set_cached("old", &"x".repeat(60), 10).unwrap();

    let value = "y".repeat(60);
    assert!(storage.set("state", &value).unwrap_err().is_quota_exceeded());

    storage::set_or_evict(&storage, "state", &value, 100).unwrap();
    assert_eq!(storage.get("state").unwrap(), Some(value));
    assert_eq!(storage.get_cached("old", 0).unwrap(), None);
}

#[test]
fn test_set_or_evict_surfaces_quota_error() {
    let storage = MemoryStorage::with_quota(50);
    storage.set("keep", &"k".repeat(30)).unwrap();

    let err = storage::set_or_evict(&storage, "state", &"v".repeat(30), 100).unwrap_err();
    assert!(err.is_quota_exceeded());
    assert_eq!(storage.get("state").unwrap(), None);
}

#[test]
fn test_file_storage_is_shared_between_handles() {
    let dir = tempfile::tempdir().unwrap();
    let first = FileStorage::open(dir.path(), None).unwrap();
    let second = FileStorage::open(dir.path(), None).unwrap();

    first.set("state", "one").unwrap();
    assert_eq!(second.get("state").unwrap().as_deref(), Some("one"));

    second.set("state", "two").unwrap();
    assert_eq!(first.get("state").unwrap().as_deref(), Some("two"));

    // Coordination files never show up as keys
    assert!(first.coordination_dir().unwrap().starts_with(dir.path()));
    assert_eq!(first.keys().unwrap(), vec!["state".to_string()]);
}

#[test]
fn test_file_storage_quota() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::open(dir.path(), Some(16)).unwrap();

    storage.set("a", "0123456789").unwrap();
    assert!(storage.set("b", "0123456789").unwrap_err().is_quota_exceeded());
    assert_eq!(storage.get("b").unwrap(), None);
}

#[test]
fn test_file_storage_parallel_writes_to_one_key() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::open(dir.path(), None).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let storage = storage.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    storage.set("state", &format!("{worker}:{i}")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let value = storage.get("state").unwrap().unwrap();
    assert!(value.ends_with(":49"));
    assert_eq!(storage.keys().unwrap(), vec!["state".to_string()]);
}
