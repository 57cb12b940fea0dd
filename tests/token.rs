use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tasksync::storage::{FileStorage, MemoryStorage, SharedStorage};
use tasksync::token::{self, ExpirationState, RetentionPolicy, TokenManager};
use tasksync::utils::datetime::DAY_MS;

const LEASE_TIMEOUT: Duration = Duration::from_secs(5);

fn memory_manager() -> TokenManager {
    TokenManager::new(Arc::new(MemoryStorage::new()), RetentionPolicy::default(), LEASE_TIMEOUT)
}

#[test]
fn test_generated_tokens_match_grammar() {
    for _ in 0..200 {
        let token = token::generate();
        assert_eq!(token.len(), 11);
        assert!(token::is_valid(&token), "generated token {token} is invalid");
        assert!(!token.contains(['0', 'O', '1', 'I', 'L']));
    }
}

#[test]
fn test_generated_tokens_are_distinct() {
    let tokens: HashSet<String> = (0..100).map(|_| token::generate()).collect();
    assert_eq!(tokens.len(), 100);
}

#[test]
fn test_is_valid_rejects_bad_shapes() {
    assert!(token::is_valid("ABC-DEF-GHJ"));
    assert!(!token::is_valid("abc-def-ghj")); // not normalized
    assert!(!token::is_valid("ABC-DEF-GH"));
    assert!(!token::is_valid("ABCDEFGHJ"));
    assert!(!token::is_valid("AB0-DEF-GHJ")); // excluded glyph
    assert!(!token::is_valid("ABC-DEF-GHJ-KMN"));
    assert!(!token::is_valid(""));
}

#[test]
fn test_normalize_trims_and_upper_cases() {
    assert_eq!(token::normalize("  abc-def-ghj \n"), Some("ABC-DEF-GHJ".to_string()));
    assert_eq!(token::normalize("abc-def-gh1"), None);
}

#[test]
fn test_retention_boundary_is_strict() {
    let policy = RetentionPolicy {
        window_days: 90,
        warning_days: 7,
    };
    let last_sync = 1_000_000;
    let expires_at = last_sync + 90 * DAY_MS;

    assert_eq!(policy.expires_at(0, Some(last_sync)), expires_at);
    assert!(!policy.is_expired(0, Some(last_sync), expires_at));
    assert!(policy.is_expired(0, Some(last_sync), expires_at + 1));
    // Never-synced accounts age from creation
    assert!(policy.is_expired(0, None, 90 * DAY_MS + 1));
}

#[test]
fn test_expiration_status_states() {
    let policy = RetentionPolicy {
        window_days: 90,
        warning_days: 7,
    };
    let created = 0;

    assert_eq!(policy.status(None, None, 0).state, ExpirationState::None);
    assert_eq!(policy.status(Some(created), None, 10).state, ExpirationState::NeverSynced);

    let synced = 5 * DAY_MS;
    let fresh = policy.status(Some(created), Some(synced), synced + DAY_MS);
    assert_eq!(fresh.state, ExpirationState::Valid);
    assert_eq!(fresh.days_remaining, Some(89));

    let warning = policy.status(Some(created), Some(synced), synced + 85 * DAY_MS);
    assert_eq!(warning.state, ExpirationState::Expiring);
    assert_eq!(warning.days_remaining, Some(5));

    let expired = policy.status(Some(created), Some(synced), synced + 91 * DAY_MS);
    assert_eq!(expired.state, ExpirationState::Expired);
    assert_eq!(expired.days_remaining, Some(0));
}

#[tokio::test]
async fn test_ensure_token_issues_once() {
    let manager = memory_manager();
    assert!(manager.current().unwrap().is_none());

    let first = manager.ensure_token().await.unwrap();
    let second = manager.ensure_token().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(manager.current().unwrap().unwrap().token, first);
}

#[tokio::test]
async fn test_adopt_replaces_and_normalizes() {
    let manager = memory_manager();
    manager.ensure_token().await.unwrap();

    let adopted = manager.adopt(" xyz-abc-def ").await.unwrap();
    assert_eq!(adopted, "XYZ-ABC-DEF");
    assert_eq!(manager.current().unwrap().unwrap().token, "XYZ-ABC-DEF");

    assert!(manager.adopt("nope").await.is_err());
    assert_eq!(manager.current().unwrap().unwrap().token, "XYZ-ABC-DEF");
}

#[tokio::test]
async fn test_clear_forgets_token() {
    let manager = memory_manager();
    manager.ensure_token().await.unwrap();
    manager.clear().unwrap();
    assert!(manager.current().unwrap().is_none());
}

#[tokio::test]
async fn test_malformed_stored_token_is_ignored() {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .set("sync-token", r#"{"token":"bad","createdAt":1}"#)
        .unwrap();
    let manager = TokenManager::new(storage, RetentionPolicy::default(), LEASE_TIMEOUT);
    assert!(manager.current().unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issuance_within_process() {
    let manager = Arc::new(memory_manager());
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_token().await.unwrap() })
        })
        .collect();

    let mut tokens = HashSet::new();
    for handle in handles {
        tokens.insert(handle.await.unwrap());
    }
    assert_eq!(tokens.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issuance_across_storage_handles() {
    // Separate storage handles over one directory behave like separate processes
    let dir = tempfile::tempdir().unwrap();
    let managers: Vec<Arc<TokenManager>> = (0..4)
        .map(|_| {
            let storage: Arc<dyn SharedStorage> = Arc::new(FileStorage::open(dir.path(), None).unwrap());
            Arc::new(TokenManager::new(storage, RetentionPolicy::default(), LEASE_TIMEOUT))
        })
        .collect();

    let handles: Vec<_> = managers
        .iter()
        .cycle()
        .take(16)
        .cloned()
        .map(|manager| tokio::spawn(async move { manager.ensure_token().await.unwrap() }))
        .collect();

    let mut tokens = HashSet::new();
    for handle in handles {
        tokens.insert(handle.await.unwrap());
    }
    assert_eq!(tokens.len(), 1);
}

#[tokio::test]
async fn test_expiration_uses_token_creation_time() {
    let manager = memory_manager();
    assert_eq!(manager.expiration(None, 0).unwrap().state, ExpirationState::None);

    manager.ensure_token().await.unwrap();
    let created_at = manager.current().unwrap().unwrap().created_at;
    let status = manager.expiration(None, created_at).unwrap();
    assert_eq!(status.state, ExpirationState::NeverSynced);
    assert_eq!(status.expires_at, Some(created_at + 90 * DAY_MS));
}
