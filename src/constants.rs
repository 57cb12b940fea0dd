//! Constants used throughout the application
//!
//! This module centralizes storage keys, wire limits, HTTP header names and
//! log/UI text so the client and server agree on them.

// Token grammar
/// Token alphabet: upper-case letters and digits without 0, O, 1, I and L
pub const TOKEN_ALPHABET: &str = "ABCDEFGHJKMNPQRSTUVWXYZ23456789";
/// Number of hyphen-separated groups in a token
pub const TOKEN_GROUPS: usize = 3;
/// Characters per token group
pub const TOKEN_GROUP_LEN: usize = 3;

// Retention
/// Days an account may stay idle before the sweeper deletes it
pub const DEFAULT_RETENTION_DAYS: u32 = 90;
/// Days before expiration at which the client starts warning
pub const DEFAULT_EXPIRY_WARNING_DAYS: u32 = 7;

// Record limits
pub const MAX_ID_LEN: usize = 64;
pub const MAX_TASK_TEXT_LEN: usize = 500;
pub const MAX_BUCKET_NAME_LEN: usize = 50;
pub const MAX_EMAIL_LEN: usize = 254;
pub const DEFAULT_MAX_TASKS_PER_SYNC: usize = 1000;
pub const DEFAULT_MAX_BUCKETS_PER_SYNC: usize = 50;

// Shared storage keys
pub const STATE_KEY: &str = "state";
pub const TOKEN_KEY: &str = "sync-token";
pub const PRE_RESTORE_BACKUP_KEY: &str = "pre-restore-backup";
pub const CORRUPT_STATE_BACKUP_KEY: &str = "corrupt-state-backup";
pub const CACHE_KEY_PREFIX: &str = "cache.";
pub const TOKEN_LEASE_FILE: &str = "token.lock";
/// Days a backup cache entry is kept before it becomes evictable
pub const BACKUP_RETENTION_DAYS: u32 = 7;

// Rate limit headers
pub const HEADER_RATE_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RATE_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RATE_RESET: &str = "x-ratelimit-reset";
pub const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";
/// Path exempt from rate limiting
pub const HEALTH_CHECK_PATH: &str = "/health";

// Default buckets seeded into a fresh store: (name, color)
pub const DEFAULT_BUCKETS: [(&str, &str); 3] = [("High", "#ef4444"), ("Medium", "#f59e0b"), ("Low", "#3b82f6")];

// Log Messages
pub const LOG_SYNC_STARTED: &str = "🔄 Starting sync";
pub const LOG_SYNC_SUCCEEDED: &str = "✅ Sync completed";
pub const LOG_SYNC_FAILED: &str = "❌ Sync failed";
pub const LOG_SYNC_OFFLINE: &str = "📴 Offline, sync deferred";
pub const LOG_RESTORE_STARTED: &str = "📥 Restoring from token";
pub const LOG_RESTORE_FAILED: &str = "❌ Restore failed";
pub const LOG_TOKEN_ISSUED: &str = "🔑 Issued new sync token";

// UI Messages
pub const CONFIG_GENERATED: &str = "✅ Generated default configuration file";
pub const RECOVERY_EMAIL_SUBJECT: &str = "Your task list recovery code";
