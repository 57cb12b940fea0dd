//! Recovery tokens
//!
//! A token is three hyphen-separated groups of three characters from
//! [`TOKEN_ALPHABET`], always upper case, e.g. `K7M-QX3-HPA`. The alphabet
//! leaves out glyphs that are easy to confuse when read aloud or copied by
//! hand (`0`/`O`, `1`/`I`/`L`).
//!
//! This module holds the pure grammar and expiration rules shared by client
//! and server; [`manager`] owns issuance on the client.

pub mod manager;

pub use manager::{StoredToken, TokenError, TokenManager};

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::Serialize;

use crate::constants::{
    DEFAULT_EXPIRY_WARNING_DAYS, DEFAULT_RETENTION_DAYS, TOKEN_ALPHABET, TOKEN_GROUPS, TOKEN_GROUP_LEN,
};
use crate::utils::datetime;

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let class = format!("[{TOKEN_ALPHABET}]{{{TOKEN_GROUP_LEN}}}");
    Regex::new(&format!("^{class}-{class}-{class}$")).expect("token pattern")
});

/// Generate a fresh random token.
pub fn generate() -> String {
    let alphabet = TOKEN_ALPHABET.as_bytes();
    let mut rng = rand::thread_rng();
    let groups: Vec<String> = (0..TOKEN_GROUPS)
        .map(|_| {
            (0..TOKEN_GROUP_LEN)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
                .collect()
        })
        .collect();
    groups.join("-")
}

/// Check a token against the grammar. Input must already be normalized.
pub fn is_valid(token: &str) -> bool {
    TOKEN_PATTERN.is_match(token)
}

/// Trim and upper-case user input, returning it only if it is a valid token.
pub fn normalize(input: &str) -> Option<String> {
    let candidate = input.trim().to_uppercase();
    is_valid(&candidate).then_some(candidate)
}

/// How long idle accounts are kept and when clients start warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub window_days: u32,
    pub warning_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_RETENTION_DAYS,
            warning_days: DEFAULT_EXPIRY_WARNING_DAYS,
        }
    }
}

impl RetentionPolicy {
    pub fn window_ms(&self) -> i64 {
        datetime::days_to_millis(self.window_days)
    }

    /// Instant at which an account expires.
    pub fn expires_at(&self, created_at: i64, last_sync_at: Option<i64>) -> i64 {
        last_sync_at.unwrap_or(created_at) + self.window_ms()
    }

    pub fn is_expired(&self, created_at: i64, last_sync_at: Option<i64>, now: i64) -> bool {
        self.expires_at(created_at, last_sync_at) < now
    }

    /// Accounts last active strictly before this instant are due for deletion.
    pub fn cutoff(&self, now: i64) -> i64 {
        now - self.window_ms()
    }

    /// Classify a token's expiration.
    ///
    /// # Arguments
    /// * `created_at` - When the token was issued, `None` if there is no token
    /// * `last_sync_at` - Last successful sync, `None` if never synced
    /// * `now` - Current time in epoch milliseconds
    pub fn status(&self, created_at: Option<i64>, last_sync_at: Option<i64>, now: i64) -> ExpirationStatus {
        let Some(created_at) = created_at else {
            return ExpirationStatus {
                state: ExpirationState::None,
                expires_at: None,
                days_remaining: None,
            };
        };

        let expires_at = self.expires_at(created_at, last_sync_at);
        let days_remaining = datetime::days_until(expires_at, now);
        let state = if last_sync_at.is_none() {
            ExpirationState::NeverSynced
        } else if expires_at < now {
            ExpirationState::Expired
        } else if expires_at - now <= datetime::days_to_millis(self.warning_days) {
            ExpirationState::Expiring
        } else {
            ExpirationState::Valid
        };

        ExpirationStatus {
            state,
            expires_at: Some(expires_at),
            days_remaining: Some(days_remaining),
        }
    }
}

/// Coarse expiration state of the local token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpirationState {
    /// No token has been issued
    None,
    /// A token exists but was never synced, so no account exists yet
    NeverSynced,
    Valid,
    /// Inside the warning window
    Expiring,
    Expired,
}

/// Expiration state plus the numbers behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationStatus {
    pub state: ExpirationState,
    pub expires_at: Option<i64>,
    pub days_remaining: Option<i64>,
}
