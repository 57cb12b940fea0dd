//! Date and time utility functions
//!
//! Every timestamp that crosses the wire or lands in storage is an integer
//! number of milliseconds since the Unix epoch. This module keeps the
//! conversions in one place.

use chrono::{Local, TimeZone, Utc};

/// One day in milliseconds.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Display format used by the command-line client
pub const DISPLAY_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a number of days to milliseconds.
pub fn days_to_millis(days: u32) -> i64 {
    i64::from(days) * DAY_MS
}

/// Whole days until `target`, rounded up, never negative.
///
/// # Arguments
/// * `target` - Future instant in epoch milliseconds
/// * `now` - Reference instant in epoch milliseconds
pub fn days_until(target: i64, now: i64) -> i64 {
    let remaining = target - now;
    if remaining <= 0 {
        return 0;
    }
    (remaining + DAY_MS - 1) / DAY_MS
}

/// Convert epoch milliseconds to epoch seconds, rounding up.
pub fn millis_to_secs_ceil(ms: i64) -> i64 {
    if ms <= 0 {
        return 0;
    }
    (ms + 999) / 1000
}

/// Format an epoch-millisecond timestamp in local time for display.
///
/// Returns `"never"` for `None` and `"invalid"` for timestamps chrono cannot represent.
pub fn format_timestamp(ms: Option<i64>) -> String {
    match ms {
        None => "never".to_string(),
        Some(ms) => match Local.timestamp_millis_opt(ms).single() {
            Some(dt) => dt.format(DISPLAY_DATETIME_FORMAT).to_string(),
            None => "invalid".to_string(),
        },
    }
}
