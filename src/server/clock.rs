//! Monotonic sync timestamps.
//!
//! Every reconciliation stamps its rows and the cursor it hands back with
//! the same value. Two syncs landing in the same millisecond, or a wall
//! clock stepping backwards, must still get distinct increasing stamps, or
//! a later cursor could equal a row's stamp and hide a conflict.

use std::sync::atomic::{AtomicI64, Ordering};

use log::warn;

/// Issues strictly increasing epoch-millisecond stamps.
#[derive(Debug, Default)]
pub struct SyncClock {
    last: AtomicI64,
}

impl SyncClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next stamp: `now`, or one past the previous stamp if that is later.
    pub fn stamp(&self, now: i64) -> i64 {
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let next = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    if next > now + 1_000 {
                        warn!("⏱️  Sync clock is {}ms ahead of the wall clock", next - now);
                    }
                    return next;
                }
                Err(current) => last = current,
            }
        }
    }

    /// Never issue a stamp at or below `floor` (e.g. the latest stored stamp).
    pub fn observe(&self, floor: i64) {
        self.last.fetch_max(floor, Ordering::AcqRel);
    }

    pub fn last(&self) -> i64 {
        self.last.load(Ordering::Acquire)
    }
}
