use std::sync::atomic::{AtomicI64, Ordering};
use time::OffsetDateTime;

///
/// Clock
/// Source of persistence timestamps, in milliseconds since the Unix epoch.
///

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

///
/// SystemClock
///

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;

        i64::try_from(millis).unwrap_or(i64::MAX)
    }
}

///
/// FixedClock
/// Manually driven clock for deterministic timestamps.
///

#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    #[must_use]
    pub const fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Current wall-clock time in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    SystemClock.now_millis()
}
