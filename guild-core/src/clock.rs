//! Injected time source.
//!
//! The ledger never reads the system clock directly. Hosts hand it a
//! [`Clock`] at construction: [`SystemClock`] in production, [`ManualClock`]
//! for tests, replays and server-side simulation where game time is not
//! wall-clock time.

use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::Mutex;

use crate::types::Timestamp;

/// A source of "now" for hire and interaction timestamps.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by [`Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying time, so a test can keep one handle and
/// give the other to the ledger.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Timestamp) {
        *self.now.lock() = to;
    }

    /// Move forward by `minutes`.
    pub fn advance_minutes(&self, minutes: i64) {
        let mut now = self.now.lock();
        *now += Duration::minutes(minutes);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_shares_time_between_clones() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("valid date");
        let clock = ManualClock::new(start);
        let handle = clock.clone();

        handle.advance_minutes(90);

        assert_eq!(clock.now(), start + Duration::minutes(90));
    }

    #[test]
    fn system_clock_moves_forward() {
        let a = SystemClock.now();
        let b = SystemClock.now();
        assert!(b >= a);
    }
}
