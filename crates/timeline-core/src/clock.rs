//! Wall-clock source for scores.
//!
//! Scores mix in the current instant (publish score, event tie-break), so the
//! clock is injected rather than read directly. Production uses
//! [`SystemClock`]; tests drive a [`ManualClock`].

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Source of the current instant in nanoseconds since the Unix epoch.
pub trait Clock: Send + Sync + Debug {
    /// Current instant in nanoseconds.
    fn now_nanos(&self) -> i64;

    /// Current instant in whole seconds.
    fn now_secs(&self) -> i64 {
        self.now_nanos().div_euclid(crate::score::NANOS_PER_SECOND)
    }
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        // Saturates after 2262; scores are i64 nanoseconds.
        Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `nanos`.
    pub fn new(nanos: i64) -> Self {
        Self {
            nanos: AtomicI64::new(nanos),
        }
    }

    /// Sets the current reading.
    pub fn set(&self, nanos: i64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    /// Moves the clock forward by `nanos` and returns the new reading.
    pub fn advance(&self, nanos: i64) -> i64 {
        self.nanos.fetch_add(nanos, Ordering::SeqCst) + nanos
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_nanos(), 1_000);
        assert_eq!(clock.advance(500), 1_500);
        assert_eq!(clock.now_nanos(), 1_500);
        clock.set(3_000_000_000);
        assert_eq!(clock.now_secs(), 3);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_secs() > 1_577_836_800);
    }
}
