//! Timeline scores.
//!
//! A score is an instant in nanoseconds since the Unix epoch. Non-event items
//! are scored by their publish instant. Event items are scored by their event
//! instant with the sub-second part replaced by the current wall-clock
//! sub-second remainder, so several events scheduled for the same second sort
//! inside that second without colliding.
//!
//! The tie-break depends on when the call happens, not on the item itself.
//! Two events for the same second inserted back to back are distinct but not
//! guaranteed to sort in insertion order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nanoseconds in one second.
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Ordering key of a timeline entry (nanoseconds since the Unix epoch).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(i64);

impl Score {
    /// The smallest representable score.
    pub const MIN: Score = Score(i64::MIN);
    /// The largest representable score.
    pub const MAX: Score = Score(i64::MAX);

    /// Wraps a nanosecond value.
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Returns the nanosecond value.
    #[must_use]
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Whole seconds of this score.
    #[must_use]
    pub const fn secs(&self) -> i64 {
        self.0.div_euclid(NANOS_PER_SECOND)
    }

    /// Sub-second remainder of this score, in nanoseconds.
    #[must_use]
    pub const fn subsec_nanos(&self) -> i64 {
        self.0.rem_euclid(NANOS_PER_SECOND)
    }

    /// Converts a UTC instant into a score.
    ///
    /// Instants outside the representable nanosecond range saturate.
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        match at.timestamp_nanos_opt() {
            Some(nanos) => Self(nanos),
            None if at.timestamp() < 0 => Self::MIN,
            None => Self::MAX,
        }
    }

    /// Converts the score back to a UTC instant.
    #[must_use]
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Score {
    fn from(nanos: i64) -> Self {
        Self(nanos)
    }
}

/// Score for a non-event item published at `now` (nanoseconds).
#[must_use]
pub const fn publish_score(now_nanos: i64) -> Score {
    Score(now_nanos)
}

/// Event-stabilized score.
///
/// Keeps the whole-second part of `event_nanos` and grafts the sub-second
/// remainder of `now_nanos` onto it. Non-positive event values mean "not an
/// event" and are returned unchanged. Events in the last representable second
/// saturate at [`Score::MAX`].
#[must_use]
pub const fn stabilize_event(event_nanos: i64, now_nanos: i64) -> Score {
    if event_nanos <= 0 {
        return Score(event_nanos);
    }
    let whole = event_nanos.div_euclid(NANOS_PER_SECOND) * NANOS_PER_SECOND;
    Score(whole.saturating_add(now_nanos.rem_euclid(NANOS_PER_SECOND)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: i64 = 1_800_000_000 * NANOS_PER_SECOND + 777;

    #[test]
    fn stabilize_keeps_event_second() {
        let now = 1_700_000_000 * NANOS_PER_SECOND + 123_456_789;
        let score = stabilize_event(EVENT, now);
        assert_eq!(score.secs(), 1_800_000_000);
        assert_eq!(score.subsec_nanos(), 123_456_789);
    }

    #[test]
    fn stabilize_saturates_in_last_second() {
        let now = 1_700_000_000 * NANOS_PER_SECOND + 900_000_000;
        assert_eq!(stabilize_event(i64::MAX, now), Score::MAX);

        let last_whole = i64::MAX / NANOS_PER_SECOND * NANOS_PER_SECOND;
        let score = stabilize_event(last_whole, 5);
        assert_eq!(score, Score::from_nanos(last_whole + 5));
    }

    #[test]
    fn stabilize_same_second_distinct_and_sortable() {
        let a = stabilize_event(EVENT, 10 * NANOS_PER_SECOND + 5);
        let b = stabilize_event(EVENT + 999, 10 * NANOS_PER_SECOND + 6);
        assert_ne!(a, b);
        assert_eq!(a.secs(), b.secs());
        assert!(a < b);

        let lower = Score::from_nanos(1_800_000_000 * NANOS_PER_SECOND);
        let upper = Score::from_nanos(1_800_000_001 * NANOS_PER_SECOND);
        for s in [a, b] {
            assert!(s >= lower && s < upper);
        }
    }

    #[test]
    fn stabilize_passes_through_non_events() {
        assert_eq!(stabilize_event(0, 12345), Score::from_nanos(0));
        assert_eq!(stabilize_event(-5, 12345), Score::from_nanos(-5));
    }

    #[test]
    fn publish_score_is_identity() {
        assert_eq!(publish_score(42).as_nanos(), 42);
    }

    #[test]
    fn datetime_roundtrip() {
        let at = DateTime::from_timestamp(1_700_000_000, 250).unwrap();
        let score = Score::from_datetime(at);
        assert_eq!(score.as_nanos(), 1_700_000_000 * NANOS_PER_SECOND + 250);
        assert_eq!(score.to_datetime(), at);
    }

    #[test]
    fn datetime_saturates_out_of_range() {
        // Year 3000, past the i64 nanosecond horizon (2262).
        let far = DateTime::from_timestamp(32_503_680_000, 0).unwrap();
        assert_eq!(Score::from_datetime(far), Score::MAX);
    }
}
