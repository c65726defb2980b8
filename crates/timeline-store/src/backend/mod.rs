//! Backing key/value and ordered-collection services.
//!
//! Every component of the store talks to one of these. Each method is a
//! single atomic round trip; nothing above this layer holds locks, so
//! correctness rests on `zadd_nx`, `zincrby` and friends being atomic here.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use timeline_core::Score;

use crate::error::StoreResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryBackend;
pub use postgres::PgBackend;

/// One end of a score range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    /// The bound itself is part of the range.
    Inclusive(Score),
    /// The bound itself is excluded.
    Exclusive(Score),
    /// No bound on this side.
    Unbounded,
}

impl ScoreBound {
    /// Smallest admitted score when used as a lower bound, `None` if the
    /// range is necessarily empty.
    pub fn lowest(&self) -> Option<i64> {
        match *self {
            Self::Inclusive(s) => Some(s.as_nanos()),
            Self::Exclusive(s) => s.as_nanos().checked_add(1),
            Self::Unbounded => Some(i64::MIN),
        }
    }

    /// Largest admitted score when used as an upper bound, `None` if the
    /// range is necessarily empty.
    pub fn highest(&self) -> Option<i64> {
        match *self {
            Self::Inclusive(s) => Some(s.as_nanos()),
            Self::Exclusive(s) => s.as_nanos().checked_sub(1),
            Self::Unbounded => Some(i64::MAX),
        }
    }

    /// Collapses a `(min, max)` pair into an inclusive nanosecond interval.
    pub fn interval(min: ScoreBound, max: ScoreBound) -> Option<(i64, i64)> {
        let lo = min.lowest()?;
        let hi = max.highest()?;
        (lo <= hi).then_some((lo, hi))
    }
}

/// A member of an ordered collection with its score.
pub type Scored = (String, Score);

/// Storage primitives consumed by the timeline store.
///
/// Absent keys are never an error: reads return `None`, empty collections
/// or zero. Errors mean the backend itself failed.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    // ==================== Strings ====================

    /// Value of a string key. Expired keys read as absent.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a string key, clearing any expiry.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// True if the string key exists and has not expired.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Deletes a key of any kind. Returns true if something was removed.
    async fn del(&self, key: &str) -> StoreResult<bool>;

    /// Installs an expiry on a string key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Removes any expiry from a string key. Returns false if the key is
    /// absent.
    async fn persist(&self, key: &str) -> StoreResult<bool>;

    // ==================== Hashes ====================

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    async fn hset_many(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()>;

    /// Returns true if the field existed.
    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool>;

    async fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, String)>>;

    // ==================== Sets ====================

    /// Returns true if the member was newly added.
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Returns true if the member was present.
    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn scard(&self, key: &str) -> StoreResult<u64>;

    /// Removes and returns an arbitrary member.
    async fn spop(&self, key: &str) -> StoreResult<Option<String>>;

    // ==================== Ordered collections ====================

    /// Inserts or re-scores a member.
    async fn zadd(&self, key: &str, member: &str, score: Score) -> StoreResult<()>;

    /// Inserts a member only if it has no score yet. Returns true if inserted.
    async fn zadd_nx(&self, key: &str, member: &str, score: Score) -> StoreResult<bool>;

    /// Returns true if the member was present.
    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<Score>>;

    /// Adds `delta` to a member's score, creating it at `delta`.
    async fn zincrby(&self, key: &str, member: &str, delta: i64) -> StoreResult<Score>;

    async fn zcard(&self, key: &str) -> StoreResult<u64>;

    /// Members by ascending rank, skipping `offset`. `count` of `None`
    /// returns the rest of the collection.
    async fn zrange(&self, key: &str, offset: usize, count: Option<usize>)
    -> StoreResult<Vec<Scored>>;

    /// Members with `min <= score <= max` (per bound kind), lowest first.
    async fn zrange_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Scored>>;

    /// Members with `min <= score <= max` (per bound kind), highest first.
    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: ScoreBound,
        min: ScoreBound,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Scored>>;

    // ==================== Keyspace ====================

    /// Keys ending in `suffix` whose remaining prefix contains `contains`.
    async fn keys_matching(&self, contains: &str, suffix: &str) -> StoreResult<Vec<String>>;

    /// Drops every key in this database.
    async fn flush(&self) -> StoreResult<()>;

    /// Releases connections. Further calls may fail.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_inclusive() {
        let min = ScoreBound::Inclusive(Score::from_nanos(5));
        let max = ScoreBound::Inclusive(Score::from_nanos(5));
        assert_eq!(ScoreBound::interval(min, max), Some((5, 5)));
    }

    #[test]
    fn test_interval_exclusive_collapses() {
        let min = ScoreBound::Exclusive(Score::from_nanos(5));
        let max = ScoreBound::Inclusive(Score::from_nanos(5));
        assert_eq!(ScoreBound::interval(min, max), None);
    }

    #[test]
    fn test_interval_saturation() {
        assert_eq!(ScoreBound::Exclusive(Score::MAX).lowest(), None);
        assert_eq!(ScoreBound::Exclusive(Score::MIN).highest(), None);
        assert_eq!(
            ScoreBound::interval(ScoreBound::Unbounded, ScoreBound::Unbounded),
            Some((i64::MIN, i64::MAX))
        );
    }
}
