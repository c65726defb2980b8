//! Process-local backend.
//!
//! All four kinds of value live in one keyspace behind a single `RwLock`, so
//! every method is atomic with respect to every other. String expiry is lazy:
//! expired values are ignored on read and dropped on the next write.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use timeline_core::{Clock, Score, SystemClock};

use super::{Backend, ScoreBound, Scored};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
struct StringEntry {
    value: String,
    /// Clock reading (nanoseconds) at which the value disappears.
    expires_at: Option<i64>,
}

impl StringEntry {
    fn live_at(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Members indexed both by name and by `(score, member)` order.
#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, Score>,
    order: BTreeSet<(Score, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: Score) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.order.remove(&(old, member.to_string()));
        }
        self.order.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(old) => {
                self.order.remove(&(old, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    /// Entries with `lo <= score <= hi`, ascending.
    fn between(&self, lo: i64, hi: i64) -> impl DoubleEndedIterator<Item = &(Score, String)> {
        let start = Bound::Included((Score::from_nanos(lo), String::new()));
        let end = match hi.checked_add(1) {
            Some(next) => Bound::Excluded((Score::from_nanos(next), String::new())),
            None => Bound::Unbounded,
        };
        self.order.range((start, end))
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    strings: HashMap<String, StringEntry>,
    hashes: HashMap<String, BTreeMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
    zsets: HashMap<String, SortedSet>,
}

impl Keyspace {
    fn live_string(&self, key: &str, now: i64) -> Option<&StringEntry> {
        self.strings.get(key).filter(|e| e.live_at(now))
    }

    fn live_string_mut(&mut self, key: &str, now: i64) -> Option<&mut StringEntry> {
        if self.strings.get(key).is_some_and(|e| !e.live_at(now)) {
            self.strings.remove(key);
        }
        self.strings.get_mut(key)
    }

    fn purge_expired(&mut self, now: i64) {
        self.strings.retain(|_, e| e.live_at(now));
    }
}

/// In-memory [`Backend`].
#[derive(Debug)]
pub struct MemoryBackend {
    keyspace: RwLock<Keyspace>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates an empty backend on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty backend whose expiry follows `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            keyspace: RwLock::new(Keyspace::default()),
            clock,
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Keyspace>> {
        self.keyspace
            .read()
            .map_err(|_| StoreError::backend("memory backend lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Keyspace>> {
        self.keyspace
            .write()
            .map_err(|_| StoreError::backend("memory backend lock poisoned"))
    }

    fn now(&self) -> i64 {
        self.clock.now_nanos()
    }
}

fn collect(entries: impl Iterator<Item = (Score, String)>, limit: Option<usize>) -> Vec<Scored> {
    entries
        .take(limit.unwrap_or(usize::MAX))
        .map(|(score, member)| (member, score))
        .collect()
}

#[async_trait]
impl Backend for MemoryBackend {
    // ==================== Strings ====================

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.now();
        let ks = self.read()?;
        Ok(ks.live_string(key, now).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut ks = self.write()?;
        ks.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let now = self.now();
        let ks = self.read()?;
        Ok(ks.live_string(key, now).is_some())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let now = self.now();
        let mut ks = self.write()?;
        let string = ks.live_string_mut(key, now).is_some();
        ks.strings.remove(key);
        let hash = ks.hashes.remove(key).is_some();
        let set = ks.sets.remove(key).is_some();
        let zset = ks.zsets.remove(key).is_some();
        Ok(string || hash || set || zset)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = self.now();
        let nanos = i64::try_from(ttl.as_nanos()).unwrap_or(i64::MAX);
        let mut ks = self.write()?;
        match ks.live_string_mut(key, now) {
            Some(entry) => {
                entry.expires_at = Some(now.saturating_add(nanos));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        let now = self.now();
        let mut ks = self.write()?;
        match ks.live_string_mut(key, now) {
            Some(entry) => {
                entry.expires_at = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ==================== Hashes ====================

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let ks = self.read()?;
        Ok(ks.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut ks = self.write()?;
        ks.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hset_many(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut ks = self.write()?;
        let hash = ks.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut ks = self.write()?;
        let Some(hash) = ks.hashes.get_mut(key) else {
            return Ok(false);
        };
        let removed = hash.remove(field).is_some();
        if hash.is_empty() {
            ks.hashes.remove(key);
        }
        Ok(removed)
    }

    async fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, String)>> {
        let ks = self.read()?;
        Ok(ks
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    // ==================== Sets ====================

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut ks = self.write()?;
        Ok(ks
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut ks = self.write()?;
        let Some(set) = ks.sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            ks.sets.remove(key);
        }
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let ks = self.read()?;
        Ok(ks
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        let ks = self.read()?;
        Ok(ks.sets.get(key).map_or(0, |s| s.len() as u64))
    }

    async fn spop(&self, key: &str) -> StoreResult<Option<String>> {
        let mut ks = self.write()?;
        let Some(set) = ks.sets.get_mut(key) else {
            return Ok(None);
        };
        let popped = set.pop_first();
        if set.is_empty() {
            ks.sets.remove(key);
        }
        Ok(popped)
    }

    // ==================== Ordered collections ====================

    async fn zadd(&self, key: &str, member: &str, score: Score) -> StoreResult<()> {
        let mut ks = self.write()?;
        ks.zsets
            .entry(key.to_string())
            .or_default()
            .insert(member, score);
        Ok(())
    }

    async fn zadd_nx(&self, key: &str, member: &str, score: Score) -> StoreResult<bool> {
        let mut ks = self.write()?;
        let zset = ks.zsets.entry(key.to_string()).or_default();
        if zset.scores.contains_key(member) {
            return Ok(false);
        }
        zset.insert(member, score);
        Ok(true)
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut ks = self.write()?;
        let Some(zset) = ks.zsets.get_mut(key) else {
            return Ok(false);
        };
        let removed = zset.remove(member);
        if zset.len() == 0 {
            ks.zsets.remove(key);
        }
        Ok(removed)
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<Score>> {
        let ks = self.read()?;
        Ok(ks
            .zsets
            .get(key)
            .and_then(|z| z.scores.get(member))
            .copied())
    }

    async fn zincrby(&self, key: &str, member: &str, delta: i64) -> StoreResult<Score> {
        let mut ks = self.write()?;
        let zset = ks.zsets.entry(key.to_string()).or_default();
        let current = zset.scores.get(member).map_or(0, Score::as_nanos);
        let next = Score::from_nanos(current.saturating_add(delta));
        zset.insert(member, next);
        Ok(next)
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let ks = self.read()?;
        Ok(ks.zsets.get(key).map_or(0, |z| z.len() as u64))
    }

    async fn zrange(
        &self,
        key: &str,
        offset: usize,
        count: Option<usize>,
    ) -> StoreResult<Vec<Scored>> {
        let ks = self.read()?;
        let Some(zset) = ks.zsets.get(key) else {
            return Ok(Vec::new());
        };
        Ok(collect(zset.order.iter().skip(offset).cloned(), count))
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Scored>> {
        let ks = self.read()?;
        let (Some(zset), Some((lo, hi))) = (ks.zsets.get(key), ScoreBound::interval(min, max))
        else {
            return Ok(Vec::new());
        };
        Ok(collect(zset.between(lo, hi).cloned(), limit))
    }

    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: ScoreBound,
        min: ScoreBound,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Scored>> {
        let ks = self.read()?;
        let (Some(zset), Some((lo, hi))) = (ks.zsets.get(key), ScoreBound::interval(min, max))
        else {
            return Ok(Vec::new());
        };
        Ok(collect(zset.between(lo, hi).rev().cloned(), limit))
    }

    // ==================== Keyspace ====================

    async fn keys_matching(&self, contains: &str, suffix: &str) -> StoreResult<Vec<String>> {
        let now = self.now();
        let mut ks = self.write()?;
        ks.purge_expired(now);

        let matches = |key: &&String| {
            key.strip_suffix(suffix)
                .is_some_and(|head| head.contains(contains))
        };
        let keys: BTreeSet<String> = ks
            .strings
            .keys()
            .chain(ks.hashes.keys())
            .chain(ks.sets.keys())
            .chain(ks.zsets.keys())
            .filter(matches)
            .cloned()
            .collect();
        Ok(keys.into_iter().collect())
    }

    async fn flush(&self) -> StoreResult<()> {
        let mut ks = self.write()?;
        *ks = Keyspace::default();
        Ok(())
    }

    async fn close(&self) {}
}
