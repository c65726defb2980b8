//! Ordered timeline store.
//!
//! Each profile owns two ordered collections in the timeline database, one
//! per [`Scope`]. Members are item keys; scores are nanosecond instants.

use timeline_core::{ItemId, Pid, Score, Scope, TimelineEntry, keys};

use crate::backend::{ScoreBound, Scored};
use crate::error::StoreResult;
use crate::store::Store;

/// Timeline collection operations for the store.
#[derive(Debug, Clone, Copy)]
pub struct Timelines<'a> {
    store: &'a Store,
}

fn entries(rows: Vec<Scored>) -> Vec<TimelineEntry> {
    rows.into_iter()
        .map(|(member, score)| TimelineEntry::new(keys::item_id_from_key(&member), score))
        .collect()
}

impl<'a> Timelines<'a> {
    /// Create a new timelines instance.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Adds the item unless it already has a score. Returns true if added.
    pub async fn insert_if_absent(
        &self,
        pid: &Pid,
        scope: Scope,
        item_id: &ItemId,
        score: Score,
    ) -> StoreResult<bool> {
        self.store
            .dbs()
            .timeline
            .zadd_nx(&keys::timeline_key(pid, scope), &keys::item_key(item_id), score)
            .await
    }

    /// Removes the item. Returns true if it was present.
    pub async fn remove(&self, pid: &Pid, scope: Scope, item_id: &ItemId) -> StoreResult<bool> {
        self.store
            .dbs()
            .timeline
            .zrem(&keys::timeline_key(pid, scope), &keys::item_key(item_id))
            .await
    }

    /// Score of the item, `None` if the item is not in this timeline.
    pub async fn score_of(
        &self,
        pid: &Pid,
        scope: Scope,
        item_id: &ItemId,
    ) -> StoreResult<Option<Score>> {
        self.store
            .dbs()
            .timeline
            .zscore(&keys::timeline_key(pid, scope), &keys::item_key(item_id))
            .await
    }

    /// True if the item is in this timeline.
    pub async fn contains(&self, pid: &Pid, scope: Scope, item_id: &ItemId) -> StoreResult<bool> {
        Ok(self.score_of(pid, scope, item_id).await?.is_some())
    }

    /// Entries from `max` downwards to `min`, newest first.
    pub async fn range_descending(
        &self,
        pid: &Pid,
        scope: Scope,
        max: ScoreBound,
        min: ScoreBound,
        limit: Option<usize>,
    ) -> StoreResult<Vec<TimelineEntry>> {
        let rows = self
            .store
            .dbs()
            .timeline
            .zrevrange_by_score(&keys::timeline_key(pid, scope), max, min, limit)
            .await?;
        Ok(entries(rows))
    }

    /// Entries from `min` upwards to `max`, oldest first.
    pub async fn range_ascending(
        &self,
        pid: &Pid,
        scope: Scope,
        min: ScoreBound,
        max: ScoreBound,
        limit: Option<usize>,
    ) -> StoreResult<Vec<TimelineEntry>> {
        let rows = self
            .store
            .dbs()
            .timeline
            .zrange_by_score(&keys::timeline_key(pid, scope), min, max, limit)
            .await?;
        Ok(entries(rows))
    }

    /// Every entry, oldest first.
    pub async fn all(&self, pid: &Pid, scope: Scope) -> StoreResult<Vec<TimelineEntry>> {
        let rows = self
            .store
            .dbs()
            .timeline
            .zrange(&keys::timeline_key(pid, scope), 0, None)
            .await?;
        Ok(entries(rows))
    }

    /// Number of entries.
    pub async fn len(&self, pid: &Pid, scope: Scope) -> StoreResult<u64> {
        self.store
            .dbs()
            .timeline
            .zcard(&keys::timeline_key(pid, scope))
            .await
    }

    /// Drops the whole collection.
    pub async fn clear(&self, pid: &Pid, scope: Scope) -> StoreResult<bool> {
        self.store
            .dbs()
            .timeline
            .del(&keys::timeline_key(pid, scope))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(n: i64) -> Score {
        Score::from_nanos(n)
    }

    async fn seeded() -> (Store, Pid) {
        let store = Store::in_memory();
        let pid = Pid::new("alice");
        for (id, score) in [("a", 10), ("b", 20), ("c", 30)] {
            store
                .timelines()
                .insert_if_absent(&pid, Scope::Curated, &ItemId::new(id), s(score))
                .await
                .unwrap();
        }
        (store, pid)
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_noop_when_present() {
        let (store, pid) = seeded().await;
        let t = store.timelines();
        assert!(!t
            .insert_if_absent(&pid, Scope::Curated, &ItemId::new("a"), s(99))
            .await
            .unwrap());
        assert_eq!(
            t.score_of(&pid, Scope::Curated, &ItemId::new("a")).await.unwrap(),
            Some(s(10))
        );
    }

    #[tokio::test]
    async fn test_scopes_are_separate() {
        let (store, pid) = seeded().await;
        let t = store.timelines();
        assert!(!t.contains(&pid, Scope::Suggested, &ItemId::new("a")).await.unwrap());
        assert_eq!(t.len(&pid, Scope::Suggested).await.unwrap(), 0);
        assert_eq!(t.len(&pid, Scope::Curated).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_ranges_honor_exclusive_bounds() {
        let (store, pid) = seeded().await;
        let t = store.timelines();

        let down = t
            .range_descending(
                &pid,
                Scope::Curated,
                ScoreBound::Exclusive(s(20)),
                ScoreBound::Unbounded,
                None,
            )
            .await
            .unwrap();
        assert_eq!(down, vec![TimelineEntry::new(ItemId::new("a"), s(10))]);

        let up = t
            .range_ascending(
                &pid,
                Scope::Curated,
                ScoreBound::Inclusive(s(20)),
                ScoreBound::Unbounded,
                Some(1),
            )
            .await
            .unwrap();
        assert_eq!(up, vec![TimelineEntry::new(ItemId::new("b"), s(20))]);
    }

    #[tokio::test]
    async fn test_remove_and_all() {
        let (store, pid) = seeded().await;
        let t = store.timelines();
        assert!(t.remove(&pid, Scope::Curated, &ItemId::new("b")).await.unwrap());
        assert!(!t.remove(&pid, Scope::Curated, &ItemId::new("b")).await.unwrap());

        let ids: Vec<_> = t
            .all(&pid, Scope::Curated)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.item_id)
            .collect();
        assert_eq!(ids, vec![ItemId::new("a"), ItemId::new("c")]);
    }
}
