//! Fan-out engine.
//!
//! Pushes items into, and pulls them out of, followers' suggested timelines.
//! Every insert records who caused it; every removal is guarded by that
//! record, so an item that reached a follower through another path survives.
//!
//! Loops are sequential and not transactional. A backend failure aborts the
//! loop and is returned; callers re-drive the whole operation, which is safe
//! because inserts are insert-if-absent and removals are guarded. A failure
//! confined to one item (missing or undecodable record) is reported as an
//! [`Anomaly`] and the loop moves on.

use serde::Serialize;
use timeline_core::{Item, ItemId, Pid, Score, Scope, keys};

use crate::anomaly::Anomaly;
use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Tally of one propagation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    /// Followers (or curated entries, for bulk copy/removal) visited.
    pub visited: usize,
    /// Entries newly added to a suggested timeline.
    pub inserted: usize,
    /// Entries removed from a suggested timeline.
    pub removed: usize,
    /// Removed entries immediately re-attributed to another followed profile.
    pub rehomed: usize,
    /// Entries left as they were (already present, or owned by another source).
    pub unchanged: usize,
    /// Entries skipped because they would loop back to their author.
    pub skipped: usize,
    /// Entries abandoned because of an isolated failure.
    pub failed: usize,
}

impl FanOutReport {
    fn record_removal(&mut self, outcome: &Removal) {
        match outcome {
            Removal::Removed => self.removed += 1,
            Removal::Rehomed(_) => self.rehomed += 1,
            Removal::Kept | Removal::Absent => self.unchanged += 1,
        }
    }
}

/// Outcome of one attribution-guarded removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The entry was attributed to the caller's source and is gone.
    Removed,
    /// The entry was removed and re-added on behalf of another followed
    /// profile that still curates it.
    Rehomed(Pid),
    /// The entry is attributed to a different source and was left alone.
    Kept,
    /// The entry was not in the suggested timeline.
    Absent,
}

/// Follower propagation for the store.
#[derive(Debug, Clone, Copy)]
pub struct FanOut<'a> {
    store: &'a Store,
}

impl<'a> FanOut<'a> {
    /// Create a new fan-out instance.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    // ==================== Single-follower operations ====================

    /// Adds `item_id` to `follower`'s suggested timeline attributed to
    /// `source`, unless it is already there. The first source wins.
    ///
    /// An entry that is already present without an attribution record (left
    /// by a failed earlier call) takes `source` as its attribution.
    pub async fn insert_attributed(
        &self,
        follower: &Pid,
        item_id: &ItemId,
        score: Score,
        source: &Pid,
    ) -> StoreResult<bool> {
        let attributions = self.store.attributions();
        let inserted = self
            .store
            .timelines()
            .insert_if_absent(follower, Scope::Suggested, item_id, score)
            .await?;
        if inserted {
            attributions.set(follower, item_id, source).await?;
            tracing::debug!(
                follower = %follower,
                item_id = %item_id,
                source = %source,
                score = %score,
                "Attributed insert"
            );
        } else if attributions.get(follower, item_id).await?.is_none() {
            attributions.set(follower, item_id, source).await?;
            tracing::debug!(
                follower = %follower,
                item_id = %item_id,
                source = %source,
                "Restored missing attribution"
            );
        }
        Ok(inserted)
    }

    /// Removes `item_id` from `follower`'s suggested timeline only if it is
    /// attributed to `source`.
    ///
    /// After a removal the follower's remaining follows are checked for
    /// another profile that still curates the item; the first one found
    /// re-adds it under its own attribution.
    pub async fn remove_attributed(
        &self,
        follower: &Pid,
        item_id: &ItemId,
        source: &Pid,
    ) -> StoreResult<Removal> {
        let attributions = self.store.attributions();
        let timelines = self.store.timelines();

        match attributions.get(follower, item_id).await? {
            Some(current) if current == *source => {
                timelines
                    .remove(follower, Scope::Suggested, item_id)
                    .await?;
                attributions.delete(follower, item_id).await?;
                tracing::debug!(
                    follower = %follower,
                    item_id = %item_id,
                    source = %source,
                    "Attributed remove"
                );

                Ok(match self.rehome(follower, item_id, source).await? {
                    Some(via) => Removal::Rehomed(via),
                    None => Removal::Removed,
                })
            }
            Some(_) => Ok(Removal::Kept),
            None => {
                if timelines
                    .contains(follower, Scope::Suggested, item_id)
                    .await?
                {
                    self.store.report(Anomaly::StaleAttribution {
                        pid: follower.clone(),
                        scope: Scope::Suggested,
                        item_id: item_id.clone(),
                    });
                }
                Ok(Removal::Absent)
            }
        }
    }

    /// Finds another followed profile that curates `item_id` and re-adds the
    /// item on its behalf at that profile's score.
    async fn rehome(
        &self,
        follower: &Pid,
        item_id: &ItemId,
        excluded: &Pid,
    ) -> StoreResult<Option<Pid>> {
        let timelines = self.store.timelines();

        for candidate in self.store.graph().following(follower).await? {
            if candidate == *excluded || candidate == *follower {
                continue;
            }
            let Some(score) = timelines
                .score_of(&candidate, Scope::Curated, item_id)
                .await?
            else {
                continue;
            };

            let Some(author) = self.author_of(item_id, "rehome").await? else {
                return Ok(None);
            };
            if author == *follower {
                return Ok(None);
            }

            if self
                .insert_attributed(follower, item_id, score, &candidate)
                .await?
            {
                tracing::debug!(
                    follower = %follower,
                    item_id = %item_id,
                    via = %candidate,
                    "Re-homed suggested entry"
                );
                return Ok(Some(candidate));
            }
            return Ok(None);
        }
        Ok(None)
    }

    /// Publisher of `item_id`, or `None` (with an anomaly) if the record is
    /// missing or undecodable.
    async fn author_of(&self, item_id: &ItemId, context: &'static str) -> StoreResult<Option<Pid>> {
        match self.store.items().find(item_id).await {
            Ok(Some(item)) => Ok(Some(item.pid)),
            Ok(None) => {
                self.store.report(Anomaly::MissingItem {
                    item_id: item_id.clone(),
                    context,
                });
                Ok(None)
            }
            Err(StoreError::MalformedRecord { key, reason }) => {
                self.store
                    .report(Anomaly::MalformedRecord { key, reason });
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Propagates if the backend failed, otherwise reports and counts.
    fn isolate(
        &self,
        err: StoreError,
        follower: &Pid,
        report: &mut FanOutReport,
    ) -> StoreResult<()> {
        if err.is_backend_unavailable() {
            return Err(err);
        }
        let anomaly = match err {
            StoreError::ItemNotFound(item_id) => Anomaly::MissingItem {
                item_id,
                context: "fan-out",
            },
            StoreError::MalformedRecord { key, reason } => Anomaly::MalformedRecord { key, reason },
            other => Anomaly::MalformedRecord {
                key: keys::timeline_key(follower, Scope::Suggested),
                reason: other.to_string(),
            },
        };
        self.store.report(anomaly);
        report.failed += 1;
        Ok(())
    }

    // ==================== Follower-wide operations ====================

    /// Pushes `item` into the suggested timeline of every follower of
    /// `publisher` except the item's author.
    pub async fn fan_out_insert(
        &self,
        publisher: &Pid,
        item: &Item,
        score: Score,
    ) -> StoreResult<FanOutReport> {
        let followers = self.store.graph().followers(publisher).await?;
        let mut report = FanOutReport {
            visited: followers.len(),
            ..FanOutReport::default()
        };

        for follower in &followers {
            if *follower == item.pid {
                report.skipped += 1;
                continue;
            }
            match self
                .insert_attributed(follower, &item.id, score, publisher)
                .await
            {
                Ok(true) => report.inserted += 1,
                Ok(false) => report.unchanged += 1,
                Err(e) => self.isolate(e, follower, &mut report)?,
            }
        }

        tracing::info!(
            publisher = %publisher,
            item_id = %item.id,
            followers = report.visited,
            inserted = report.inserted,
            "Fan-out insert complete"
        );
        Ok(report)
    }

    /// Pulls `item_id` out of every follower's suggested timeline where
    /// `publisher` is the recorded source.
    pub async fn fan_out_remove(
        &self,
        publisher: &Pid,
        item_id: &ItemId,
    ) -> StoreResult<FanOutReport> {
        let followers = self.store.graph().followers(publisher).await?;
        let mut report = FanOutReport {
            visited: followers.len(),
            ..FanOutReport::default()
        };

        for follower in &followers {
            match self.remove_attributed(follower, item_id, publisher).await {
                Ok(outcome) => report.record_removal(&outcome),
                Err(e) => self.isolate(e, follower, &mut report)?,
            }
        }

        tracing::info!(
            publisher = %publisher,
            item_id = %item_id,
            followers = report.visited,
            removed = report.removed,
            rehomed = report.rehomed,
            "Fan-out remove complete"
        );
        Ok(report)
    }

    /// Copies `target`'s whole curated timeline into `follower`'s suggested
    /// timeline, attributed to `target`. Items authored by `follower` are
    /// skipped.
    pub async fn copy_timeline(&self, follower: &Pid, target: &Pid) -> StoreResult<FanOutReport> {
        let entries = self.store.timelines().all(target, Scope::Curated).await?;
        let mut report = FanOutReport {
            visited: entries.len(),
            ..FanOutReport::default()
        };

        for entry in &entries {
            let Some(author) = self.author_of(&entry.item_id, "follow").await? else {
                report.failed += 1;
                continue;
            };
            if author == *follower {
                report.skipped += 1;
                continue;
            }
            match self
                .insert_attributed(follower, &entry.item_id, entry.score, target)
                .await
            {
                Ok(true) => report.inserted += 1,
                Ok(false) => report.unchanged += 1,
                Err(e) => self.isolate(e, follower, &mut report)?,
            }
        }

        tracing::info!(
            follower = %follower,
            target = %target,
            entries = report.visited,
            inserted = report.inserted,
            "Bulk copy complete"
        );
        Ok(report)
    }

    /// Removes every item of `target`'s curated timeline from `follower`'s
    /// suggested timeline where `target` is the recorded source.
    pub async fn remove_timeline(&self, follower: &Pid, target: &Pid) -> StoreResult<FanOutReport> {
        let entries = self.store.timelines().all(target, Scope::Curated).await?;
        let mut report = FanOutReport {
            visited: entries.len(),
            ..FanOutReport::default()
        };

        for entry in &entries {
            match self
                .remove_attributed(follower, &entry.item_id, target)
                .await
            {
                Ok(outcome) => report.record_removal(&outcome),
                Err(e) => self.isolate(e, follower, &mut report)?,
            }
        }

        tracing::info!(
            follower = %follower,
            target = %target,
            entries = report.visited,
            removed = report.removed,
            rehomed = report.rehomed,
            "Bulk removal complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::anomaly::RecordingSink;

    fn item(id: &str, author: &str) -> Item {
        Item {
            id: ItemId::new(id),
            pid: Pid::new(author),
            text: String::new(),
            link: String::new(),
            media: String::new(),
            image: String::new(),
            added: 100,
            event: 0,
            duration: 0,
        }
    }

    async fn curate(store: &Store, pid: &str, it: &Item, score: i64) {
        store.items().put(it, None).await.unwrap();
        store
            .timelines()
            .insert_if_absent(&Pid::new(pid), Scope::Curated, &it.id, Score::from_nanos(score))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_source_wins() {
        let store = Store::in_memory();
        let f = store.fanout();
        let (p, a, b) = (Pid::new("p"), Pid::new("a"), Pid::new("b"));
        let x = ItemId::new("x");

        assert!(f.insert_attributed(&p, &x, Score::from_nanos(1), &a).await.unwrap());
        assert!(!f.insert_attributed(&p, &x, Score::from_nanos(2), &b).await.unwrap());

        assert_eq!(store.attributions().get(&p, &x).await.unwrap(), Some(a));
        assert_eq!(
            store.timelines().score_of(&p, Scope::Suggested, &x).await.unwrap(),
            Some(Score::from_nanos(1))
        );
    }

    #[tokio::test]
    async fn test_guarded_remove_keeps_foreign_source() {
        let store = Store::in_memory();
        let f = store.fanout();
        let (p, a, b) = (Pid::new("p"), Pid::new("a"), Pid::new("b"));
        let x = ItemId::new("x");

        f.insert_attributed(&p, &x, Score::from_nanos(1), &b).await.unwrap();
        assert_eq!(f.remove_attributed(&p, &x, &a).await.unwrap(), Removal::Kept);
        assert!(store.timelines().contains(&p, Scope::Suggested, &x).await.unwrap());

        assert_eq!(f.remove_attributed(&p, &x, &b).await.unwrap(), Removal::Removed);
        assert!(!store.timelines().contains(&p, Scope::Suggested, &x).await.unwrap());
        assert_eq!(store.attributions().get(&p, &x).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_rehomes_to_other_curator() {
        let store = Store::in_memory();
        let (p, a, b) = (Pid::new("p"), Pid::new("a"), Pid::new("b"));
        let x = item("x", "author");
        curate(&store, "a", &x, 10).await;
        curate(&store, "b", &x, 20).await;
        store.graph().follow(&p, &a).await.unwrap();
        store.graph().follow(&p, &b).await.unwrap();

        let f = store.fanout();
        f.insert_attributed(&p, &x.id, Score::from_nanos(10), &a).await.unwrap();

        assert_eq!(
            f.remove_attributed(&p, &x.id, &a).await.unwrap(),
            Removal::Rehomed(b.clone())
        );
        assert_eq!(store.attributions().get(&p, &x.id).await.unwrap(), Some(b));
        assert_eq!(
            store.timelines().score_of(&p, Scope::Suggested, &x.id).await.unwrap(),
            Some(Score::from_nanos(20))
        );
    }

    #[tokio::test]
    async fn test_fan_out_insert_skips_author() {
        let store = Store::in_memory();
        let (author, promoter, fan) = (Pid::new("author"), Pid::new("promoter"), Pid::new("fan"));
        store.graph().follow(&author, &promoter).await.unwrap();
        store.graph().follow(&fan, &promoter).await.unwrap();

        let x = item("x", "author");
        let report = store
            .fanout()
            .fan_out_insert(&promoter, &x, Score::from_nanos(5))
            .await
            .unwrap();

        assert_eq!(report.visited, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 1);
        assert!(!store.timelines().contains(&author, Scope::Suggested, &x.id).await.unwrap());
        assert!(store.timelines().contains(&fan, Scope::Suggested, &x.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_timeline_reports_missing_items() {
        let sink = Arc::new(RecordingSink::new());
        let store = Store::in_memory().with_anomaly_sink(sink.clone());
        let (p, a) = (Pid::new("p"), Pid::new("a"));

        curate(&store, "a", &item("kept", "a"), 1).await;
        curate(&store, "a", &item("own", "p"), 2).await;
        store
            .timelines()
            .insert_if_absent(&a, Scope::Curated, &ItemId::new("ghost"), Score::from_nanos(3))
            .await
            .unwrap();

        let report = store.fanout().copy_timeline(&p, &a).await.unwrap();

        assert_eq!(report.visited, 3);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(
            sink.anomalies(),
            vec![Anomaly::MissingItem {
                item_id: ItemId::new("ghost"),
                context: "follow",
            }]
        );
    }

    #[tokio::test]
    async fn test_unattributed_entry_is_reported() {
        let sink = Arc::new(RecordingSink::new());
        let store = Store::in_memory().with_anomaly_sink(sink.clone());
        let p = Pid::new("p");
        let x = ItemId::new("x");
        store
            .timelines()
            .insert_if_absent(&p, Scope::Suggested, &x, Score::from_nanos(1))
            .await
            .unwrap();

        let outcome = store
            .fanout()
            .remove_attributed(&p, &x, &Pid::new("a"))
            .await
            .unwrap();

        assert_eq!(outcome, Removal::Absent);
        assert!(matches!(sink.anomalies()[..], [Anomaly::StaleAttribution { .. }]));
    }
}
