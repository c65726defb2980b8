//! Range query engine.
//!
//! Reconstructs a window of a timeline around a pivot instant and hydrates it
//! into display rows. Reads only; nothing here mutates state.
//!
//! Window order is newest first throughout: the forward slice (scores at or
//! above the pivot) is reversed so its newest entry leads, and the backward
//! slice (scores below the pivot) follows it.

use std::collections::HashSet;

use timeline_core::{Item, ItemId, Pid, Score, Scope, TimelineEntry, TimelineItem};

use crate::anomaly::Anomaly;
use crate::backend::ScoreBound;
use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Windowed timeline reads for the store.
#[derive(Debug, Clone, Copy)]
pub struct RangeQueries<'a> {
    store: &'a Store,
}

impl<'a> RangeQueries<'a> {
    /// Create a new range queries instance.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Entries around `pivot`, newest first, without hydration.
    ///
    /// Up to `after` entries scored at or above the pivot, then up to
    /// `before + 1` entries below it. The backward scan excludes the pivot
    /// score whenever the forward scan returned anything, so an entry sitting
    /// exactly on the pivot is never counted twice.
    pub async fn window_entries(
        &self,
        pid: &Pid,
        scope: Scope,
        pivot: Score,
        before: usize,
        after: usize,
    ) -> StoreResult<Vec<TimelineEntry>> {
        let timelines = self.store.timelines();

        let mut window = if after > 0 {
            let mut forward = timelines
                .range_ascending(
                    pid,
                    scope,
                    ScoreBound::Inclusive(pivot),
                    ScoreBound::Unbounded,
                    Some(after),
                )
                .await?;
            forward.reverse();
            forward
        } else {
            Vec::new()
        };

        let upper = if window.is_empty() {
            ScoreBound::Inclusive(pivot)
        } else {
            ScoreBound::Exclusive(pivot)
        };
        let backward = timelines
            .range_descending(
                pid,
                scope,
                upper,
                ScoreBound::Unbounded,
                Some(before.saturating_add(1)),
            )
            .await?;

        // The scans are separate round trips; an entry re-scored between them
        // could show up in both.
        let mut seen: HashSet<ItemId> = window.iter().map(|e| e.item_id.clone()).collect();
        window.extend(
            backward
                .into_iter()
                .filter(|e| seen.insert(e.item_id.clone())),
        );
        Ok(window)
    }

    /// Hydrated window around `pivot`. See [`Self::window_entries`].
    ///
    /// Entries whose item record is missing or undecodable are skipped and
    /// reported as anomalies.
    pub async fn window_around(
        &self,
        pid: &Pid,
        scope: Scope,
        pivot: Score,
        before: usize,
        after: usize,
    ) -> StoreResult<Vec<TimelineItem>> {
        let entries = self
            .window_entries(pid, scope, pivot, before, after)
            .await?;

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(item) = self.load(&entry.item_id).await? else {
                continue;
            };
            rows.push(self.format_item(item, entry.score, pid, scope).await?);
        }

        tracing::debug!(
            pid = %pid,
            scope = %scope,
            pivot = %pivot,
            rows = rows.len(),
            "Window query"
        );
        Ok(rows)
    }

    /// `item` as it appears in `pid`'s `scope` timeline. The score is zero if
    /// the item is not there.
    pub async fn item_in_timeline(
        &self,
        item: &Item,
        pid: &Pid,
        scope: Scope,
    ) -> StoreResult<TimelineItem> {
        let score = self
            .store
            .timelines()
            .score_of(pid, scope, &item.id)
            .await?
            .unwrap_or_default();
        self.format_item(item.clone(), score, pid, scope).await
    }

    /// Builds the display row for `item` at `score` in `pid`'s timeline.
    ///
    /// The author is always attached. In the suggested scope the recorded
    /// source becomes the "via" when it is neither the author nor `pid`.
    pub async fn format_item(
        &self,
        item: Item,
        score: Score,
        pid: &Pid,
        scope: Scope,
    ) -> StoreResult<TimelineItem> {
        let source = match scope {
            Scope::Suggested => self.store.attributions().get(pid, &item.id).await?,
            Scope::Curated => None,
        };

        let directory = self.store.directory();
        let author = directory.brief_profile(&item.pid).await?;
        let via = match &source {
            Some(src) if *src != item.pid && src != pid => Some(directory.brief_profile(src).await?),
            _ => None,
        };

        Ok(TimelineItem {
            item,
            ts: score,
            source,
            author,
            via,
        })
    }

    async fn load(&self, item_id: &ItemId) -> StoreResult<Option<Item>> {
        match self.store.items().find(item_id).await {
            Ok(Some(item)) => Ok(Some(item)),
            Ok(None) => {
                self.store.report(Anomaly::MissingItem {
                    item_id: item_id.clone(),
                    context: "window",
                });
                Ok(None)
            }
            Err(StoreError::MalformedRecord { key, reason }) => {
                self.store.report(Anomaly::MalformedRecord { key, reason });
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
