//! Lifecycle controller.
//!
//! Per profile an item is absent, curated, or suggested. This module owns the
//! transitions between those states and picks the score for each:
//!
//! - publish: new item, author's curated timeline, fan-out to followers
//! - promote: re-admit an existing item into a profile's curated timeline
//! - demote: drop it from a curated timeline and pull it back from followers
//! - follow / unfollow: bulk copy or bulk removal of a curated timeline
//!
//! Publish, promote and demote are safe to repeat after a partial failure.

use std::time::Duration;

use serde::Serialize;
use timeline_core::identity::derive_item_id;
use timeline_core::{
    Item, ItemId, NewItem, Pid, Score, Scope, keys, publish_score, stabilize_event,
};

use crate::anomaly::Anomaly;
use crate::error::{StoreError, StoreResult};
use crate::fanout::FanOutReport;
use crate::store::Store;

/// Result of publishing an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub item_id: ItemId,
    /// Score in the publisher's curated timeline.
    pub score: Score,
    /// True when the id already existed and the call became a promote.
    pub promoted: bool,
    pub fanout: FanOutReport,
}

/// Result of promoting an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Promoted {
    pub item_id: ItemId,
    /// Score in the promoter's curated timeline.
    pub score: Score,
    /// False when the item was already curated by the promoter.
    pub inserted: bool,
    pub fanout: FanOutReport,
}

/// Result of demoting an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Demoted {
    pub item_id: ItemId,
    /// False when the item was not in the demoter's curated timeline.
    pub removed: bool,
    pub fanout: FanOutReport,
}

/// Lifecycle operations for the store.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle<'a> {
    store: &'a Store,
}

impl<'a> Lifecycle<'a> {
    /// Create a new lifecycle instance.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Publishes a new item.
    ///
    /// If an item with the same id already exists this promotes it for the
    /// publisher instead. Otherwise the item is recorded, placed in the
    /// author's curated timeline and fanned out with the author as source.
    /// `ttl` makes the record temporary until something promotes it.
    pub async fn publish(&self, new: NewItem, ttl: Option<Duration>) -> StoreResult<Published> {
        let pid = new
            .pid
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| StoreError::InvalidInput("item has no publisher".to_string()))?;

        let item_id = new
            .id
            .clone()
            .unwrap_or_else(|| derive_item_id(&pid, &new.text, &new.link, new.event));

        if self.store.items().exists(&item_id).await? {
            tracing::debug!(item_id = %item_id, pid = %pid, "Item exists, promoting instead");
            let promoted = self.promote(&pid, &item_id).await?;
            return Ok(Published {
                item_id,
                score: promoted.score,
                promoted: true,
                fanout: promoted.fanout,
            });
        }

        let now = self.store.now_nanos();
        let event = new
            .event
            .map(|at| stabilize_event(Score::from_datetime(at).as_nanos(), now).as_nanos())
            .filter(|ns| *ns > 0)
            .unwrap_or(0);

        let mut item = Item {
            id: item_id,
            pid: pid.clone(),
            text: new.text,
            link: new.link,
            media: new.media,
            image: new.image,
            added: publish_score(now).as_nanos(),
            event,
            duration: new.duration,
        };
        item.sanitize();
        let score = item.default_score();

        self.store.items().put(&item, ttl).await?;
        self.store
            .timelines()
            .insert_if_absent(&pid, Scope::Curated, &item.id, score)
            .await?;

        if item.needs_image() {
            self.store.images().enqueue(&item.id).await?;
        }

        let fanout = self.store.fanout().fan_out_insert(&pid, &item, score).await?;

        tracing::info!(
            pid = %pid,
            item_id = %item.id,
            score = %score,
            event = item.is_event(),
            "Published item"
        );

        Ok(Published {
            item_id: item.id,
            score,
            promoted: false,
            fanout,
        })
    }

    /// Admits an existing item into `pid`'s curated timeline and fans it out
    /// with `pid` as source.
    ///
    /// Cancels any expiry on the record. Promoting an item already curated by
    /// `pid` keeps its score and re-drives the fan-out.
    pub async fn promote(&self, pid: &Pid, item_id: &ItemId) -> StoreResult<Promoted> {
        let items = self.store.items();
        let item = items.get(item_id).await?;

        if !items.persist(item_id).await? {
            self.store.report(Anomaly::ExpiryFailed {
                key: keys::item_key(item_id),
            });
        }

        let now = self.store.now_nanos();
        let fresh = if item.is_event() {
            stabilize_event(item.event, now)
        } else {
            publish_score(now)
        };

        let timelines = self.store.timelines();
        let inserted = timelines
            .insert_if_absent(pid, Scope::Curated, item_id, fresh)
            .await?;
        let score = if inserted {
            fresh
        } else {
            timelines
                .score_of(pid, Scope::Curated, item_id)
                .await?
                .unwrap_or(fresh)
        };

        let fanout = self.store.fanout().fan_out_insert(pid, &item, score).await?;

        tracing::info!(pid = %pid, item_id = %item_id, score = %score, inserted, "Promoted item");

        Ok(Promoted {
            item_id: item_id.clone(),
            score,
            inserted,
            fanout,
        })
    }

    /// Removes `item_id` from `pid`'s curated timeline and pulls it from the
    /// suggested timelines of followers who got it from `pid`.
    ///
    /// The item does not move into `pid`'s suggested timeline.
    pub async fn demote(&self, pid: &Pid, item_id: &ItemId) -> StoreResult<Demoted> {
        let removed = self
            .store
            .timelines()
            .remove(pid, Scope::Curated, item_id)
            .await?;
        let fanout = self.store.fanout().fan_out_remove(pid, item_id).await?;

        tracing::info!(pid = %pid, item_id = %item_id, removed, "Demoted item");

        Ok(Demoted {
            item_id: item_id.clone(),
            removed,
            fanout,
        })
    }

    /// Makes `pid` follow `target` and copies `target`'s curated timeline into
    /// `pid`'s suggested timeline.
    pub async fn follow(&self, pid: &Pid, target: &Pid) -> StoreResult<FanOutReport> {
        self.store.graph().follow(pid, target).await?;
        let report = self.store.fanout().copy_timeline(pid, target).await?;
        tracing::info!(pid = %pid, target = %target, copied = report.inserted, "Followed");
        Ok(report)
    }

    /// Makes `pid` stop following `target` and removes the items `target`
    /// contributed to `pid`'s suggested timeline.
    pub async fn unfollow(&self, pid: &Pid, target: &Pid) -> StoreResult<FanOutReport> {
        self.store.graph().unfollow(pid, target).await?;
        let report = self.store.fanout().remove_timeline(pid, target).await?;
        tracing::info!(pid = %pid, target = %target, removed = report.removed, "Unfollowed");
        Ok(report)
    }
}
