//! Image back-fill queue.
//!
//! Items published with a link but no image are queued in the profile
//! database. A back-fill worker drains the queue, resolves an image and
//! writes the record back through [`crate::items::ItemRecords::update`].

use timeline_core::{Item, ItemId, keys};

use crate::anomaly::Anomaly;
use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Image back-fill operations for the store.
#[derive(Debug, Clone, Copy)]
pub struct ImageQueue<'a> {
    store: &'a Store,
}

impl<'a> ImageQueue<'a> {
    /// Create a new image queue instance.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Queues `item_id`. Returns false if it was already queued.
    pub async fn enqueue(&self, item_id: &ItemId) -> StoreResult<bool> {
        self.store
            .dbs()
            .profile
            .sadd(keys::ITEMS_NEEDING_IMAGES, item_id.as_str())
            .await
    }

    pub async fn pending(&self) -> StoreResult<u64> {
        self.store
            .dbs()
            .profile
            .scard(keys::ITEMS_NEEDING_IMAGES)
            .await
    }

    /// Takes up to `max` queued ids off the queue and returns their records.
    ///
    /// Ids whose record is gone or undecodable are dropped from the queue and
    /// reported, so the result may hold fewer than `max` items even while the
    /// queue is non-empty.
    pub async fn grab_items_needing_images(&self, max: usize) -> StoreResult<Vec<Item>> {
        let db = &self.store.dbs().profile;
        let items = self.store.items();

        let mut grabbed = Vec::new();
        for _ in 0..max {
            let Some(member) = db.spop(keys::ITEMS_NEEDING_IMAGES).await? else {
                break;
            };
            let item_id = ItemId::new(member);
            match items.find(&item_id).await {
                Ok(Some(item)) => grabbed.push(item),
                Ok(None) => self.store.report(Anomaly::MissingItem {
                    item_id,
                    context: "image back-fill",
                }),
                Err(StoreError::MalformedRecord { key, reason }) => {
                    self.store.report(Anomaly::MalformedRecord { key, reason })
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(grabbed = grabbed.len(), "Grabbed items needing images");
        Ok(grabbed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::anomaly::RecordingSink;
    use timeline_core::NewItem;

    #[tokio::test]
    async fn test_grab_respects_max() {
        let store = Store::in_memory();
        for n in 0..3 {
            store
                .lifecycle()
                .publish(
                    NewItem::new("alice").link(format!("https://example.com/{}", n)),
                    None,
                )
                .await
                .unwrap();
        }
        let queue = store.images();
        assert_eq!(queue.pending().await.unwrap(), 3);

        assert_eq!(queue.grab_items_needing_images(2).await.unwrap().len(), 2);
        assert_eq!(queue.grab_items_needing_images(2).await.unwrap().len(), 1);
        assert!(queue.grab_items_needing_images(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_items_with_image_are_not_queued() {
        let store = Store::in_memory();
        store
            .lifecycle()
            .publish(
                NewItem::new("alice")
                    .link("https://example.com")
                    .image("https://example.com/a.png"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(store.images().pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_record_is_reported() {
        let sink = Arc::new(RecordingSink::new());
        let store = Store::in_memory().with_anomaly_sink(sink.clone());
        store.images().enqueue(&ItemId::new("gone")).await.unwrap();

        assert!(store.images().grab_items_needing_images(5).await.unwrap().is_empty());
        assert_eq!(
            sink.take(),
            vec![Anomaly::MissingItem {
                item_id: ItemId::new("gone"),
                context: "image back-fill",
            }]
        );
        assert_eq!(store.images().pending().await.unwrap(), 0);
    }
}
