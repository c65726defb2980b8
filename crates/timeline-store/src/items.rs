//! Item record store.
//!
//! Items are stored whole as JSON under `item:<id>` in the item database.
//! Timelines and attribution maps only ever hold the identifier.

use std::time::Duration;

use timeline_core::{Item, ItemId, keys};

use crate::anomaly::Anomaly;
use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Item record operations for the store.
#[derive(Debug, Clone, Copy)]
pub struct ItemRecords<'a> {
    store: &'a Store,
}

impl<'a> ItemRecords<'a> {
    /// Create a new item records instance.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Writes the full item. A non-zero `ttl` makes the record expire; zero or
    /// `None` makes it permanent.
    pub async fn put(&self, item: &Item, ttl: Option<Duration>) -> StoreResult<()> {
        let mut item = item.clone();
        item.sanitize();

        let key = keys::item_key(&item.id);
        let json = serde_json::to_string(&item)?;
        let db = &self.store.dbs().item;
        db.set(&key, &json).await?;

        if let Some(ttl) = ttl.filter(|t| !t.is_zero()) {
            if !db.expire(&key, ttl).await? {
                self.store.report(Anomaly::ExpiryFailed { key: key.clone() });
            }
            tracing::debug!(item_id = %item.id, ttl_secs = ttl.as_secs(), "Stored temporary item");
        } else {
            tracing::debug!(item_id = %item.id, "Stored item");
        }
        Ok(())
    }

    /// Loads an item.
    ///
    /// Returns `ItemNotFound` if absent or expired and `MalformedRecord` if the
    /// stored JSON does not decode.
    pub async fn get(&self, id: &ItemId) -> StoreResult<Item> {
        self.find(id)
            .await?
            .ok_or_else(|| StoreError::ItemNotFound(id.clone()))
    }

    /// Loads an item, treating absence as `None`.
    pub async fn find(&self, id: &ItemId) -> StoreResult<Option<Item>> {
        let key = keys::item_key(id);
        let Some(json) = self.store.dbs().item.get(&key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| StoreError::MalformedRecord {
                key,
                reason: e.to_string(),
            })
    }

    /// True if a live record exists.
    pub async fn exists(&self, id: &ItemId) -> StoreResult<bool> {
        self.store.dbs().item.exists(&keys::item_key(id)).await
    }

    /// Overwrites an existing record, keeping its id. Clears any expiry.
    pub async fn update(&self, item: &Item) -> StoreResult<()> {
        if !self.exists(&item.id).await? {
            return Err(StoreError::ItemNotFound(item.id.clone()));
        }
        let json = serde_json::to_string(item)?;
        self.store
            .dbs()
            .item
            .set(&keys::item_key(&item.id), &json)
            .await?;
        tracing::debug!(item_id = %item.id, "Updated item");
        Ok(())
    }

    /// Cancels any expiry on the record. Returns false if the record is gone.
    pub async fn persist(&self, id: &ItemId) -> StoreResult<bool> {
        self.store.dbs().item.persist(&keys::item_key(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use timeline_core::{ManualClock, Pid};

    use crate::store::Databases;

    fn item(id: &str) -> Item {
        Item {
            id: ItemId::new(id),
            pid: Pid::new("alice"),
            text: "  hello  ".into(),
            link: String::new(),
            media: String::new(),
            image: String::new(),
            added: 1_000,
            event: 0,
            duration: 0,
        }
    }

    #[tokio::test]
    async fn test_put_get_sanitizes() {
        let store = Store::in_memory();
        store.items().put(&item("i1"), None).await.unwrap();

        let loaded = store.items().get(&ItemId::new("I1")).await.unwrap();
        assert_eq!(loaded.text, "hello");
        assert!(store.items().exists(&ItemId::new("i1")).await.unwrap());
    }

    #[test]
    fn test_update_overwrites_in_place() {
        tokio_test::block_on(async {
            let store = Store::in_memory();
            store.items().put(&item("i1"), None).await.unwrap();

            let mut backfilled = item("i1");
            backfilled.image = "https://img.example/1.png".into();
            store.items().update(&backfilled).await.unwrap();

            let loaded = store.items().get(&ItemId::new("i1")).await.unwrap();
            assert_eq!(loaded.image, "https://img.example/1.png");
        });
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = Store::in_memory();
        let err = store.items().get(&ItemId::new("nope")).await.unwrap_err();
        assert!(matches!(err, StoreError::ItemNotFound(_)));
        assert!(store.items().find(&ItemId::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_record() {
        let store = Store::in_memory();
        store.dbs().item.set("item:bad", "{not json").await.unwrap();
        let err = store.items().get(&ItemId::new("bad")).await.unwrap_err();
        assert!(matches!(err, StoreError::MalformedRecord { .. }));
    }

    #[tokio::test]
    async fn test_ttl_and_persist() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Store::from_backends(Databases::in_memory_with_clock(clock.clone()));

        store
            .items()
            .put(&item("tmp"), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        clock.advance(30_000_000_000);
        assert!(store.items().persist(&ItemId::new("tmp")).await.unwrap());
        clock.advance(60_000_000_000);
        assert!(store.items().exists(&ItemId::new("tmp")).await.unwrap());

        store
            .items()
            .put(&item("gone"), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        clock.advance(2_000_000_000);
        assert!(!store.items().exists(&ItemId::new("gone")).await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_permanent() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Store::from_backends(Databases::in_memory_with_clock(clock.clone()));
        store
            .items()
            .put(&item("p"), Some(Duration::ZERO))
            .await
            .unwrap();
        clock.advance(i64::MAX / 2);
        assert!(store.items().exists(&ItemId::new("p")).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_requires_existing() {
        let store = Store::in_memory();
        let mut it = item("u1");
        assert!(store.items().update(&it).await.unwrap_err().is_not_found());

        store.items().put(&it, None).await.unwrap();
        it.image = "https://img".into();
        store.items().update(&it).await.unwrap();
        assert_eq!(
            store.items().get(&it.id).await.unwrap().image,
            "https://img"
        );
    }
}
