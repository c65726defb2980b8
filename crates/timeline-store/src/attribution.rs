//! Attribution map.
//!
//! For every item in a profile's suggested timeline, `<pid>:sources` records
//! the followed profile that put it there. Fields are item keys, values are
//! source pids.

use timeline_core::{ItemId, Pid, keys};

use crate::error::StoreResult;
use crate::store::Store;

/// Attribution operations for the store.
#[derive(Debug, Clone, Copy)]
pub struct Attributions<'a> {
    store: &'a Store,
}

impl<'a> Attributions<'a> {
    /// Create a new attributions instance.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Records `source` as the origin of `item_id` in `pid`'s suggested
    /// timeline, replacing any earlier record.
    pub async fn set(&self, pid: &Pid, item_id: &ItemId, source: &Pid) -> StoreResult<()> {
        self.store
            .dbs()
            .timeline
            .hset(&keys::sources_key(pid), &keys::item_key(item_id), source.as_str())
            .await
    }

    /// Source of `item_id` for `pid`, `None` if unattributed.
    pub async fn get(&self, pid: &Pid, item_id: &ItemId) -> StoreResult<Option<Pid>> {
        let source = self
            .store
            .dbs()
            .timeline
            .hget(&keys::sources_key(pid), &keys::item_key(item_id))
            .await?;
        Ok(source.filter(|s| !s.is_empty()).map(Pid::new))
    }

    /// Drops the record. Returns true if one existed.
    pub async fn delete(&self, pid: &Pid, item_id: &ItemId) -> StoreResult<bool> {
        self.store
            .dbs()
            .timeline
            .hdel(&keys::sources_key(pid), &keys::item_key(item_id))
            .await
    }

    /// Every record for `pid`.
    pub async fn all(&self, pid: &Pid) -> StoreResult<Vec<(ItemId, Pid)>> {
        let fields = self
            .store
            .dbs()
            .timeline
            .hgetall(&keys::sources_key(pid))
            .await?;
        Ok(fields
            .into_iter()
            .map(|(field, source)| (keys::item_id_from_key(&field), Pid::new(source)))
            .collect())
    }

    /// Drops the whole map.
    pub async fn clear(&self, pid: &Pid) -> StoreResult<bool> {
        self.store.dbs().timeline.del(&keys::sources_key(pid)).await
    }
}
