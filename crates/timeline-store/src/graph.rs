//! Follow graph.
//!
//! Two independently scored edge sets in the profile database:
//! - `<pid>:following` holds the profiles `pid` follows
//! - `<pid>:followers` holds the profiles following `pid`
//!
//! Both scores are the instant the edge was written. Writers always touch
//! `following` first and `followers` second, so a crash in between leaves a
//! following-only edge; removal uses the same order and leaves a
//! followers-only edge. [`crate::reconcile`] relies on that direction.

use timeline_core::{Pid, Score, keys};

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Follow-edge operations for the store.
#[derive(Debug, Clone, Copy)]
pub struct FollowGraph<'a> {
    store: &'a Store,
}

fn pids(rows: Vec<(String, Score)>) -> Vec<Pid> {
    rows.into_iter().map(|(member, _)| Pid::new(member)).collect()
}

impl<'a> FollowGraph<'a> {
    /// Create a new follow graph instance.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Makes `pid` follow `target`, writing `following` then `followers`.
    ///
    /// Re-following refreshes both scores. Returns the edge score.
    pub async fn follow(&self, pid: &Pid, target: &Pid) -> StoreResult<Score> {
        if pid == target {
            return Err(StoreError::InvalidInput(format!(
                "profile {} cannot follow itself",
                pid
            )));
        }
        let db = &self.store.dbs().profile;
        let score = Score::from_nanos(self.store.now_nanos());

        db.zadd(&keys::following_key(pid), target.as_str(), score)
            .await?;
        db.zadd(&keys::followers_key(target), pid.as_str(), score)
            .await?;

        tracing::debug!(pid = %pid, target = %target, "Follow edge written");
        Ok(score)
    }

    /// Removes both edges, `following` first. Returns true if `pid` was
    /// following `target`.
    pub async fn unfollow(&self, pid: &Pid, target: &Pid) -> StoreResult<bool> {
        let db = &self.store.dbs().profile;
        let was_following = db
            .zrem(&keys::following_key(pid), target.as_str())
            .await?;
        db.zrem(&keys::followers_key(target), pid.as_str()).await?;

        tracing::debug!(pid = %pid, target = %target, was_following, "Follow edge removed");
        Ok(was_following)
    }

    /// True if `pid` follows `target`, judged by `pid`'s following set.
    pub async fn is_following(&self, pid: &Pid, target: &Pid) -> StoreResult<bool> {
        Ok(self
            .store
            .dbs()
            .profile
            .zscore(&keys::following_key(pid), target.as_str())
            .await?
            .is_some())
    }

    /// True if `follower` appears in `pid`'s followers set.
    pub async fn has_follower(&self, pid: &Pid, follower: &Pid) -> StoreResult<bool> {
        Ok(self
            .store
            .dbs()
            .profile
            .zscore(&keys::followers_key(pid), follower.as_str())
            .await?
            .is_some())
    }

    /// Everyone following `pid`, oldest edge first.
    pub async fn followers(&self, pid: &Pid) -> StoreResult<Vec<Pid>> {
        Ok(pids(self.followers_page(pid, 0, None).await?))
    }

    /// Everyone `pid` follows, oldest edge first.
    pub async fn following(&self, pid: &Pid) -> StoreResult<Vec<Pid>> {
        Ok(pids(self.following_page(pid, 0, None).await?))
    }

    /// A page of followers with edge scores.
    pub async fn followers_page(
        &self,
        pid: &Pid,
        start: usize,
        count: Option<usize>,
    ) -> StoreResult<Vec<(String, Score)>> {
        self.store
            .dbs()
            .profile
            .zrange(&keys::followers_key(pid), start, count)
            .await
    }

    /// A page of followed profiles with edge scores.
    pub async fn following_page(
        &self,
        pid: &Pid,
        start: usize,
        count: Option<usize>,
    ) -> StoreResult<Vec<(String, Score)>> {
        self.store
            .dbs()
            .profile
            .zrange(&keys::following_key(pid), start, count)
            .await
    }

    pub async fn follower_count(&self, pid: &Pid) -> StoreResult<u64> {
        self.store
            .dbs()
            .profile
            .zcard(&keys::followers_key(pid))
            .await
    }

    pub async fn following_count(&self, pid: &Pid) -> StoreResult<u64> {
        self.store
            .dbs()
            .profile
            .zcard(&keys::following_key(pid))
            .await
    }

    /// Removes every edge touching `pid`, in both directions.
    pub async fn detach(&self, pid: &Pid) -> StoreResult<()> {
        let db = &self.store.dbs().profile;
        for target in self.following(pid).await? {
            db.zrem(&keys::followers_key(&target), pid.as_str()).await?;
        }
        db.del(&keys::following_key(pid)).await?;

        for follower in self.followers(pid).await? {
            db.zrem(&keys::following_key(&follower), pid.as_str())
                .await?;
        }
        db.del(&keys::followers_key(pid)).await?;

        tracing::debug!(pid = %pid, "Detached from follow graph");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use timeline_core::ManualClock;

    #[tokio::test]
    async fn test_follow_writes_both_directions() {
        let store = Store::in_memory().with_clock(Arc::new(ManualClock::new(77)));
        let g = store.graph();
        let (bob, alice) = (Pid::new("bob"), Pid::new("alice"));

        assert_eq!(g.follow(&bob, &alice).await.unwrap(), Score::from_nanos(77));
        assert!(g.is_following(&bob, &alice).await.unwrap());
        assert!(g.has_follower(&alice, &bob).await.unwrap());
        assert!(!g.is_following(&alice, &bob).await.unwrap());
        assert_eq!(g.followers(&alice).await.unwrap(), vec![bob.clone()]);
        assert_eq!(g.following(&bob).await.unwrap(), vec![alice.clone()]);
    }

    #[tokio::test]
    async fn test_unfollow_removes_both_directions() {
        let store = Store::in_memory();
        let g = store.graph();
        let (bob, alice) = (Pid::new("bob"), Pid::new("alice"));

        g.follow(&bob, &alice).await.unwrap();
        assert!(g.unfollow(&bob, &alice).await.unwrap());
        assert!(!g.unfollow(&bob, &alice).await.unwrap());
        assert_eq!(g.follower_count(&alice).await.unwrap(), 0);
        assert_eq!(g.following_count(&bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_self_follow_rejected() {
        let store = Store::in_memory();
        let err = store
            .graph()
            .follow(&Pid::new("alice"), &Pid::new("ALICE"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_pages_are_ordered_by_edge_time() {
        let clock = Arc::new(ManualClock::new(1));
        let store = Store::in_memory().with_clock(clock.clone());
        let g = store.graph();
        let alice = Pid::new("alice");
        for name in ["zed", "amy", "kim"] {
            g.follow(&Pid::new(name), &alice).await.unwrap();
            clock.advance(1);
        }

        let page: Vec<_> = g
            .followers_page(&alice, 1, Some(2))
            .await
            .unwrap()
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        assert_eq!(page, ["amy", "kim"]);
    }

    #[tokio::test]
    async fn test_detach() {
        let store = Store::in_memory();
        let g = store.graph();
        let (a, b, c) = (Pid::new("a"), Pid::new("b"), Pid::new("c"));
        g.follow(&a, &b).await.unwrap();
        g.follow(&c, &a).await.unwrap();

        g.detach(&a).await.unwrap();

        assert!(g.followers(&b).await.unwrap().is_empty());
        assert!(g.following(&c).await.unwrap().is_empty());
        assert_eq!(g.following_count(&a).await.unwrap(), 0);
    }
}
