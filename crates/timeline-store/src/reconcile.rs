//! Follow-graph repair.
//!
//! Follow writes `following` before `followers` and unfollow removes them in
//! the same order, so a crash between the two writes leaves exactly one of
//! two shapes behind:
//!
//! - a `following` edge without its `followers` mirror (interrupted follow),
//!   completed by writing the mirror with the original edge score
//! - a `followers` edge without its `following` origin (interrupted
//!   unfollow), completed by removing it
//!
//! Self-edges and empty members are dropped and reported.
//!
//! Timelines are left alone: a follow interrupted before its bulk copy is
//! finished by calling follow again.

use serde::Serialize;
use timeline_core::{Pid, keys};

use crate::anomaly::Anomaly;
use crate::error::StoreResult;
use crate::store::Store;

/// What a reconciliation pass found and fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Edges examined across both directions.
    pub scanned: usize,
    /// `followers` mirrors written for orphaned `following` edges.
    pub completed: usize,
    /// Orphaned `followers` edges removed.
    pub removed: usize,
    /// Self-edges and empty members removed.
    pub malformed: usize,
}

/// Follow-graph reconciliation for the store.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    store: &'a Store,
}

impl<'a> Reconciler<'a> {
    /// Create a new reconciler instance.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Runs one full pass over every edge set.
    pub async fn run(&self) -> StoreResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        self.complete_follows(&mut report).await?;
        self.drop_orphaned_followers(&mut report).await?;

        tracing::info!(
            scanned = report.scanned,
            completed = report.completed,
            removed = report.removed,
            malformed = report.malformed,
            "Follow graph reconciled"
        );
        Ok(report)
    }

    async fn complete_follows(&self, report: &mut ReconcileReport) -> StoreResult<()> {
        let db = &self.store.dbs().profile;
        let mut edge_keys = db
            .keys_matching("", keys::following_key_suffix())
            .await?;
        edge_keys.sort();

        for key in edge_keys {
            let Some(follower) = keys::pid_from_following_key(&key) else {
                continue;
            };
            for (member, score) in db.zrange(&key, 0, None).await? {
                report.scanned += 1;
                let target = Pid::new(&member);
                if self.drop_malformed(&key, &member, &follower, &target).await? {
                    report.malformed += 1;
                    continue;
                }

                let mirror = keys::followers_key(&target);
                if db.zscore(&mirror, follower.as_str()).await?.is_none() {
                    db.zadd(&mirror, follower.as_str(), score).await?;
                    report.completed += 1;
                    tracing::debug!(follower = %follower, target = %target, "Completed follow edge");
                }
            }
        }
        Ok(())
    }

    async fn drop_orphaned_followers(&self, report: &mut ReconcileReport) -> StoreResult<()> {
        let db = &self.store.dbs().profile;
        let mut edge_keys = db
            .keys_matching("", keys::followers_key_suffix())
            .await?;
        edge_keys.sort();

        for key in edge_keys {
            let Some(target) = keys::pid_from_followers_key(&key) else {
                continue;
            };
            for (member, _) in db.zrange(&key, 0, None).await? {
                report.scanned += 1;
                let follower = Pid::new(&member);
                if self.drop_malformed(&key, &member, &target, &follower).await? {
                    report.malformed += 1;
                    continue;
                }

                let origin = keys::following_key(&follower);
                if db.zscore(&origin, target.as_str()).await?.is_none() {
                    db.zrem(&key, &member).await?;
                    report.removed += 1;
                    tracing::debug!(follower = %follower, target = %target, "Removed orphaned follower edge");
                }
            }
        }
        Ok(())
    }

    async fn drop_malformed(
        &self,
        key: &str,
        member: &str,
        owner: &Pid,
        other: &Pid,
    ) -> StoreResult<bool> {
        if !other.is_empty() && owner != other {
            return Ok(false);
        }
        self.store.dbs().profile.zrem(key, member).await?;
        self.store.report(Anomaly::MalformedEdge {
            key: key.to_string(),
            member: member.to_string(),
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::anomaly::RecordingSink;
    use timeline_core::Score;

    #[tokio::test]
    async fn test_completes_interrupted_follow() {
        let store = Store::in_memory();
        let db = &store.dbs().profile;
        db.zadd("bob:following", "alice", Score::from_nanos(5))
            .await
            .unwrap();

        let report = store.reconciler().run().await.unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(
            db.zscore("alice:followers", "bob").await.unwrap(),
            Some(Score::from_nanos(5))
        );
        assert!(store
            .graph()
            .has_follower(&Pid::new("alice"), &Pid::new("bob"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_drops_interrupted_unfollow() {
        let store = Store::in_memory();
        let db = &store.dbs().profile;
        db.zadd("alice:followers", "bob", Score::from_nanos(5))
            .await
            .unwrap();

        let report = store.reconciler().run().await.unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(store.graph().follower_count(&Pid::new("alice")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_consistent_graph_is_untouched() {
        let store = Store::in_memory();
        let g = store.graph();
        g.follow(&Pid::new("bob"), &Pid::new("alice")).await.unwrap();
        g.follow(&Pid::new("alice"), &Pid::new("bob")).await.unwrap();

        let report = store.reconciler().run().await.unwrap();

        assert_eq!(
            report,
            ReconcileReport {
                scanned: 4,
                ..ReconcileReport::default()
            }
        );
    }

    #[tokio::test]
    async fn test_self_edge_removed_and_reported() {
        let sink = Arc::new(RecordingSink::new());
        let store = Store::in_memory().with_anomaly_sink(sink.clone());
        store
            .dbs()
            .profile
            .zadd("carol:following", "carol", Score::from_nanos(1))
            .await
            .unwrap();

        let report = store.reconciler().run().await.unwrap();

        assert_eq!(report.malformed, 1);
        assert_eq!(report.completed, 0);
        assert_eq!(store.graph().following_count(&Pid::new("carol")).await.unwrap(), 0);
        assert_eq!(sink.anomalies().len(), 1);
    }
}
