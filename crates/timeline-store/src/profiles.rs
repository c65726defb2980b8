//! Profile directory.
//!
//! Profiles are hashes under `<pid>:info` in the profile database. Besides the
//! record itself this module keeps the profile-level sets in step: feed-driven
//! profiles, a parent's feeds, the flag counter and the suggested lists.
//!
//! Range queries only need the display subset, reached through the
//! [`ProfileDirectory`] seam so an embedder can resolve authors elsewhere.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use timeline_core::{
    BriefProfile, FollowingProfile, NewProfile, Pid, Profile, Scope, ScoredProfile, keys,
};

use crate::anomaly::Anomaly;
use crate::backend::Backend;
use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Hash fields a caller may write through [`Profiles::update_profile`].
pub const PROFILE_PROPERTIES: &[&str] = &[
    "name",
    "feedurl",
    "bio",
    "email",
    "parentpid",
    "joined",
    "location",
    "url",
    "profileimageurl",
    "profileimageurlhttps",
    "itemtype",
];

pub(crate) const PASSWORD_FIELD: &str = "pwdhash";

/// Resolves a profile id to its display record.
#[async_trait]
pub trait ProfileDirectory: Send + Sync + Debug {
    /// Display record for `pid`. Unknown profiles resolve to a record that
    /// carries only the pid.
    async fn brief_profile(&self, pid: &Pid) -> StoreResult<BriefProfile>;
}

/// Directory reading profile hashes straight from a backend.
#[derive(Debug, Clone)]
pub struct KvProfileDirectory {
    db: Arc<dyn Backend>,
}

impl KvProfileDirectory {
    pub fn new(db: Arc<dyn Backend>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProfileDirectory for KvProfileDirectory {
    async fn brief_profile(&self, pid: &Pid) -> StoreResult<BriefProfile> {
        let fields = self.db.hgetall(&keys::profile_key(pid)).await?;
        let mut brief = BriefProfile {
            pid: pid.clone(),
            ..BriefProfile::default()
        };
        for (field, value) in fields {
            match field.as_str() {
                "name" => brief.name = value,
                "profileimageurlhttps" => brief.image = value,
                _ => {}
            }
        }
        Ok(brief)
    }
}

fn hash_password(password: &str) -> StoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Password(format!("Failed to hash password: {}", e)))
}

fn is_valid_search(term: &str) -> bool {
    !term.is_empty() && term.chars().all(|c| c.is_ascii_alphanumeric() || c == '@')
}

fn non_empty_pid(value: &str) -> Option<Pid> {
    let pid = Pid::new(value);
    (!pid.is_empty()).then_some(pid)
}

/// Profile operations for the store.
#[derive(Debug, Clone, Copy)]
pub struct Profiles<'a> {
    store: &'a Store,
}

impl<'a> Profiles<'a> {
    /// Create a new profiles instance.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn db(&self) -> &'a Arc<dyn Backend> {
        &self.store.dbs().profile
    }

    // ==================== Records ====================

    /// Registers a profile and stores an argon2 hash of `password`.
    ///
    /// Fails with `InvalidInput` if the pid is empty or already taken.
    pub async fn add_profile(&self, new: NewProfile, password: &str) -> StoreResult<Profile> {
        if new.pid.is_empty() {
            return Err(StoreError::InvalidInput("profile has no pid".to_string()));
        }
        if self.profile_exists(&new.pid).await? {
            return Err(StoreError::InvalidInput(format!(
                "profile {} already exists",
                new.pid
            )));
        }

        let pwdhash = hash_password(password)?;
        let joined = self.store.now_secs();
        let parent = new.parent_pid.clone().filter(|p| !p.is_empty());

        let fields: Vec<(String, String)> = [
            ("name", new.name),
            ("bio", new.bio),
            ("feedurl", new.feed_url.clone()),
            (
                "parentpid",
                parent.as_ref().map(|p| p.to_string()).unwrap_or_default(),
            ),
            ("email", new.email),
            ("location", new.location),
            ("url", new.url),
            ("profileimageurl", new.profile_image_url),
            ("profileimageurlhttps", new.profile_image_url_https),
            ("itemtype", new.item_type),
            ("joined", joined.to_string()),
            (PASSWORD_FIELD, pwdhash),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let db = self.db();
        db.hset_many(&keys::profile_key(&new.pid), &fields).await?;

        if !new.feed_url.is_empty() {
            db.sadd(keys::FEED_DRIVEN_PROFILES, new.pid.as_str()).await?;
        }
        if let Some(parent) = &parent {
            db.sadd(&keys::feeds_key(parent), new.pid.as_str()).await?;
        }

        tracing::info!(pid = %new.pid, feed = !new.feed_url.is_empty(), "Added profile");
        self.profile(&new.pid).await
    }

    /// Full record for `pid` with its derived counts.
    pub async fn profile(&self, pid: &Pid) -> StoreResult<Profile> {
        let db = self.db();
        let fields = db.hgetall(&keys::profile_key(pid)).await?;
        if fields.is_empty() {
            return Err(StoreError::ProfileNotFound(pid.clone()));
        }

        let mut profile = Profile {
            pid: pid.clone(),
            ..Profile::default()
        };
        for (field, value) in fields {
            match field.as_str() {
                "name" => profile.name = value,
                "bio" => profile.bio = value,
                "email" => profile.email = value,
                "feedurl" => profile.feed_url = value,
                "parentpid" => profile.parent_pid = non_empty_pid(&value),
                "location" => profile.location = value,
                "url" => profile.url = value,
                "profileimageurl" => profile.profile_image_url = value,
                "profileimageurlhttps" => profile.profile_image_url_https = value,
                "itemtype" => profile.item_type = value,
                "joined" => {
                    profile.joined = value.parse().map_err(|_| StoreError::MalformedRecord {
                        key: keys::profile_key(pid),
                        reason: format!("joined is not a number: {:?}", value),
                    })?
                }
                _ => {}
            }
        }

        let timelines = self.store.timelines();
        let graph = self.store.graph();
        profile.suggested_count = timelines.len(pid, Scope::Suggested).await?;
        profile.curated_count = timelines.len(pid, Scope::Curated).await?;
        profile.follower_count = graph.follower_count(pid).await?;
        profile.following_count = graph.following_count(pid).await?;
        profile.feed_count = db.scard(&keys::feeds_key(pid)).await?;

        Ok(profile)
    }

    /// Display record for `pid`; see [`ProfileDirectory::brief_profile`].
    pub async fn brief_profile(&self, pid: &Pid) -> StoreResult<BriefProfile> {
        self.store.directory().brief_profile(pid).await
    }

    pub async fn profile_exists(&self, pid: &Pid) -> StoreResult<bool> {
        self.db().exists(&keys::profile_key(pid)).await
    }

    /// Writes the given properties.
    ///
    /// Every name must be one of [`PROFILE_PROPERTIES`]. Changing `feedurl`
    /// or `parentpid` moves the profile between the matching sets.
    pub async fn update_profile(
        &self,
        pid: &Pid,
        values: &BTreeMap<String, String>,
    ) -> StoreResult<()> {
        if let Some(unknown) = values
            .keys()
            .find(|name| !PROFILE_PROPERTIES.contains(&name.as_str()))
        {
            return Err(StoreError::InvalidInput(format!(
                "unknown profile property: {}",
                unknown
            )));
        }

        let current = self.profile(pid).await?;
        let db = self.db();
        let fields: Vec<(String, String)> = values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        db.hset_many(&keys::profile_key(pid), &fields).await?;

        if let Some(feed_url) = values.get("feedurl") {
            if feed_url.is_empty() {
                db.srem(keys::FEED_DRIVEN_PROFILES, pid.as_str()).await?;
            } else {
                db.sadd(keys::FEED_DRIVEN_PROFILES, pid.as_str()).await?;
            }
        }

        if let Some(parent) = values.get("parentpid") {
            let parent = non_empty_pid(parent);
            if current.parent_pid != parent {
                if let Some(old) = &current.parent_pid {
                    db.srem(&keys::feeds_key(old), pid.as_str()).await?;
                }
                if let Some(new) = &parent {
                    db.sadd(&keys::feeds_key(new), pid.as_str()).await?;
                }
            }
        }

        tracing::info!(pid = %pid, fields = values.len(), "Updated profile");
        Ok(())
    }

    /// Removes a profile together with its timelines, attribution map,
    /// follow edges and set memberships.
    ///
    /// Copies of its items already fanned out to followers stay where they are.
    pub async fn remove_profile(&self, pid: &Pid) -> StoreResult<()> {
        let profile = self.profile(pid).await?;
        let db = self.db();

        let timelines = self.store.timelines();
        timelines.clear(pid, Scope::Suggested).await?;
        timelines.clear(pid, Scope::Curated).await?;
        self.store.attributions().clear(pid).await?;

        self.store.graph().detach(pid).await?;

        db.srem(keys::FEED_DRIVEN_PROFILES, pid.as_str()).await?;
        if let Some(parent) = &profile.parent_pid {
            db.srem(&keys::feeds_key(parent), pid.as_str()).await?;
        }
        db.zrem(keys::FLAGGED_PROFILES, pid.as_str()).await?;
        db.del(&keys::profile_key(pid)).await?;

        tracing::info!(pid = %pid, "Removed profile");
        Ok(())
    }

    // ==================== Search and lists ====================

    /// Profiles whose pid contains `term`. `"*"` matches every profile.
    ///
    /// Terms may only hold ASCII letters, digits and `@`; anything else
    /// yields no results and an `InvalidSearch` anomaly.
    pub async fn find_profiles_by_substring(&self, term: &str) -> StoreResult<Vec<Profile>> {
        let needle = if term == "*" {
            String::new()
        } else if is_valid_search(term) {
            term.to_lowercase()
        } else {
            self.store.report(Anomaly::InvalidSearch {
                term: term.to_string(),
            });
            return Ok(Vec::new());
        };

        let mut found = self
            .db()
            .keys_matching(&needle, keys::profile_key_suffix())
            .await?;
        found.sort();

        self.load_all(found.iter().map(|key| keys::pid_from_profile_key(key)))
            .await
    }

    /// Child feed profiles of `pid`.
    pub async fn feeds(&self, pid: &Pid) -> StoreResult<Vec<Profile>> {
        let members = self.db().smembers(&keys::feeds_key(pid)).await?;
        self.load_all(members.into_iter().map(Pid::new)).await
    }

    /// Every profile with a feed URL.
    pub async fn feed_driven_profiles(&self) -> StoreResult<Vec<Profile>> {
        let members = self.db().smembers(keys::FEED_DRIVEN_PROFILES).await?;
        self.load_all(members.into_iter().map(Pid::new)).await
    }

    /// A page of `pid`'s followers. `reciprocal` is set when `pid` follows
    /// them back.
    pub async fn followers(
        &self,
        pid: &Pid,
        start: usize,
        count: usize,
    ) -> StoreResult<Vec<FollowingProfile>> {
        let graph = self.store.graph();
        let page = graph.followers_page(pid, start, Some(count)).await?;

        let mut out = Vec::with_capacity(page.len());
        for (member, _) in page {
            let follower = Pid::new(member);
            let Some(profile) = self.profile_if_present(&follower).await? else {
                continue;
            };
            let reciprocal = graph.is_following(pid, &follower).await?;
            out.push(FollowingProfile {
                profile,
                reciprocal,
            });
        }
        Ok(out)
    }

    /// A page of profiles `pid` follows. `reciprocal` is set when they
    /// follow `pid` back.
    pub async fn following(
        &self,
        pid: &Pid,
        start: usize,
        count: usize,
    ) -> StoreResult<Vec<FollowingProfile>> {
        let graph = self.store.graph();
        let page = graph.following_page(pid, start, Some(count)).await?;

        let mut out = Vec::with_capacity(page.len());
        for (member, _) in page {
            let target = Pid::new(member);
            let Some(profile) = self.profile_if_present(&target).await? else {
                continue;
            };
            let reciprocal = graph.is_following(&target, pid).await?;
            out.push(FollowingProfile {
                profile,
                reciprocal,
            });
        }
        Ok(out)
    }

    // ==================== Flags ====================

    /// Adds one to `pid`'s flag count and returns the new count.
    pub async fn flag_profile(&self, pid: &Pid) -> StoreResult<i64> {
        let count = self
            .db()
            .zincrby(keys::FLAGGED_PROFILES, pid.as_str(), 1)
            .await?;
        tracing::info!(pid = %pid, count = %count, "Flagged profile");
        Ok(count.as_nanos())
    }

    /// Flagged profiles ordered by ascending flag count.
    pub async fn flagged_profiles(
        &self,
        start: usize,
        count: usize,
    ) -> StoreResult<Vec<ScoredProfile>> {
        let rows = self
            .db()
            .zrange(keys::FLAGGED_PROFILES, start, Some(count))
            .await?;
        Ok(rows
            .into_iter()
            .map(|(member, score)| ScoredProfile {
                pid: Pid::new(member),
                score: score.as_nanos() as f64,
            })
            .collect())
    }

    // ==================== Suggested lists ====================

    pub async fn add_suggested_profile(&self, pid: &Pid, location: &str) -> StoreResult<bool> {
        self.db()
            .sadd(&keys::suggested_profiles_key(location), pid.as_str())
            .await
    }

    pub async fn remove_suggested_profile(&self, pid: &Pid, location: &str) -> StoreResult<bool> {
        self.db()
            .srem(&keys::suggested_profiles_key(location), pid.as_str())
            .await
    }

    /// Profiles suggested for `location`.
    pub async fn suggested_profiles(&self, location: &str) -> StoreResult<Vec<Profile>> {
        let members = self
            .db()
            .smembers(&keys::suggested_profiles_key(location))
            .await?;
        self.load_all(members.into_iter().map(Pid::new)).await
    }

    // ==================== Internals ====================

    async fn profile_if_present(&self, pid: &Pid) -> StoreResult<Option<Profile>> {
        match self.profile(pid).await {
            Ok(profile) => Ok(Some(profile)),
            Err(StoreError::ProfileNotFound(_)) => {
                tracing::warn!(pid = %pid, "Listed profile has no record");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn load_all(&self, pids: impl Iterator<Item = Pid>) -> StoreResult<Vec<Profile>> {
        let mut profiles = Vec::new();
        for pid in pids {
            if let Some(profile) = self.profile_if_present(&pid).await? {
                profiles.push(profile);
            }
        }
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::RecordingSink;
    use timeline_core::{ManualClock, NANOS_PER_SECOND};

    fn store() -> Store {
        Store::in_memory().with_clock(Arc::new(ManualClock::new(1_700_000_000 * NANOS_PER_SECOND)))
    }

    async fn add(store: &Store, pid: &str) -> Profile {
        store
            .profiles()
            .add_profile(NewProfile::new(pid, pid.to_uppercase()), "secret")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_and_read_profile() {
        let store = store();
        let profile = add(&store, "Alice").await;

        assert_eq!(profile.pid, Pid::new("alice"));
        assert_eq!(profile.name, "ALICE");
        assert_eq!(profile.joined, 1_700_000_000);
        assert!(store.profiles().profile_exists(&Pid::new("alice")).await.unwrap());

        let stored = store
            .dbs()
            .profile
            .hget(&keys::profile_key(&profile.pid), PASSWORD_FIELD)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn test_duplicate_profile_rejected() {
        let store = store();
        add(&store, "alice").await;
        let err = store
            .profiles()
            .add_profile(NewProfile::new("ALICE", "again"), "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_missing_profile() {
        let store = store();
        let err = store.profiles().profile(&Pid::new("nobody")).await.unwrap_err();
        assert!(err.is_not_found());

        let brief = store.profiles().brief_profile(&Pid::new("nobody")).await.unwrap();
        assert_eq!(brief.pid, Pid::new("nobody"));
        assert!(brief.name.is_empty());
    }

    #[tokio::test]
    async fn test_counts_are_filled() {
        let store = store();
        add(&store, "alice").await;
        add(&store, "bob").await;
        store
            .lifecycle()
            .publish(timeline_core::NewItem::new("alice").text("hi"), None)
            .await
            .unwrap();
        store
            .lifecycle()
            .follow(&Pid::new("bob"), &Pid::new("alice"))
            .await
            .unwrap();

        let alice = store.profiles().profile(&Pid::new("alice")).await.unwrap();
        let bob = store.profiles().profile(&Pid::new("bob")).await.unwrap();
        assert_eq!(alice.curated_count, 1);
        assert_eq!(alice.follower_count, 1);
        assert_eq!(bob.suggested_count, 1);
        assert_eq!(bob.following_count, 1);
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_property() {
        let store = store();
        add(&store, "alice").await;
        let values = BTreeMap::from([("pwdhash".to_string(), "x".to_string())]);
        let err = store
            .profiles()
            .update_profile(&Pid::new("alice"), &values)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_update_moves_feed_bookkeeping() {
        let store = store();
        let p = store.profiles();
        add(&store, "parent").await;
        add(&store, "other").await;
        add(&store, "feed").await;
        let feed = Pid::new("feed");

        let values = BTreeMap::from([
            ("feedurl".to_string(), "https://example.com/rss".to_string()),
            ("parentpid".to_string(), "parent".to_string()),
        ]);
        p.update_profile(&feed, &values).await.unwrap();
        assert_eq!(p.feed_driven_profiles().await.unwrap().len(), 1);
        assert_eq!(p.feeds(&Pid::new("parent")).await.unwrap()[0].pid, feed);

        let values = BTreeMap::from([
            ("feedurl".to_string(), String::new()),
            ("parentpid".to_string(), "other".to_string()),
        ]);
        p.update_profile(&feed, &values).await.unwrap();
        assert!(p.feed_driven_profiles().await.unwrap().is_empty());
        assert!(p.feeds(&Pid::new("parent")).await.unwrap().is_empty());
        assert_eq!(p.feeds(&Pid::new("other")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_profile() {
        let store = store();
        add(&store, "alice").await;
        add(&store, "bob").await;
        let (alice, bob) = (Pid::new("alice"), Pid::new("bob"));
        store.lifecycle().follow(&bob, &alice).await.unwrap();
        store.profiles().flag_profile(&alice).await.unwrap();

        store.profiles().remove_profile(&alice).await.unwrap();

        assert!(!store.profiles().profile_exists(&alice).await.unwrap());
        assert_eq!(store.graph().following_count(&bob).await.unwrap(), 0);
        assert!(store.profiles().flagged_profiles(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search() {
        let sink = Arc::new(RecordingSink::new());
        let store = store().with_anomaly_sink(sink.clone());
        for pid in ["alice", "alicia", "bob"] {
            add(&store, pid).await;
        }
        let p = store.profiles();

        let found: Vec<_> = p
            .find_profiles_by_substring("ALI")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.pid)
            .collect();
        assert_eq!(found, vec![Pid::new("alice"), Pid::new("alicia")]);
        assert_eq!(p.find_profiles_by_substring("*").await.unwrap().len(), 3);

        assert!(p.find_profiles_by_substring("a*").await.unwrap().is_empty());
        assert_eq!(sink.anomalies().len(), 1);
    }

    #[tokio::test]
    async fn test_follow_pages_report_reciprocity() {
        let store = store();
        for pid in ["alice", "bob", "carol"] {
            add(&store, pid).await;
        }
        let (alice, bob, carol) = (Pid::new("alice"), Pid::new("bob"), Pid::new("carol"));
        let g = store.graph();
        g.follow(&bob, &alice).await.unwrap();
        g.follow(&carol, &alice).await.unwrap();
        g.follow(&alice, &bob).await.unwrap();

        let followers = store.profiles().followers(&alice, 0, 10).await.unwrap();
        let flags: Vec<_> = followers
            .iter()
            .map(|f| (f.profile.pid.as_str(), f.reciprocal))
            .collect();
        assert_eq!(flags, [("bob", true), ("carol", false)]);

        let following = store.profiles().following(&carol, 0, 10).await.unwrap();
        assert_eq!(following.len(), 1);
        assert!(!following[0].reciprocal);
    }

    #[tokio::test]
    async fn test_flags_and_suggestions() {
        let store = store();
        add(&store, "alice").await;
        add(&store, "bob").await;
        let p = store.profiles();
        let (alice, bob) = (Pid::new("alice"), Pid::new("bob"));

        p.flag_profile(&alice).await.unwrap();
        assert_eq!(p.flag_profile(&alice).await.unwrap(), 2);
        p.flag_profile(&bob).await.unwrap();
        let flagged = p.flagged_profiles(0, 10).await.unwrap();
        assert_eq!(flagged[0].pid, bob);
        assert_eq!(flagged[1].score, 2.0);

        assert!(p.add_suggested_profile(&alice, "uk").await.unwrap());
        assert_eq!(p.suggested_profiles("uk").await.unwrap()[0].pid, alice);
        assert!(p.remove_suggested_profile(&alice, "uk").await.unwrap());
        assert!(p.suggested_profiles("uk").await.unwrap().is_empty());
    }
}
