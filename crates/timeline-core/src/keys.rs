//! Key derivation for the backing stores.
//!
//! Every key the store reads or writes is built here. Identifiers arrive
//! already normalized by [`Pid`] and [`ItemId`], so these functions only
//! append suffixes and prefixes.
//!
//! Layout:
//! - `<pid>:info`                    profile hash
//! - `<pid>:maybe:ts`                curated timeline
//! - `<pid>:possibly:ts`             suggested timeline
//! - `<pid>:sources`                 attribution map for the suggested timeline
//! - `<pid>:following`               profiles `<pid>` follows
//! - `<pid>:followers`               profiles following `<pid>`
//! - `<pid>:feeds`                   child feed profiles
//! - `item:<id>`                     item record
//! - `suggestedprofiles:<location>`  suggested-profile set
//! - `session:<n>`, `oauth:<key>`    session records

use crate::types::{ItemId, Pid, Scope};

/// Set of profiles whose items come from an external feed.
pub const FEED_DRIVEN_PROFILES: &str = "feeddrivenprofiles";

/// Set of item ids waiting for an image back-fill.
pub const ITEMS_NEEDING_IMAGES: &str = "itemsneedingimages";

/// Ordered collection of flagged profiles scored by flag count.
pub const FLAGGED_PROFILES: &str = "flaggedprofiles";

/// Ordering suffix of timeline collections.
pub const ORDERING_TS: &str = "ts";

const PROFILE_SUFFIX: &str = ":info";
const FOLLOWING_SUFFIX: &str = ":following";
const FOLLOWERS_SUFFIX: &str = ":followers";
const ITEM_PREFIX: &str = "item:";

/// Profile hash key.
pub fn profile_key(pid: &Pid) -> String {
    format!("{}{}", pid, PROFILE_SUFFIX)
}

/// Suffix shared by every profile hash key.
pub const fn profile_key_suffix() -> &'static str {
    PROFILE_SUFFIX
}

/// Recovers a Pid from a profile hash key. Keys without the suffix are
/// treated as bare pids.
pub fn pid_from_profile_key(key: &str) -> Pid {
    Pid::new(key.strip_suffix(PROFILE_SUFFIX).unwrap_or(key))
}

/// Set of child feed profiles of `pid`.
pub fn feeds_key(pid: &Pid) -> String {
    format!("{}:feeds", pid)
}

/// Ordered timeline collection for `pid` in `scope`.
pub fn timeline_key(pid: &Pid, scope: Scope) -> String {
    format!("{}:{}:{}", pid, scope.collection_name(), ORDERING_TS)
}

/// Profiles `pid` follows.
pub fn following_key(pid: &Pid) -> String {
    format!("{}{}", pid, FOLLOWING_SUFFIX)
}

/// Suffix shared by every following-set key.
pub const fn following_key_suffix() -> &'static str {
    FOLLOWING_SUFFIX
}

/// Recovers the follower Pid from a following-set key.
pub fn pid_from_following_key(key: &str) -> Option<Pid> {
    key.strip_suffix(FOLLOWING_SUFFIX).map(Pid::new)
}

/// Profiles following `pid`.
pub fn followers_key(pid: &Pid) -> String {
    format!("{}{}", pid, FOLLOWERS_SUFFIX)
}

/// Suffix shared by every followers-set key.
pub const fn followers_key_suffix() -> &'static str {
    FOLLOWERS_SUFFIX
}

/// Recovers the followed Pid from a followers-set key.
pub fn pid_from_followers_key(key: &str) -> Option<Pid> {
    key.strip_suffix(FOLLOWERS_SUFFIX).map(Pid::new)
}

/// Item record key; also the member stored in timelines.
pub fn item_key(id: &ItemId) -> String {
    format!("{}{}", ITEM_PREFIX, id)
}

/// Recovers an ItemId from a timeline member / item record key.
pub fn item_id_from_key(key: &str) -> ItemId {
    ItemId::new(key.strip_prefix(ITEM_PREFIX).unwrap_or(key))
}

/// Attribution map for `pid`'s suggested timeline.
pub fn sources_key(pid: &Pid) -> String {
    format!("{}:sources", pid)
}

/// Suggested profiles for a location.
pub fn suggested_profiles_key(location: &str) -> String {
    format!("suggestedprofiles:{}", location)
}

/// Session record.
pub fn session_key(session_id: i64) -> String {
    format!("session:{}", session_id)
}

/// OAuth scratch data.
pub fn oauth_session_key(key: &str) -> String {
    format!("oauth:{}", key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_key_roundtrip() {
        let pid = Pid::new("Alice");
        let key = profile_key(&pid);
        assert_eq!(key, "alice:info");
        assert_eq!(pid_from_profile_key(&key), pid);
        assert_eq!(pid_from_profile_key("bob"), Pid::new("bob"));
    }

    #[test]
    fn test_timeline_keys_per_scope() {
        let pid = Pid::new("alice");
        assert_eq!(timeline_key(&pid, Scope::Curated), "alice:maybe:ts");
        assert_eq!(timeline_key(&pid, Scope::Suggested), "alice:possibly:ts");
    }

    #[test]
    fn test_edge_keys() {
        let pid = Pid::new("Bob");
        assert_eq!(following_key(&pid), "bob:following");
        assert_eq!(followers_key(&pid), "bob:followers");
        assert_eq!(pid_from_following_key("bob:following"), Some(pid));
        assert_eq!(pid_from_following_key("bob:followers"), None);
        assert_eq!(pid_from_followers_key("bob:followers"), Some(Pid::new("bob")));
    }

    #[test]
    fn test_item_key_roundtrip() {
        let id = ItemId::new("ABC123");
        let key = item_key(&id);
        assert_eq!(key, "item:abc123");
        assert_eq!(item_id_from_key(&key), id);
    }

    #[test]
    fn test_misc_keys() {
        let pid = Pid::new("carol");
        assert_eq!(sources_key(&pid), "carol:sources");
        assert_eq!(feeds_key(&pid), "carol:feeds");
        assert_eq!(suggested_profiles_key("uk"), "suggestedprofiles:uk");
        assert_eq!(session_key(7), "session:7");
        assert_eq!(oauth_session_key("tok"), "oauth:tok");
    }
}
