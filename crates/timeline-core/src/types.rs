//! Core data types for per-profile activity timelines.
//!
//! Profiles publish items. Items are referenced by identifier from two ordered
//! collections per profile:
//!
//! - the curated timeline ("maybe"): items the owner published or re-admitted
//! - the suggested timeline ("possibly"): items propagated through follows
//!
//! Identifiers are case-normalized on construction so every derived key uses
//! the same spelling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::score::{NANOS_PER_SECOND, Score};

// ============================================================================
// ID Types
// ============================================================================

/// Identifier of a profile (an actor that publishes and follows).
///
/// Always stored lower-cased. Two `Pid`s built from strings that differ only
/// in case compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Pid(String);

impl Pid {
    /// Creates a Pid, normalizing to lower case.
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    /// Returns the normalized identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Pid {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Pid {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Pid {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Pid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

/// Identifier of an item.
///
/// Either content-derived (see [`crate::identity::derive_item_id`]) or
/// supplied by the caller. Normalized to lower case like [`Pid`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Creates an ItemId, normalizing to lower case.
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    /// Returns the normalized identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

// ============================================================================
// Scope
// ============================================================================

/// Which of a profile's two timelines an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Items the profile published or explicitly re-admitted ("maybe").
    Curated,
    /// Items propagated into the profile's view by follows ("possibly").
    Suggested,
}

impl Scope {
    /// Collection name used in key derivation.
    #[must_use]
    pub const fn collection_name(&self) -> &'static str {
        match self {
            Self::Curated => "maybe",
            Self::Suggested => "possibly",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection_name())
    }
}

/// Error returned when a scope name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeParseError(pub String);

impl fmt::Display for ScopeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown timeline scope: {}", self.0)
    }
}

impl std::error::Error for ScopeParseError {}

impl FromStr for Scope {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "m" | "maybe" | "curated" => Ok(Self::Curated),
            "p" | "possibly" | "suggested" => Ok(Self::Suggested),
            other => Err(ScopeParseError(other.to_string())),
        }
    }
}

// ============================================================================
// Items
// ============================================================================

/// A published content item.
///
/// Owned by the item record store; timelines only hold its identifier.
/// `added` and `event` are nanoseconds since the Unix epoch. An `event` of
/// zero means the item is not an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub pid: Pid,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub media: String,
    #[serde(default)]
    pub image: String,
    pub added: i64,
    #[serde(default)]
    pub event: i64,
    /// Duration of an event in seconds, 0 when unspecified.
    #[serde(default)]
    pub duration: u32,
}

impl Item {
    /// Returns true if the item carries a scheduled event instant.
    #[must_use]
    pub const fn is_event(&self) -> bool {
        self.event > 0
    }

    /// The score the item is placed at when first published.
    #[must_use]
    pub const fn default_score(&self) -> Score {
        if self.is_event() {
            Score::from_nanos(self.event)
        } else {
            Score::from_nanos(self.added)
        }
    }

    /// Trims surrounding whitespace from free-text and reference fields.
    pub fn sanitize(&mut self) {
        for field in [
            &mut self.text,
            &mut self.link,
            &mut self.media,
            &mut self.image,
        ] {
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }
    }

    /// Linked items without an image are queued for image back-fill.
    #[must_use]
    pub fn needs_image(&self) -> bool {
        !self.link.is_empty() && self.image.is_empty()
    }

    /// Publish instant truncated to whole seconds.
    #[must_use]
    pub const fn added_secs(&self) -> i64 {
        self.added / NANOS_PER_SECOND
    }

    /// Event instant truncated to whole seconds (0 for non-events).
    #[must_use]
    pub const fn event_secs(&self) -> i64 {
        self.event / NANOS_PER_SECOND
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Title: {} Link: {}", self.text, self.link)
    }
}

/// Input for publishing a new item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewItem {
    pub pid: Option<Pid>,
    pub text: String,
    pub link: String,
    pub image: String,
    pub media: String,
    pub event: Option<DateTime<Utc>>,
    pub duration: u32,
    /// Caller-supplied id. When absent the id is derived from content.
    pub id: Option<ItemId>,
}

impl NewItem {
    /// Starts a new item for the given publisher.
    pub fn new(pid: impl Into<Pid>) -> Self {
        Self {
            pid: Some(pid.into()),
            ..Self::default()
        }
    }

    /// Sets the body text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Sets the link.
    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }

    /// Sets the image reference.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Sets the media reference.
    pub fn media(mut self, media: impl Into<String>) -> Self {
        self.media = media.into();
        self
    }

    /// Schedules the item as an event.
    pub fn event(mut self, at: DateTime<Utc>) -> Self {
        self.event = Some(at);
        self
    }

    /// Sets the event duration in seconds.
    pub fn duration(mut self, secs: u32) -> Self {
        self.duration = secs;
        self
    }

    /// Supplies an explicit id instead of deriving one from content.
    pub fn id(mut self, id: impl Into<ItemId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// An item identifier with its score inside one timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub item_id: ItemId,
    pub score: Score,
}

impl TimelineEntry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(item_id: ItemId, score: Score) -> Self {
        Self { item_id, score }
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Display record for a profile: just enough to render an author or a "via".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BriefProfile {
    pub pid: Pid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, rename = "profileimageurlhttps", skip_serializing_if = "String::is_empty")]
    pub image: String,
}

/// Full profile record with derived counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub pid: Pid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bio: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, rename = "feedurl", skip_serializing_if = "String::is_empty")]
    pub feed_url: String,
    #[serde(default, rename = "parentpid", skip_serializing_if = "Option::is_none")]
    pub parent_pid: Option<Pid>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, rename = "profileimageurl", skip_serializing_if = "String::is_empty")]
    pub profile_image_url: String,
    #[serde(default, rename = "profileimageurlhttps", skip_serializing_if = "String::is_empty")]
    pub profile_image_url_https: String,
    #[serde(default, rename = "itemtype", skip_serializing_if = "String::is_empty")]
    pub item_type: String,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub joined: i64,
    #[serde(default, rename = "pcount")]
    pub suggested_count: u64,
    #[serde(default, rename = "mcount")]
    pub curated_count: u64,
    #[serde(default, rename = "followercount")]
    pub follower_count: u64,
    #[serde(default, rename = "followingcount")]
    pub following_count: u64,
    #[serde(default, rename = "feedcount")]
    pub feed_count: u64,
}

impl Profile {
    /// The display subset of this profile.
    #[must_use]
    pub fn brief(&self) -> BriefProfile {
        BriefProfile {
            pid: self.pid.clone(),
            name: self.name.clone(),
            image: self.profile_image_url_https.clone(),
        }
    }
}

/// Input for registering a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProfile {
    pub pid: Pid,
    pub name: String,
    pub bio: String,
    pub feed_url: String,
    pub parent_pid: Option<Pid>,
    pub email: String,
    pub location: String,
    pub url: String,
    pub profile_image_url: String,
    pub profile_image_url_https: String,
    pub item_type: String,
}

impl NewProfile {
    /// Starts a profile with the given id and display name.
    pub fn new(pid: impl Into<Pid>, name: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A profile with a numeric score (e.g. flag count).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredProfile {
    pub pid: Pid,
    pub score: f64,
}

/// A profile in a follower/following page, with reciprocity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowingProfile {
    #[serde(flatten)]
    pub profile: Profile,
    pub reciprocal: bool,
}

// ============================================================================
// Hydrated timeline rows
// ============================================================================

/// An item as it appears in one profile's timeline.
///
/// `ts` is the item's score in that timeline, which for events differs from
/// `item.added`. `via` is set only when the item arrived through a profile
/// other than its author and the timeline owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineItem {
    #[serde(flatten)]
    pub item: Item,
    pub ts: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Pid>,
    pub author: BriefProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<BriefProfile>,
}

impl TimelineItem {
    /// Identifier of the underlying item.
    #[must_use]
    pub fn id(&self) -> &ItemId {
        &self.item.id
    }

    /// Publish instant in whole seconds.
    #[must_use]
    pub const fn added_secs(&self) -> i64 {
        self.item.added_secs()
    }

    /// Event instant in whole seconds.
    #[must_use]
    pub const fn event_secs(&self) -> i64 {
        self.item.event_secs()
    }
}
