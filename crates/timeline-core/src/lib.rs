//! timeline-core: Core types and primitives for per-profile activity timelines
//!
//! This crate provides:
//! - Identifier newtypes (Pid, ItemId) with case normalization
//! - Item, profile and hydrated timeline row types
//! - Pure key derivation for the backing stores
//! - Score arithmetic, including event-time stabilization
//! - Content-derived item ids and an injectable clock
//!
//! Nothing here performs I/O; the storage layer lives in timeline-store.

pub mod clock;
pub mod identity;
pub mod keys;
pub mod score;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use score::{NANOS_PER_SECOND, Score, publish_score, stabilize_event};
pub use types::{
    BriefProfile, FollowingProfile, Item, ItemId, NewItem, NewProfile, Pid, Profile, Scope,
    ScopeParseError, ScoredProfile, TimelineEntry, TimelineItem,
};
