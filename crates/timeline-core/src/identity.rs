//! Content-derived item identifiers.
//!
//! An item published without an explicit id gets one derived from its
//! content:
//! 1. Hash publisher, body text, link and event instant with blake3, each
//!    field prefixed by its byte length
//! 2. Hex-encode the first 16 bytes of the digest
//!
//! Re-publishing identical content for the same publisher and event therefore
//! yields the same id, which the lifecycle turns into an idempotent promote.
//!
//! # Example
//!
//! ```
//! use timeline_core::identity::derive_item_id;
//! use timeline_core::Pid;
//!
//! let a = derive_item_id(&Pid::new("alice"), "hello", "", None);
//! let b = derive_item_id(&Pid::new("ALICE"), "hello", "", None);
//! assert_eq!(a, b);
//! assert_eq!(a.as_str().len(), 32);
//! ```

use chrono::{DateTime, SecondsFormat, Utc};

use crate::types::{ItemId, Pid};

/// Number of digest bytes kept in an item id.
const ID_BYTES: usize = 16;

/// Derive an ItemId from the fields that make an item unique.
pub fn derive_item_id(pid: &Pid, text: &str, link: &str, event: Option<DateTime<Utc>>) -> ItemId {
    let mut hasher = blake3::Hasher::new();
    update_field(&mut hasher, pid.as_str());
    update_field(&mut hasher, text);
    update_field(&mut hasher, link);
    if let Some(at) = event {
        update_field(&mut hasher, &at.to_rfc3339_opts(SecondsFormat::Nanos, true));
    }
    let digest = hasher.finalize();
    ItemId::new(hex::encode(&digest.as_bytes()[..ID_BYTES]))
}

/// Length-prefixed so adjacent fields cannot trade bytes.
fn update_field(hasher: &mut blake3::Hasher, field: &str) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}
