//! timeline-store: Fan-out-on-write timeline storage
//!
//! This crate provides:
//! - Ordered per-profile timelines (curated and suggested) with attribution
//! - Fan-out of published and promoted items to followers
//! - The item lifecycle: publish, promote, demote, follow, unfollow
//! - Windowed, deduplicated range queries around a pivot instant
//! - Profile records, sessions and the image back-fill queue
//! - Follow-graph reconciliation after interrupted writes
//!
//! # Architecture
//!
//! All state sits behind the [`Backend`] trait, a small key/value surface of
//! strings, hashes, sets and scored collections. Two implementations ship:
//! - [`MemoryBackend`] for tests and embedding
//! - [`PgBackend`] over four tables in PostgreSQL via sqlx
//!
//! A [`Store`] owns four logical databases (profile, timeline, item, session)
//! and hands out borrowed views for each component.
//!
//! # Usage
//!
//! ```rust,ignore
//! use timeline_store::{Store, StoreConfig};
//! use timeline_store::timeline_core::{NewItem, Pid, Scope};
//!
//! let store = Store::connect(StoreConfig::from_env()?).await?;
//!
//! let published = store
//!     .lifecycle()
//!     .publish(NewItem::new("alice").text("hello"), None)
//!     .await?;
//!
//! let rows = store
//!     .ranges()
//!     .window_around(&Pid::new("alice"), Scope::Curated, published.score, 20, 0)
//!     .await?;
//! ```

pub mod anomaly;
pub mod attribution;
pub mod backend;
pub mod error;
pub mod fanout;
pub mod graph;
pub mod images;
pub mod items;
pub mod lifecycle;
pub mod profiles;
pub mod range;
pub mod reconcile;
pub mod schema;
pub mod sessions;
pub mod store;
pub mod timeline;

pub use anomaly::{Anomaly, AnomalySink, RecordingSink, TracingSink};
pub use backend::{Backend, MemoryBackend, PgBackend, ScoreBound};
pub use error::{StoreError, StoreResult};
pub use fanout::{FanOutReport, Removal};
pub use lifecycle::{Demoted, Promoted, Published};
pub use profiles::{KvProfileDirectory, PROFILE_PROPERTIES, ProfileDirectory};
pub use reconcile::ReconcileReport;
pub use sessions::OAUTH_SESSION_TTL;
pub use store::{Databases, Namespaces, Store, StoreConfig};

// Re-export timeline-core for downstream crates
pub use timeline_core;
