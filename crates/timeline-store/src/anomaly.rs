//! Typed reports for conditions that are skipped rather than propagated.
//!
//! Batch paths (fan-out, window hydration, image back-fill) keep going when a
//! single item is missing or undecodable. Each such skip is reported to the
//! store's [`AnomalySink`] instead of being dropped silently.

use std::fmt;
use std::sync::Mutex;

use timeline_core::{ItemId, Pid, Scope};

/// A condition that was tolerated and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// A timeline or queue referenced an item whose record is gone.
    MissingItem { item_id: ItemId, context: &'static str },
    /// A stored record could not be decoded.
    MalformedRecord { key: String, reason: String },
    /// A follow edge that cannot be valid: a self-edge or an empty member.
    MalformedEdge { key: String, member: String },
    /// A profile search term contained disallowed characters.
    InvalidSearch { term: String },
    /// Installing or cancelling a TTL did not take effect.
    ExpiryFailed { key: String },
    /// A suggested entry had no attribution record, or the reverse.
    StaleAttribution {
        pid: Pid,
        scope: Scope,
        item_id: ItemId,
    },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingItem { item_id, context } => {
                write!(f, "missing item {} during {}", item_id, context)
            }
            Self::MalformedRecord { key, reason } => {
                write!(f, "malformed record {}: {}", key, reason)
            }
            Self::MalformedEdge { key, member } => {
                write!(f, "malformed edge {:?} in {}", member, key)
            }
            Self::InvalidSearch { term } => write!(f, "invalid search term {:?}", term),
            Self::ExpiryFailed { key } => write!(f, "expiry change failed for {}", key),
            Self::StaleAttribution {
                pid,
                scope,
                item_id,
            } => write!(f, "stale attribution for {} in {}:{}", item_id, pid, scope),
        }
    }
}

/// Receiver of [`Anomaly`] reports.
pub trait AnomalySink: Send + Sync + fmt::Debug {
    fn report(&self, anomaly: &Anomaly);
}

/// Logs every anomaly at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AnomalySink for TracingSink {
    fn report(&self, anomaly: &Anomaly) {
        tracing::warn!(anomaly = %anomaly, "Skipped record");
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<Anomaly>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far.
    pub fn anomalies(&self) -> Vec<Anomaly> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Drains and returns everything reported so far.
    pub fn take(&self) -> Vec<Anomaly> {
        match self.seen.lock() {
            Ok(mut seen) => std::mem::take(&mut *seen),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl AnomalySink for RecordingSink {
    fn report(&self, anomaly: &Anomaly) {
        tracing::debug!(anomaly = %anomaly, "Recorded anomaly");
        match self.seen.lock() {
            Ok(mut seen) => seen.push(anomaly.clone()),
            Err(poisoned) => poisoned.into_inner().push(anomaly.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_collects_and_drains() {
        let sink = RecordingSink::new();
        sink.report(&Anomaly::InvalidSearch {
            term: "a b".into(),
        });
        sink.report(&Anomaly::ExpiryFailed { key: "k".into() });

        assert_eq!(sink.anomalies().len(), 2);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.anomalies().is_empty());
    }

    #[test]
    fn test_display() {
        let a = Anomaly::MissingItem {
            item_id: ItemId::new("x1"),
            context: "window",
        };
        assert_eq!(a.to_string(), "missing item x1 during window");
    }
}
