//! In-flight event tracking.
//!
//! Each dispatch holds an [`InFlightGuard`] for its whole lifetime; dropping
//! the guard removes the record whatever the outcome, including unwinding.
//! Records that somehow outlive their dispatch are removed by
//! [`InFlightTracker::prune_stale`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// Default age after which an in-flight record is considered leaked.
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(15 * 60);

/// Snapshot of one in-flight dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    /// Raw kind discriminator.
    pub kind: String,
    /// Raw identifier.
    pub identifier: String,
    /// Actor id.
    pub actor_id: String,
    /// When tracking started.
    pub started: Instant,
}

/// Registry of dispatches currently running.
#[derive(Debug, Default)]
pub struct InFlightTracker {
    next_id: AtomicU64,
    records: Mutex<HashMap<u64, InFlight>>,
}

impl InFlightTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a dispatch. The record is removed when the guard drops.
    pub fn track(&self, kind: &str, identifier: &str, actor_id: &str) -> InFlightGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.records.lock().insert(
            id,
            InFlight {
                kind: kind.to_string(),
                identifier: identifier.to_string(),
                actor_id: actor_id.to_string(),
                started: Instant::now(),
            },
        );
        InFlightGuard { tracker: self, id }
    }

    /// Removes records older than `staleness`. Returns the number removed.
    pub fn prune_stale(&self, staleness: Duration) -> usize {
        let now = Instant::now();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| {
            let stale = now.saturating_duration_since(record.started) >= staleness;
            if stale {
                warn!(
                    kind = %record.kind,
                    identifier = %record.identifier,
                    actor = %record.actor_id,
                    "Pruned stale in-flight dispatch"
                );
            }
            !stale
        });
        before - records.len()
    }

    /// Number of dispatches in flight.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Snapshot of every in-flight record.
    pub fn snapshot(&self) -> Vec<InFlight> {
        self.records.lock().values().cloned().collect()
    }
}

/// Removes its record on drop.
#[derive(Debug)]
#[must_use = "the record is removed as soon as the guard is dropped"]
pub struct InFlightGuard<'a> {
    tracker: &'a InFlightTracker,
    id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.tracker.records.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_removes_record() {
        let tracker = InFlightTracker::new();
        {
            let _guard = tracker.track("button", "mine_again", "U1");
            assert_eq!(tracker.len(), 1);
        }
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_stale() {
        let tracker = InFlightTracker::new();
        let leaked = tracker.track("button", "mine_again", "U1");
        std::mem::forget(leaked);

        tokio::time::advance(Duration::from_secs(60)).await;
        let _fresh = tracker.track("modal", "bank_deposit", "U2");
        assert_eq!(tracker.prune_stale(DEFAULT_STALENESS), 0);

        tokio::time::advance(DEFAULT_STALENESS).await;
        assert_eq!(tracker.prune_stale(DEFAULT_STALENESS), 2);
        assert!(tracker.is_empty());
    }
}
