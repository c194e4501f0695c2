//! Dispatch counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::classify::ErrorCategory;
use switchboard_core::InteractionKind;

/// Live dispatch counters, updated lock-free.
#[derive(Debug, Default)]
pub struct DispatchStats {
    completed: [AtomicU64; 6],
    failed: AtomicU64,
    escalated: AtomicU64,
    on_cooldown: AtomicU64,
    requirements_unmet: AtomicU64,
    unresolved: AtomicU64,
    dropped: AtomicU64,
}

impl DispatchStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_completed(&self, kind: InteractionKind) {
        self.completed[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, category: ErrorCategory) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if category.is_escalated() {
            self.escalated.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_on_cooldown(&self) {
        self.on_cooldown.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_requirements_unmet(&self) {
        self.requirements_unmet.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unresolved(&self) {
        self.unresolved.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful completions for `kind`.
    pub fn completed(&self, kind: InteractionKind) -> u64 {
        self.completed[kind.index()].load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut completed = [0; 6];
        for kind in InteractionKind::ALL {
            completed[kind.index()] = self.completed(kind);
        }
        StatsSnapshot {
            completed,
            failed: self.failed.load(Ordering::Relaxed),
            escalated: self.escalated.load(Ordering::Relaxed),
            on_cooldown: self.on_cooldown.load(Ordering::Relaxed),
            requirements_unmet: self.requirements_unmet.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`DispatchStats`] at one moment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Completions indexed by [`InteractionKind::index`].
    pub completed: [u64; 6],
    /// Handler failures.
    pub failed: u64,
    /// Failures escalated to diagnostics.
    pub escalated: u64,
    /// Events rejected by a cooldown.
    pub on_cooldown: u64,
    /// Events rejected by a requirement.
    pub requirements_unmet: u64,
    /// Events with no handler.
    pub unresolved: u64,
    /// Events with an unknown kind.
    pub dropped: u64,
}

impl StatsSnapshot {
    /// Completions for `kind`.
    pub fn completed(&self, kind: InteractionKind) -> u64 {
        self.completed[kind.index()]
    }

    /// Completions across every kind.
    pub fn total_completed(&self) -> u64 {
        self.completed.iter().sum()
    }

    /// Every event counted.
    pub fn total(&self) -> u64 {
        self.total_completed()
            + self.failed
            + self.on_cooldown
            + self.requirements_unmet
            + self.unresolved
            + self.dropped
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dispatch: {} total ({} completed, {} failed [{} escalated], {} on cooldown, {} blocked, {} unresolved, {} dropped)",
            self.total(),
            self.total_completed(),
            self.failed,
            self.escalated,
            self.on_cooldown,
            self.requirements_unmet,
            self.unresolved,
            self.dropped
        )
    }
}

impl fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.snapshot().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_display() {
        let stats = DispatchStats::new();
        stats.record_completed(InteractionKind::Button);
        stats.record_completed(InteractionKind::Button);
        stats.record_completed(InteractionKind::Command);
        stats.record_failed(ErrorCategory::CriticalRuntime);
        stats.record_failed(ErrorCategory::Storage);
        stats.record_unresolved();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.completed(InteractionKind::Button), 2);
        assert_eq!(snapshot.total_completed(), 3);
        assert_eq!(snapshot.escalated, 1);
        assert_eq!(snapshot.total(), 6);
        assert_eq!(
            stats.to_string(),
            "Dispatch: 6 total (3 completed, 2 failed [1 escalated], 0 on cooldown, 0 blocked, 1 unresolved, 0 dropped)"
        );
    }
}
