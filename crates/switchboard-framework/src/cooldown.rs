//! Rate limiting by cooldown windows.
//!
//! [`CooldownManager`] tracks three independent tables:
//!
//! | Scope | Key | Typical use |
//! |-------|-----|-------------|
//! | [`CooldownScope::Command`] | identifier + actor | per-command, per-user limits |
//! | [`CooldownScope::Global`]  | free-form key | feature-wide limits (daily rewards) |
//! | [`CooldownScope::User`]    | actor | anti-spam across all commands |
//!
//! Each record moves `Idle → Active → Idle`. The transition back to idle is
//! lazy: a record is logically absent as soon as `now - started >= duration`,
//! and [`sweep`](CooldownManager::sweep) physically removes expired records to
//! bound memory. Checks never mutate state; granting is a separate
//! [`set`](CooldownManager::set) call so callers choose when a cooldown starts.
//!
//! Two concurrent events can both pass a check before either sets the
//! cooldown. This window is tolerated and allows at most one extra execution.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// The table and key a cooldown is tracked under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownScope<'a> {
    /// Per scope key (usually the full identifier) and actor.
    Command {
        /// Scope key.
        key: &'a str,
        /// Actor id.
        actor: &'a str,
    },
    /// Per key, shared by every actor.
    Global {
        /// Scope key.
        key: &'a str,
    },
    /// Per actor, across every command.
    User {
        /// Actor id.
        actor: &'a str,
    },
}

/// Result of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownStatus {
    /// No unexpired record exists.
    Ready,
    /// A record is active for `remaining` more time.
    Active {
        /// Time until the record expires.
        remaining: Duration,
    },
}

impl CooldownStatus {
    /// Returns `true` while a cooldown is active.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// Whole seconds remaining, rounded up. Zero when ready.
    pub fn seconds_remaining(&self) -> u64 {
        match self {
            Self::Ready => 0,
            Self::Active { remaining } => {
                let secs = remaining.as_secs();
                if remaining.subsec_nanos() > 0 {
                    secs + 1
                } else {
                    secs
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Grant {
    started: Instant,
    duration: Duration,
}

impl Grant {
    fn remaining(&self, duration: Duration, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed < duration).then(|| duration - elapsed)
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.duration
    }
}

/// Cooldown tables for the three scopes.
#[derive(Debug, Default)]
pub struct CooldownManager {
    command: Mutex<HashMap<String, HashMap<String, Grant>>>,
    global: Mutex<HashMap<String, Grant>>,
    user: Mutex<HashMap<String, Grant>>,
}

impl CooldownManager {
    /// Creates empty cooldown tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks whether `scope` is on cooldown for a window of `duration`.
    ///
    /// Elapsed time is measured from the start of the previous grant. A zero
    /// duration short-circuits to [`CooldownStatus::Ready`] without touching
    /// the tables. This never refreshes or creates a record.
    pub fn check(&self, scope: CooldownScope<'_>, duration: Duration) -> CooldownStatus {
        if duration.is_zero() {
            return CooldownStatus::Ready;
        }

        let now = Instant::now();
        let remaining = match scope {
            CooldownScope::Command { key, actor } => self
                .command
                .lock()
                .get(key)
                .and_then(|actors| actors.get(actor))
                .and_then(|grant| grant.remaining(duration, now)),
            CooldownScope::Global { key } => self
                .global
                .lock()
                .get(key)
                .and_then(|grant| grant.remaining(duration, now)),
            CooldownScope::User { actor } => self
                .user
                .lock()
                .get(actor)
                .and_then(|grant| grant.remaining(duration, now)),
        };

        match remaining {
            Some(remaining) => CooldownStatus::Active { remaining },
            None => CooldownStatus::Ready,
        }
    }

    /// Starts a cooldown of `duration` for `scope`, replacing any previous
    /// record. A zero duration is a no-op.
    pub fn set(&self, scope: CooldownScope<'_>, duration: Duration) {
        if duration.is_zero() {
            return;
        }

        let grant = Grant {
            started: Instant::now(),
            duration,
        };
        match scope {
            CooldownScope::Command { key, actor } => {
                self.command
                    .lock()
                    .entry(key.to_string())
                    .or_default()
                    .insert(actor.to_string(), grant);
            }
            CooldownScope::Global { key } => {
                self.global.lock().insert(key.to_string(), grant);
            }
            CooldownScope::User { actor } => {
                self.user.lock().insert(actor.to_string(), grant);
            }
        }
        trace!(?scope, ?duration, "Cooldown set");
    }

    /// Removes the record for `scope`, if any. Returns `true` if one existed.
    pub fn reset(&self, scope: CooldownScope<'_>) -> bool {
        match scope {
            CooldownScope::Command { key, actor } => {
                let mut table = self.command.lock();
                let removed = table
                    .get_mut(key)
                    .is_some_and(|actors| actors.remove(actor).is_some());
                if table.get(key).is_some_and(HashMap::is_empty) {
                    table.remove(key);
                }
                removed
            }
            CooldownScope::Global { key } => self.global.lock().remove(key).is_some(),
            CooldownScope::User { actor } => self.user.lock().remove(actor).is_some(),
        }
    }

    /// Physically removes every expired record. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        {
            let mut table = self.command.lock();
            table.retain(|_, actors| {
                let before = actors.len();
                actors.retain(|_, grant| !grant.is_expired(now));
                removed += before - actors.len();
                !actors.is_empty()
            });
        }
        for table in [&self.global, &self.user] {
            let mut table = table.lock();
            let before = table.len();
            table.retain(|_, grant| !grant.is_expired(now));
            removed += before - table.len();
        }

        removed
    }

    /// Number of physically stored records across all tables.
    pub fn len(&self) -> usize {
        let command: usize = self.command.lock().values().map(HashMap::len).sum();
        command + self.global.lock().len() + self.user.lock().len()
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every record.
    pub fn clear(&self) {
        self.command.lock().clear();
        self.global.lock().clear();
        self.user.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECS_3: Duration = Duration::from_secs(3);

    fn mine(actor: &str) -> CooldownScope<'_> {
        CooldownScope::Command {
            key: "mine_again",
            actor,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_until_duration_elapses() {
        let cooldowns = CooldownManager::new();
        cooldowns.set(mine("U1"), SECS_3);

        tokio::time::advance(Duration::from_secs(1)).await;
        let status = cooldowns.check(mine("U1"), SECS_3);
        assert!(status.is_active());
        assert_eq!(status.seconds_remaining(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cooldowns.check(mine("U1"), SECS_3), CooldownStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_is_non_increasing() {
        let cooldowns = CooldownManager::new();
        cooldowns.set(mine("U1"), SECS_3);

        let mut last = u64::MAX;
        for _ in 0..=12 {
            let secs = cooldowns.check(mine("U1"), SECS_3).seconds_remaining();
            assert!(secs <= last);
            last = secs;
            tokio::time::advance(Duration::from_millis(250)).await;
        }
        assert_eq!(last, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_is_idempotent() {
        let cooldowns = CooldownManager::new();
        cooldowns.set(mine("U1"), SECS_3);
        tokio::time::advance(Duration::from_millis(1500)).await;

        let first = cooldowns.check(mine("U1"), SECS_3);
        let second = cooldowns.check(mine("U1"), SECS_3);
        assert_eq!(first, second);
        assert_eq!(cooldowns.len(), 1);

        // Checking an absent record does not create one.
        assert_eq!(cooldowns.check(mine("U2"), SECS_3), CooldownStatus::Ready);
        assert_eq!(cooldowns.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_checks_do_not_extend() {
        let cooldowns = CooldownManager::new();
        cooldowns.set(mine("U1"), SECS_3);

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(1)).await;
            let _ = cooldowns.check(mine("U1"), SECS_3);
        }
        assert_eq!(cooldowns.check(mine("U1"), SECS_3), CooldownStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_short_circuits() {
        let cooldowns = CooldownManager::new();
        cooldowns.set(mine("U1"), Duration::ZERO);
        assert!(cooldowns.is_empty());
        assert_eq!(cooldowns.check(mine("U1"), Duration::ZERO), CooldownStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scopes_are_independent() {
        let cooldowns = CooldownManager::new();
        cooldowns.set(CooldownScope::Global { key: "daily" }, SECS_3);

        assert!(
            cooldowns
                .check(CooldownScope::Global { key: "daily" }, SECS_3)
                .is_active()
        );
        assert!(!cooldowns.check(CooldownScope::User { actor: "daily" }, SECS_3).is_active());
        assert!(
            !cooldowns
                .check(
                    CooldownScope::Command {
                        key: "daily",
                        actor: "U1"
                    },
                    SECS_3
                )
                .is_active()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cooldowns = CooldownManager::new();
        cooldowns.set(mine("U1"), Duration::from_secs(1));
        cooldowns.set(mine("U2"), Duration::from_secs(10));
        cooldowns.set(CooldownScope::User { actor: "U1" }, Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cooldowns.sweep(), 2);
        assert_eq!(cooldowns.len(), 1);
        assert!(cooldowns.check(mine("U2"), Duration::from_secs(10)).is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let cooldowns = CooldownManager::new();
        cooldowns.set(mine("U1"), SECS_3);
        assert!(cooldowns.reset(mine("U1")));
        assert!(!cooldowns.reset(mine("U1")));
        assert!(cooldowns.is_empty());
    }
}
