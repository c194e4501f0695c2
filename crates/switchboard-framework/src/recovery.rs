//! Error recovery pipeline.
//!
//! Every handler failure that reaches [`RecoveryPipeline::handle`] goes
//! through the same steps:
//!
//! 1. The failure is classified and appended to a bounded ring of
//!    [`ErrorRecord`]s.
//! 2. A per-context-tag counter is incremented; past the alert threshold each
//!    occurrence logs a frequency warning. Counters are never reset, so the
//!    dispatcher tags failures by the registered handler they reached
//!    rather than by the raw identifier.
//! 3. The actor's notification limits are checked: the same `(actor, tag)`
//!    pair is notified at most once per dedupe window, and each actor at most
//!    `budget` times per budget window. A suppressed notification is still
//!    logged.
//! 4. The category's recovery reply is delivered. If that fails, a minimal
//!    plaintext reply is tried; if that fails too, the failure is logged.
//!
//! Nothing in the pipeline returns an error to the caller.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::classify::{
    Classification, ErrorCategory, ErrorSignature, PLAINTEXT_FALLBACK_MESSAGE, Severity,
    recovery_action,
};
use crate::context::deliver;
use switchboard_core::{Interaction, Reply};

/// Tracing target for escalated failures.
pub const DIAGNOSTICS_TARGET: &str = "switchboard::diagnostics";

/// Recovery pipeline tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryOptions {
    /// Records kept in the ring.
    pub ring_capacity: usize,
    /// Minimum gap between notifications for the same actor and tag.
    pub dedupe_window: Duration,
    /// Notifications allowed per actor per budget window.
    pub budget: u32,
    /// Rolling budget window.
    pub budget_window: Duration,
    /// Occurrences of one tag after which frequency warnings are logged.
    pub alert_threshold: u64,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            ring_capacity: 100,
            dedupe_window: Duration::from_secs(5),
            budget: 5,
            budget_window: Duration::from_secs(300),
            alert_threshold: 5,
        }
    }
}

/// One logged failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Wall-clock time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Classified category.
    pub category: ErrorCategory,
    /// Category severity.
    pub severity: Severity,
    /// Actor the failure happened for.
    pub actor_id: String,
    /// Identifier of the failed interaction, verbatim.
    pub identifier: String,
    /// Registered handler the failure is attributed to.
    pub context_tag: String,
    /// Outermost error message.
    pub message: String,
}

/// Why a notification was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// The same actor and tag were notified within the dedupe window.
    Duplicate,
    /// The actor's notification budget is spent.
    BudgetExhausted,
}

/// What happened to the actor-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// The recovery reply was delivered.
    Delivered,
    /// Only the plaintext fallback got through.
    DeliveredPlaintext,
    /// Not sent.
    Suppressed(SuppressReason),
    /// Both delivery attempts failed.
    Failed,
}

/// Outcome of handling one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// How the failure was classified.
    pub classification: Classification,
    /// What the actor saw.
    pub notification: Notification,
    /// Failures recorded for the context tag so far, this one included.
    pub occurrences: u64,
    /// Whether this failure logged a frequency warning.
    pub alerted: bool,
}

/// Counts from one [`RecoveryPipeline::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverySweep {
    /// Expired dedupe entries removed.
    pub dedupe: usize,
    /// Actors whose budget window fully elapsed.
    pub budgets: usize,
}

/// Records failures and tells actors about them.
pub struct RecoveryPipeline {
    options: RecoveryOptions,
    ring: Mutex<VecDeque<ErrorRecord>>,
    frequency: Mutex<HashMap<String, u64>>,
    last_notified: Mutex<HashMap<(String, String), Instant>>,
    budgets: Mutex<HashMap<String, VecDeque<Instant>>>,
    total: AtomicU64,
}

impl RecoveryPipeline {
    /// Creates a pipeline.
    pub fn new(options: RecoveryOptions) -> Self {
        Self {
            options,
            ring: Mutex::new(VecDeque::with_capacity(options.ring_capacity)),
            frequency: Mutex::new(HashMap::new()),
            last_notified: Mutex::new(HashMap::new()),
            budgets: Mutex::new(HashMap::new()),
            total: AtomicU64::new(0),
        }
    }

    /// Active options.
    pub fn options(&self) -> &RecoveryOptions {
        &self.options
    }

    /// Runs the pipeline for a failure of the handler behind `interaction`.
    pub async fn handle(
        &self,
        interaction: &dyn Interaction,
        context_tag: &str,
        err: &anyhow::Error,
    ) -> RecoveryReport {
        let signature = ErrorSignature::from_error(err);
        let classification = signature.classify();
        let actor = interaction.actor_id();

        self.record(ErrorRecord {
            timestamp_ms: unix_millis(),
            category: classification.category,
            severity: classification.severity,
            actor_id: actor.to_string(),
            identifier: interaction.identifier().to_string(),
            context_tag: context_tag.to_string(),
            message: signature.message.clone(),
        });
        self.log(&classification, actor, context_tag, &signature);

        let occurrences = self.bump_frequency(context_tag);
        let alerted = occurrences > self.options.alert_threshold;
        if alerted {
            warn!(
                context = context_tag,
                count = occurrences,
                threshold = self.options.alert_threshold,
                "Repeated failures for the same context"
            );
        }

        let notification = match self.admit(actor, context_tag) {
            Some(reason) => {
                debug!(actor, context = context_tag, ?reason, "Error notification suppressed");
                Notification::Suppressed(reason)
            }
            None => self.notify(interaction, classification.category).await,
        };
        RecoveryReport {
            classification,
            notification,
            occurrences,
            alerted,
        }
    }

    fn record(&self, record: ErrorRecord) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if self.options.ring_capacity == 0 {
            return;
        }
        let mut ring = self.ring.lock();
        while ring.len() >= self.options.ring_capacity {
            ring.pop_front();
        }
        ring.push_back(record);
    }

    fn log(&self, classification: &Classification, actor: &str, context: &str, signature: &ErrorSignature) {
        let category = classification.category.as_str();
        let severity = classification.severity;
        if classification.category.is_escalated() {
            error!(
                target: DIAGNOSTICS_TARGET,
                category,
                %severity,
                actor,
                context,
                code = signature.code.as_deref(),
                trace = %signature.trace,
                "Escalated handler failure"
            );
            return;
        }
        match severity {
            Severity::High | Severity::Critical => error!(
                category,
                %severity,
                actor,
                context,
                code = signature.code.as_deref(),
                error = %signature.message,
                "Handler failed"
            ),
            Severity::Medium => warn!(
                category,
                %severity,
                actor,
                context,
                code = signature.code.as_deref(),
                error = %signature.message,
                "Handler failed"
            ),
            Severity::Low => info!(
                category,
                %severity,
                actor,
                context,
                error = %signature.message,
                "Handler failed"
            ),
        }
    }

    fn bump_frequency(&self, context_tag: &str) -> u64 {
        let mut frequency = self.frequency.lock();
        let count = frequency.entry(context_tag.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Applies the dedupe window and the budget. On admission both are
    /// charged.
    fn admit(&self, actor: &str, context_tag: &str) -> Option<SuppressReason> {
        let now = Instant::now();
        let key = (actor.to_string(), context_tag.to_string());

        let mut last_notified = self.last_notified.lock();
        if last_notified
            .get(&key)
            .is_some_and(|at| now.saturating_duration_since(*at) < self.options.dedupe_window)
        {
            return Some(SuppressReason::Duplicate);
        }

        let mut budgets = self.budgets.lock();
        let window = budgets.entry(actor.to_string()).or_default();
        while window
            .front()
            .is_some_and(|at| now.saturating_duration_since(*at) >= self.options.budget_window)
        {
            window.pop_front();
        }
        if window.len() >= self.options.budget as usize {
            return Some(SuppressReason::BudgetExhausted);
        }

        window.push_back(now);
        last_notified.insert(key, now);
        None
    }

    async fn notify(&self, interaction: &dyn Interaction, category: ErrorCategory) -> Notification {
        let action = recovery_action(category);
        let mut reply = Reply::text(action.message).ephemeral();
        if action.offer_retry {
            reply = reply.with_retry(interaction.identifier());
        }

        let err = match deliver(interaction, reply).await {
            Ok(()) => return Notification::Delivered,
            Err(e) => e,
        };
        warn!(
            identifier = interaction.identifier(),
            error = %err,
            "Recovery reply failed, sending plaintext fallback"
        );

        match deliver(interaction, Reply::plain(PLAINTEXT_FALLBACK_MESSAGE)).await {
            Ok(()) => Notification::DeliveredPlaintext,
            Err(e) => {
                error!(
                    identifier = interaction.identifier(),
                    error = %e,
                    "Plaintext fallback failed, actor was not notified"
                );
                Notification::Failed
            }
        }
    }

    // ─── Diagnostics ────────────────────────────────────────────────────────

    /// Snapshot of the ring, oldest first.
    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.ring.lock().iter().cloned().collect()
    }

    /// Number of records currently in the ring.
    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    /// Returns `true` if the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    /// Failures handled since creation, including those evicted from the
    /// ring.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Occurrences recorded for `context_tag`.
    pub fn frequency(&self, context_tag: &str) -> u64 {
        self.frequency.lock().get(context_tag).copied().unwrap_or(0)
    }

    /// Serializes the ring as a JSON array.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.recent_errors())
    }

    /// Drops expired dedupe entries and fully elapsed budget windows.
    pub fn sweep(&self) -> RecoverySweep {
        let now = Instant::now();
        let mut report = RecoverySweep::default();

        {
            let mut last_notified = self.last_notified.lock();
            let before = last_notified.len();
            last_notified
                .retain(|_, at| now.saturating_duration_since(*at) < self.options.dedupe_window);
            report.dedupe = before - last_notified.len();
        }
        {
            let mut budgets = self.budgets.lock();
            let before = budgets.len();
            budgets.retain(|_, window| {
                window
                    .back()
                    .is_some_and(|at| now.saturating_duration_since(*at) < self.options.budget_window)
            });
            report.budgets = before - budgets.len();
        }
        report
    }
}

impl Default for RecoveryPipeline {
    fn default() -> Self {
        Self::new(RecoveryOptions::default())
    }
}

impl fmt::Debug for RecoveryPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryPipeline")
            .field("options", &self.options)
            .field("records", &self.len())
            .field("total", &self.total())
            .finish_non_exhaustive()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
