//! Event dispatcher for the Switchboard framework.
//!
//! The [`Dispatcher`] owns every stateful component and drives one inbound
//! interaction through a fixed sequence:
//!
//! ```text
//! Received → Classified(kind) → CooldownChecked → Resolved → Invoked
//!          → {Completed | Failed} → Cleaned
//! ```
//!
//! - An unknown kind is logged and dropped without a reply.
//! - An active cooldown gets one ephemeral reply with the seconds remaining.
//! - An unresolved identifier gets one "action unavailable" reply. It is not
//!   an error.
//! - A failing requirement gets one ephemeral reply carrying its reason.
//! - Cooldowns are set before the handler runs.
//! - A handler error or panic goes through the [`RecoveryPipeline`].
//! - `Cleaned` always runs: the in-flight record is held by a guard.
//!
//! ```rust,ignore
//! let registry = Arc::new(HandlerRegistry::default());
//! registry.register_command(mine_module())?;
//!
//! let dispatcher = Arc::new(Dispatcher::builder(registry).store(store).build());
//! dispatcher.init();
//!
//! let outcome = dispatcher.dispatch(interaction).await;
//! ```

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, trace, warn};

use crate::classify::ErrorCategory;
use crate::context::{InteractionContext, deliver};
use crate::cooldown::{CooldownManager, CooldownScope};
use crate::error::HandlerPanic;
use crate::recovery::{RecoveryOptions, RecoveryPipeline, RecoverySweep};
use crate::registry::HandlerRegistry;
use crate::resolver::{IdentifierResolver, ResolverOptions};
use crate::stats::DispatchStats;
use crate::tracker::{DEFAULT_STALENESS, InFlightTracker};
use switchboard_core::{BoxedInteraction, BoxedStore, InteractionKind, ParsedIdentifier, Reply};

// ============================================================================
// Options
// ============================================================================

/// Texts of the replies the dispatcher sends on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchMessages {
    /// Sent when no handler resolves.
    pub unavailable: String,
    /// Sent while on cooldown; `{seconds}` is replaced with the seconds left.
    pub cooldown: String,
}

impl Default for DispatchMessages {
    fn default() -> Self {
        Self {
            unavailable: "This action is no longer available.".to_string(),
            cooldown: "Slow down! You can do that again in {seconds}s.".to_string(),
        }
    }
}

impl DispatchMessages {
    fn cooldown(&self, seconds: u64) -> String {
        self.cooldown.replace("{seconds}", &seconds.to_string())
    }
}

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherOptions {
    /// User-wide cooldown applied to every event; zero disables it.
    pub user_cooldown: Duration,
    /// Age after which an in-flight record is pruned.
    pub staleness: Duration,
    /// Period of the background sweep started by [`Dispatcher::init`].
    pub sweep_interval: Duration,
    /// Resolver cache tuning.
    pub resolver: ResolverOptions,
    /// Recovery pipeline tuning.
    pub recovery: RecoveryOptions,
    /// Reply texts.
    pub messages: DispatchMessages,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            user_cooldown: Duration::ZERO,
            staleness: DEFAULT_STALENESS,
            sweep_interval: Duration::from_secs(60),
            resolver: ResolverOptions::default(),
            recovery: RecoveryOptions::default(),
            messages: DispatchMessages::default(),
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler returned normally.
    Completed,
    /// The handler failed; the error was classified as the given category.
    Failed(ErrorCategory),
    /// Rejected by a cooldown before resolution.
    OnCooldown {
        /// Whole seconds until the cooldown expires.
        seconds_remaining: u64,
    },
    /// A requirement of the owning command failed.
    RequirementsUnmet,
    /// No handler resolved.
    Unresolved,
    /// The kind was not recognized.
    Dropped,
}

impl DispatchOutcome {
    /// Returns `true` if a handler ran to completion.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Counts from one [`Dispatcher::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired cooldown records removed.
    pub cooldowns: usize,
    /// Resolver cache entries evicted.
    pub cache: usize,
    /// Recovery rate-limit entries removed.
    pub recovery: RecoverySweep,
    /// Stale in-flight records pruned.
    pub stale: usize,
}

impl SweepReport {
    /// Returns `true` if nothing was removed.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sweep: {} cooldowns, {} cache entries, {} dedupe entries, {} budgets, {} stale dispatches",
            self.cooldowns, self.cache, self.recovery.dedupe, self.recovery.budgets, self.stale
        )
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    registry: Arc<HandlerRegistry>,
    cooldowns: Option<Arc<CooldownManager>>,
    store: Option<BoxedStore>,
    options: DispatcherOptions,
}

impl DispatcherBuilder {
    /// Shares an existing cooldown manager instead of creating one.
    pub fn cooldowns(mut self, cooldowns: Arc<CooldownManager>) -> Self {
        self.cooldowns = Some(cooldowns);
        self
    }

    /// Makes `store` available to handlers.
    pub fn store(mut self, store: BoxedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the options.
    pub fn options(mut self, options: DispatcherOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the user-wide cooldown.
    pub fn user_cooldown(mut self, duration: Duration) -> Self {
        self.options.user_cooldown = duration;
        self
    }

    /// Builds the dispatcher.
    pub fn build(self) -> Dispatcher {
        let resolver = IdentifierResolver::new(Arc::clone(&self.registry), self.options.resolver);
        Dispatcher {
            registry: self.registry,
            resolver,
            cooldowns: self.cooldowns.unwrap_or_default(),
            recovery: RecoveryPipeline::new(self.options.recovery),
            tracker: InFlightTracker::new(),
            stats: DispatchStats::new(),
            store: self.store,
            options: self.options,
            cancel: CancellationToken::new(),
            sweeper: Mutex::new(None),
        }
    }
}

/// Routes inbound interactions to registered handlers.
///
/// Every component is owned by the dispatcher; nothing is process-global.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    resolver: IdentifierResolver,
    cooldowns: Arc<CooldownManager>,
    recovery: RecoveryPipeline,
    tracker: InFlightTracker,
    stats: DispatchStats,
    store: Option<BoxedStore>,
    options: DispatcherOptions,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Starts building a dispatcher over `registry`.
    pub fn builder(registry: Arc<HandlerRegistry>) -> DispatcherBuilder {
        DispatcherBuilder {
            registry,
            cooldowns: None,
            store: None,
            options: DispatcherOptions::default(),
        }
    }

    /// Creates a dispatcher with default options and no store.
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self::builder(registry).build()
    }

    /// Dispatches one interaction. Never fails; the outcome says what
    /// happened.
    pub async fn dispatch(&self, interaction: BoxedInteraction) -> DispatchOutcome {
        let span = debug_span!(
            "dispatch",
            kind = interaction.kind(),
            identifier = interaction.identifier(),
            actor = interaction.actor_id(),
        );
        self.run(interaction).instrument(span).await
    }

    async fn run(&self, interaction: BoxedInteraction) -> DispatchOutcome {
        let _in_flight = self.tracker.track(
            interaction.kind(),
            interaction.identifier(),
            interaction.actor_id(),
        );

        // Classified
        let kind = match interaction.kind().parse::<InteractionKind>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(error = %e, "Dropping interaction of unknown kind");
                self.stats.record_dropped();
                return DispatchOutcome::Dropped;
            }
        };

        let raw = interaction.identifier();
        let actor = interaction.actor_id();
        let Some(parsed) = ParsedIdentifier::parse(raw) else {
            return self.unresolved(&interaction).await;
        };

        // CooldownChecked
        let command_cooldown = self.registry.cooldown_for(kind, raw, &parsed);
        if let Some(outcome) = self.check_cooldowns(&interaction, command_cooldown).await {
            return outcome;
        }

        // Resolved
        let Some(resolution) = self.resolver.resolve(kind, raw, &parsed) else {
            return self.unresolved(&interaction).await;
        };
        trace!(source = ?resolution.source, "Handler resolved");

        let ctx = Arc::new(InteractionContext::new(
            Arc::clone(&interaction),
            kind,
            parsed,
            Arc::clone(&self.cooldowns),
            self.store.clone(),
        ));

        if let Some(module) = resolution.module.as_deref() {
            if let Err(reason) = module.check_requirements(&ctx) {
                debug!(command = module.name(), %reason, "Requirement not met");
                self.stats.record_requirements_unmet();
                self.notify(&interaction, Reply::text(reason).ephemeral()).await;
                return DispatchOutcome::RequirementsUnmet;
            }
        }

        if let Some(duration) = command_cooldown {
            self.cooldowns
                .set(CooldownScope::Command { key: raw, actor }, duration);
        }
        self.cooldowns
            .set(CooldownScope::User { actor }, self.options.user_cooldown);

        // Invoked
        let context_tag = resolution.context_tag(raw);
        let handler = resolution.handler;
        let invocation = AssertUnwindSafe(async move { handler(ctx).await })
            .catch_unwind()
            .await;
        let err = match invocation {
            Ok(Ok(())) => {
                self.stats.record_completed(kind);
                debug!("Handler completed");
                return DispatchOutcome::Completed;
            }
            Ok(Err(e)) => e,
            Err(payload) => anyhow::Error::new(HandlerPanic::from_payload(&*payload)),
        };

        // Failed
        let report = self.recovery.handle(&*interaction, &context_tag, &err).await;
        let category = report.classification.category;
        self.stats.record_failed(category);
        debug!(%category, notification = ?report.notification, "Handler failure recovered");
        DispatchOutcome::Failed(category)
    }

    async fn check_cooldowns(
        &self,
        interaction: &BoxedInteraction,
        command_cooldown: Option<Duration>,
    ) -> Option<DispatchOutcome> {
        let actor = interaction.actor_id();
        let mut status = self
            .cooldowns
            .check(CooldownScope::User { actor }, self.options.user_cooldown);
        if !status.is_active() {
            if let Some(duration) = command_cooldown {
                let scope = CooldownScope::Command {
                    key: interaction.identifier(),
                    actor,
                };
                status = self.cooldowns.check(scope, duration);
            }
        }
        if !status.is_active() {
            return None;
        }

        let seconds_remaining = status.seconds_remaining();
        debug!(seconds_remaining, "Rejected by cooldown");
        self.stats.record_on_cooldown();
        let message = self.options.messages.cooldown(seconds_remaining);
        self.notify(interaction, Reply::text(message).ephemeral()).await;
        Some(DispatchOutcome::OnCooldown { seconds_remaining })
    }

    async fn unresolved(&self, interaction: &BoxedInteraction) -> DispatchOutcome {
        debug!("No handler resolved");
        self.stats.record_unresolved();
        let reply = Reply::text(self.options.messages.unavailable.clone()).ephemeral();
        self.notify(interaction, reply).await;
        DispatchOutcome::Unresolved
    }

    async fn notify(&self, interaction: &BoxedInteraction, reply: Reply) {
        if let Err(e) = deliver(&**interaction, reply).await {
            warn!(error = %e, "Failed to deliver dispatcher reply");
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Runs one sweep over every bounded structure.
    pub fn sweep(&self) -> SweepReport {
        SweepReport {
            cooldowns: self.cooldowns.sweep(),
            cache: self.resolver.sweep(),
            recovery: self.recovery.sweep(),
            stale: self.tracker.prune_stale(self.options.staleness),
        }
    }

    /// Starts the periodic sweep. Calling it again while running is a no-op.
    ///
    /// The sweep task holds only a weak reference, so dropping the last
    /// `Arc<Dispatcher>` ends it as well.
    pub fn init(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        let period = self.options.sweep_interval;
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(dispatcher) = weak.upgrade() else { break };
                        let report = dispatcher.sweep();
                        if !report.is_empty() {
                            debug!(%report, "Periodic sweep");
                        }
                    }
                }
            }
            trace!("Sweep task stopped");
        }));
        info!(interval = ?period, "Dispatcher initialized");
    }

    /// Stops the periodic sweep and waits for it to finish. The dispatcher
    /// cannot be re-initialized afterwards.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweep task ended abnormally");
            }
        }
        info!(stats = %self.stats, in_flight = self.tracker.len(), "Dispatcher shut down");
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    /// The handler registry.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// The identifier resolver.
    pub fn resolver(&self) -> &IdentifierResolver {
        &self.resolver
    }

    /// The cooldown tables.
    pub fn cooldowns(&self) -> &Arc<CooldownManager> {
        &self.cooldowns
    }

    /// The recovery pipeline and its error ring.
    pub fn recovery(&self) -> &RecoveryPipeline {
        &self.recovery
    }

    /// Dispatch counters.
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// In-flight tracking.
    pub fn tracker(&self) -> &InFlightTracker {
        &self.tracker
    }

    /// Active options.
    pub fn options(&self) -> &DispatcherOptions {
        &self.options
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("stats", &self.stats.snapshot())
            .field("in_flight", &self.tracker.len())
            .finish_non_exhaustive()
    }
}
