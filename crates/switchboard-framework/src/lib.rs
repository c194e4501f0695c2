//! # Switchboard Framework
//!
//! Dispatch machinery for interaction-driven bots.
//!
//! This layer provides:
//! - Handler registry with registration-time validation
//! - Identifier resolution with a multi-tier fallback chain and a bounded cache
//! - Cooldowns in per-command, global and user-wide scopes
//! - Error classification and a rate-limited recovery pipeline
//! - The [`Dispatcher`] that ties them together, plus in-flight tracking and
//!   dispatch statistics
//!
//! Every component is an explicitly constructed value owned by the
//! dispatcher; nothing is process-global, so tests build fresh state cheaply.

pub mod classify;
pub mod command;
pub mod context;
pub mod cooldown;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod recovery;
pub mod registry;
pub mod resolver;
pub mod stats;
pub mod store;
pub mod testing;
pub mod tracker;
pub mod validation;

pub use classify::{
    Classification, ErrorCategory, ErrorSignature, RecoveryAction, Severity, classify,
    recovery_action,
};
pub use command::{
    CommandModule, CommandOption, ComponentHandlerProvider, DEFAULT_ACTION, OptionChoice,
    OptionType, Requirement,
};
pub use context::{InteractionContext, deliver};
pub use cooldown::{CooldownManager, CooldownScope, CooldownStatus};
pub use dispatcher::{
    DispatchMessages, DispatchOutcome, Dispatcher, DispatcherBuilder, DispatcherOptions,
    SweepReport,
};
pub use error::{HandlerPanic, InvalidHandlerError, RegistrationResult};
pub use handler::{BoxedHandler, HandleResponse, Handler, into_handler};
pub use recovery::{
    DIAGNOSTICS_TARGET, ErrorRecord, Notification, RecoveryOptions, RecoveryPipeline,
    RecoveryReport, SuppressReason,
};
pub use registry::{
    HandlerEntry, HandlerRegistry, RegisterOptions, RegisteredCommand, RegistrationReport,
};
pub use resolver::{IdentifierResolver, Resolution, ResolutionSource, ResolverOptions};
pub use stats::{DispatchStats, StatsSnapshot};
pub use store::MemoryStore;
pub use tracker::{InFlightGuard, InFlightTracker};
pub use validation::{ValidationIssue, validate_command};
