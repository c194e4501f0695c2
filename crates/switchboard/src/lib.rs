//! # Switchboard
//!
//! Interaction dispatch core for chat-platform bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────────────────────────────────────┐
//! │   Runtime   │────▶│ Dispatcher                                 │
//! │  (Ingress)  │     │  cooldowns ─▶ resolver ─▶ requirements     │──▶ handler
//! └─────────────┘     │        recovery pipeline on failure        │
//!                     └────────────────────────────────────────────┘
//! ```
//!
//! - **Runtime**: configuration, logging, the ingress queue and shutdown
//! - **Registry**: handlers keyed by interaction kind and identifier, plus
//!   command modules owning their component handlers
//! - **Resolver**: exact, reconstructed, owner-scoped and default lookups
//!   behind a bounded cache
//! - **Cooldowns**: per-identifier, global and user-wide windows
//! - **Recovery**: error classification, rate-limited user notification and
//!   a diagnostic error ring
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard::prelude::*;
//!
//! async fn mine(ctx: Arc<InteractionContext>) -> anyhow::Result<Reply> {
//!     Ok(Reply::text(format!("{} dug up 3 ore", ctx.actor_id())))
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SwitchboardRuntime::builder().build()?;
//!     runtime
//!         .registry()
//!         .register_command(CommandModule::new("mine", mine).cooldown_secs(3))?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use switchboard_core as core;
pub use switchboard_framework as framework;
pub use switchboard_runtime as runtime;

/// Commonly used types for building a bot on Switchboard.
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime
    pub use switchboard_runtime::{Ingress, SwitchboardConfig, SwitchboardRuntime};

    // Contracts implemented by the transport layer
    pub use switchboard_core::{
        BoxedInteraction, BoxedStore, CodedError, DataStore, Interaction, InteractionKind, Reply,
        ReplyState,
    };

    // Registration and dispatch
    pub use switchboard_framework::{
        CommandModule, CommandOption, DispatchOutcome, Dispatcher, HandlerRegistry,
        InteractionContext, OptionType, RegisterOptions, into_handler,
    };
}
