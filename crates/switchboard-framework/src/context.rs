//! Per-dispatch context handed to handlers.
//!
//! One [`InteractionContext`] is created for each event that reaches a handler.
//! It bundles the inbound [`Interaction`] with everything the dispatcher
//! learned about it (kind, parsed identifier, arguments) and the shared
//! collaborators a handler may need (cooldowns, data store).
//!
//! Replies should go through [`InteractionContext::respond`], which respects
//! the interaction's acknowledgement state.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::cooldown::CooldownManager;
use switchboard_core::{
    BoxedInteraction, BoxedStore, DataStore, Interaction, InteractionKind, ParsedIdentifier, Reply,
    ReplyResult, ReplyState,
};

/// Delivers `reply` on the channel allowed by the interaction's state.
///
/// - [`ReplyState::Pending`] uses the primary reply.
/// - [`ReplyState::Deferred`] edits the deferred placeholder.
/// - [`ReplyState::Responded`] sends a follow-up.
///
/// If the primary path reports that the interaction was superseded, the reply
/// is retried once as a follow-up instead of failing.
pub async fn deliver(interaction: &dyn Interaction, reply: Reply) -> ReplyResult<()> {
    let primary = match interaction.reply_state() {
        ReplyState::Pending => interaction.reply(reply.clone()).await,
        ReplyState::Deferred => interaction.edit_reply(reply.clone()).await,
        ReplyState::Responded => return interaction.follow_up(reply).await,
    };

    match primary {
        Err(e) if e.is_superseded() => {
            debug!(
                identifier = interaction.identifier(),
                error = %e,
                "Primary reply superseded, falling back to follow-up"
            );
            interaction.follow_up(reply).await
        }
        other => other,
    }
}

/// The context object passed to handlers.
pub struct InteractionContext {
    interaction: BoxedInteraction,
    kind: InteractionKind,
    parsed: ParsedIdentifier,
    arguments: Value,
    cooldowns: Arc<CooldownManager>,
    store: Option<BoxedStore>,
}

impl InteractionContext {
    /// Creates a context for `interaction`.
    pub fn new(
        interaction: BoxedInteraction,
        kind: InteractionKind,
        parsed: ParsedIdentifier,
        cooldowns: Arc<CooldownManager>,
        store: Option<BoxedStore>,
    ) -> Self {
        let arguments = interaction.arguments();
        Self {
            interaction,
            kind,
            parsed,
            arguments,
            cooldowns,
            store,
        }
    }

    /// The inbound interaction.
    pub fn interaction(&self) -> &dyn Interaction {
        &*self.interaction
    }

    /// The interaction as a shared handle.
    pub fn interaction_arc(&self) -> BoxedInteraction {
        Arc::clone(&self.interaction)
    }

    /// Attempts to downcast the interaction to a concrete transport type.
    pub fn downcast<T: Interaction>(&self) -> Option<&T> {
        self.interaction.as_any().downcast_ref::<T>()
    }

    /// The classified kind.
    pub fn kind(&self) -> InteractionKind {
        self.kind
    }

    /// The actor that triggered the interaction.
    pub fn actor_id(&self) -> &str {
        self.interaction.actor_id()
    }

    /// The raw identifier as delivered.
    pub fn identifier(&self) -> &str {
        self.interaction.identifier()
    }

    /// The canonical owner/action split of the identifier.
    pub fn parsed(&self) -> &ParsedIdentifier {
        &self.parsed
    }

    /// The owning command name.
    pub fn owner(&self) -> &str {
        self.parsed.owner()
    }

    /// The sub-action tag, if any.
    pub fn action(&self) -> Option<&str> {
        self.parsed.action()
    }

    /// Raw arguments delivered with the interaction.
    pub fn arguments(&self) -> &Value {
        &self.arguments
    }

    /// Deserializes the arguments into `T`.
    pub fn args<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_value(self.arguments.clone())
            .map_err(|e| anyhow::anyhow!("invalid arguments for '{}': {e}", self.identifier()))
    }

    /// Shared cooldown tables, for feature-level cooldowns.
    pub fn cooldowns(&self) -> &CooldownManager {
        &self.cooldowns
    }

    /// The data store, if one was configured.
    pub fn store(&self) -> Option<&dyn DataStore> {
        self.store.as_deref()
    }

    /// The data store, or an error classified as a storage failure.
    pub fn require_store(&self) -> anyhow::Result<&dyn DataStore> {
        self.store()
            .ok_or_else(|| anyhow::anyhow!("storage is not configured for this dispatcher"))
    }

    /// Sends `reply` on the channel allowed by the current state.
    pub async fn respond(&self, reply: Reply) -> ReplyResult<()> {
        deliver(&*self.interaction, reply).await
    }

    /// Defers the acknowledgement if nothing has been sent yet.
    pub async fn defer(&self) -> ReplyResult<()> {
        if self.interaction.reply_state() == ReplyState::Pending {
            self.interaction.defer().await
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for InteractionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionContext")
            .field("kind", &self.kind)
            .field("parsed", &self.parsed)
            .field("actor_id", &self.actor_id())
            .finish_non_exhaustive()
    }
}
