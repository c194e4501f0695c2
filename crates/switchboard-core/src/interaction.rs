//! Inbound interaction contract.
//!
//! This module provides the types every transport integration implements:
//!
//! - [`InteractionKind`] - The discriminant of an inbound event
//! - [`Interaction`] - The opaque event object handed to the dispatcher
//! - [`ReplyState`] - The three mutually exclusive acknowledgement states
//! - [`Reply`] - The transport-agnostic reply payload
//!
//! The dispatch core never renders anything itself. It only builds a [`Reply`]
//! and asks the interaction to deliver it; whether delivery succeeded matters
//! to its bookkeeping.

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReplyResult, UnknownKind};

// ============================================================================
// Interaction Kind
// ============================================================================

/// Classification of inbound interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Slash or text command invocation.
    Command,
    /// Button press on a message component.
    Button,
    /// Choice made in a select menu.
    SelectMenu,
    /// Submitted modal form.
    Modal,
    /// Autocomplete request for a command option.
    Autocomplete,
    /// User or message context-menu invocation.
    ContextMenu,
}

impl InteractionKind {
    /// Every kind, in a stable order usable as an array index.
    pub const ALL: [InteractionKind; 6] = [
        InteractionKind::Command,
        InteractionKind::Button,
        InteractionKind::SelectMenu,
        InteractionKind::Modal,
        InteractionKind::Autocomplete,
        InteractionKind::ContextMenu,
    ];

    /// Returns the canonical lowercase name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Button => "button",
            Self::SelectMenu => "select_menu",
            Self::Modal => "modal",
            Self::Autocomplete => "autocomplete",
            Self::ContextMenu => "context_menu",
        }
    }

    /// Position of this kind inside [`InteractionKind::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Returns `true` for kinds whose identifier is a component custom id
    /// rather than a command name.
    pub fn is_component(&self) -> bool {
        matches!(self, Self::Button | Self::SelectMenu | Self::Modal)
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "command" | "slash_command" | "chat_input" | "application_command" => Self::Command,
            "button" => Self::Button,
            "select_menu" | "select" | "string_select" => Self::SelectMenu,
            "modal" | "modal_submit" => Self::Modal,
            "autocomplete" | "application_command_autocomplete" => Self::Autocomplete,
            "context_menu" | "user_context_menu" | "message_context_menu" => Self::ContextMenu,
            _ => return Err(UnknownKind(s.to_string())),
        })
    }
}

// ============================================================================
// Reply State
// ============================================================================

/// Acknowledgement state of an interaction.
///
/// Exactly one primary acknowledgement is allowed by the transport. Once an
/// interaction is [`Deferred`](ReplyState::Deferred) the final answer must be
/// an edit, and once it is [`Responded`](ReplyState::Responded) only
/// follow-ups remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyState {
    /// No acknowledgement has been sent yet.
    #[default]
    Pending,
    /// Acknowledged with a deferral; a final edit is still expected.
    Deferred,
    /// Fully responded.
    Responded,
}

// ============================================================================
// Reply
// ============================================================================

/// A retry affordance attached to a reply.
///
/// Presentation layers typically render this as a button whose custom id is
/// [`identifier`](RetryAffordance::identifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAffordance {
    /// Identifier that re-triggers the failed action.
    pub identifier: String,
    /// Short label for the affordance.
    pub label: String,
}

/// A transport-agnostic reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reply {
    /// Text content of the reply.
    pub content: String,
    /// Only the invoking actor can see the reply.
    pub ephemeral: bool,
    /// Optional retry affordance.
    pub retry: Option<RetryAffordance>,
    /// Plain replies must not carry rich presentation.
    pub plain: bool,
}

impl Reply {
    /// Creates a reply with the given text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Creates a minimal plaintext reply, the last resort when richer
    /// delivery has failed.
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
            retry: None,
            plain: true,
        }
    }

    /// Marks the reply as visible only to the invoking actor.
    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// Attaches a retry affordance pointing at `identifier`.
    pub fn with_retry(mut self, identifier: impl Into<String>) -> Self {
        self.retry = Some(RetryAffordance {
            identifier: identifier.into(),
            label: "Try again".to_string(),
        });
        self
    }

    /// Returns `true` if the reply offers a retry affordance.
    pub fn has_retry(&self) -> bool {
        self.retry.is_some()
    }
}

// ============================================================================
// Interaction Trait
// ============================================================================

/// The opaque inbound event handed to the dispatcher.
///
/// Implementations wrap whatever the hosting transport delivers. The core
/// reads the kind discriminator, actor and identifier, and uses the reply
/// methods to acknowledge the event.
///
/// Reply methods must not be called in a state that forbids them; callers
/// should consult [`reply_state`](Interaction::reply_state) first. The
/// framework's `InteractionContext::respond` does this for handlers.
#[async_trait]
pub trait Interaction: Any + Send + Sync {
    /// Raw kind discriminator as delivered by the transport.
    ///
    /// Parsed with [`InteractionKind::from_str`]; values that do not parse are
    /// dropped by the dispatcher without a reply.
    fn kind(&self) -> &str;

    /// Identifier of the actor (user) that triggered the interaction.
    fn actor_id(&self) -> &str;

    /// Component custom id, or the command name for command-based kinds.
    fn identifier(&self) -> &str;

    /// Parsed arguments: command options, selected values or modal fields.
    fn arguments(&self) -> Value {
        Value::Null
    }

    /// Current acknowledgement state.
    fn reply_state(&self) -> ReplyState;

    /// Sends the primary reply. Valid only in [`ReplyState::Pending`].
    async fn reply(&self, reply: Reply) -> ReplyResult<()>;

    /// Acknowledges now and promises a later edit. Valid only in
    /// [`ReplyState::Pending`].
    async fn defer(&self) -> ReplyResult<()>;

    /// Replaces the deferred placeholder. Valid only in
    /// [`ReplyState::Deferred`].
    async fn edit_reply(&self, reply: Reply) -> ReplyResult<()>;

    /// Sends an additional message after the primary acknowledgement.
    async fn follow_up(&self, reply: Reply) -> ReplyResult<()>;

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// A shared, type-erased interaction.
pub type BoxedInteraction = Arc<dyn Interaction>;

impl fmt::Debug for dyn Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interaction")
            .field("kind", &self.kind())
            .field("actor_id", &self.actor_id())
            .field("identifier", &self.identifier())
            .field("reply_state", &self.reply_state())
            .finish()
    }
}
