//! # Switchboard Core
//!
//! Foundation types for the Switchboard interaction dispatch core.
//!
//! This crate defines the contracts every other layer builds on:
//!
//! - **Interaction Contract**: The inbound event object ([`Interaction`]), its
//!   discriminant ([`InteractionKind`]) and acknowledgement state ([`ReplyState`])
//! - **Replies**: Transport-agnostic reply payloads ([`Reply`])
//! - **Identifiers**: The canonical `<owner>_<action>` parser ([`ParsedIdentifier`])
//! - **Data Access**: The opaque record store collaborator ([`DataStore`])
//! - **Errors**: Reply, store and coded handler errors
//!
//! ## Event Flow
//!
//! ```text
//! ┌─────────────┐     ┌────────────┐     ┌───────────┐
//! │  Transport  │────▶│ Dispatcher │────▶│  Handler  │
//! │ Interaction │◀────│  (replies) │     │ (anyhow)  │
//! └─────────────┘     └────────────┘     └───────────┘
//! ```

pub mod error;
pub mod identifier;
pub mod interaction;
pub mod store;

pub use error::{
    CodedError, HandlerResult, ReplyError, ReplyResult, StoreError, StoreResult, UnknownKind,
};
pub use identifier::{MAX_IDENTIFIER_LEN, ParsedIdentifier, is_valid_identifier};
pub use interaction::{
    BoxedInteraction, Interaction, InteractionKind, Reply, ReplyState, RetryAffordance,
};
pub use store::{BoxedStore, DataStore, StoreHealth, StoreStatus};

/// Prelude for common imports.
pub mod prelude {
    pub use super::error::*;
    pub use super::identifier::ParsedIdentifier;
    pub use super::interaction::*;
    pub use super::store::{DataStore, StoreHealth};
}
