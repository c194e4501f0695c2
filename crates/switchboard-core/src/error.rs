//! Unified error types for the Switchboard core.
//!
//! This module provides the error types shared by transports, data stores and
//! handlers. Registration errors live in `switchboard-framework`.

use thiserror::Error;

// =============================================================================
// Kind Errors
// =============================================================================

/// Returned when a raw kind discriminator does not name a known
/// [`InteractionKind`](crate::InteractionKind).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown interaction kind '{0}'")]
pub struct UnknownKind(pub String);

// =============================================================================
// Reply Errors
// =============================================================================

/// Errors that can occur while acknowledging an interaction.
#[derive(Debug, Clone, Error)]
pub enum ReplyError {
    /// The interaction was already acknowledged.
    #[error("interaction has already been acknowledged")]
    AlreadyAcknowledged,

    /// The interaction token expired or was superseded.
    #[error("interaction expired or unknown")]
    Expired,

    /// The reply was rejected by the transport.
    #[error("transport error: reply rejected ({code}): {message}")]
    Rejected {
        /// Transport specific error code.
        code: i64,
        /// Transport message.
        message: String,
    },

    /// The transport could not deliver the reply.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ReplyError {
    /// Returns `true` when the primary acknowledgement path is gone and a
    /// follow-up is the only remaining channel.
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::AlreadyAcknowledged | Self::Expired)
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors raised by a [`DataStore`](crate::DataStore).
///
/// Failures with a `StoreError` anywhere in their chain are classified as
/// storage errors, however the handler wraps them.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing database is unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The record does not exist.
    #[error("storage record not found: {0}")]
    NotFound(String),

    /// The stored data could not be decoded or encoded.
    #[error("storage serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Coded Errors
// =============================================================================

/// A handler failure carrying a transport or OS error code.
///
/// Handlers return `anyhow::Result<()>`; wrapping a failure in `CodedError`
/// lets the classifier see the code alongside the message.
///
/// ```rust,ignore
/// return Err(CodedError::new("50013", "Missing Permissions").into());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CodedError {
    /// Error code, e.g. `"50013"` or `"ECONNREFUSED"`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl CodedError {
    /// Creates a coded error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for reply operations.
pub type ReplyResult<T> = Result<T, ReplyError>;

/// Result type for data store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type returned by handlers.
pub type HandlerResult = anyhow::Result<()>;
