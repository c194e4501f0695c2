//! Error types for the Switchboard framework.

use thiserror::Error;

use crate::validation::ValidationIssue;
use switchboard_core::UnknownKind;

/// Reasons a handler or command registration is refused.
///
/// Registration never panics; callers registering in bulk log the error and
/// continue with the next module.
#[derive(Debug, Clone, Error)]
pub enum InvalidHandlerError {
    /// The identifier fails the `[A-Za-z0-9_-]+` rule or is too long.
    #[error("invalid identifier '{0}': must match [A-Za-z0-9_-]+ and be at most 100 characters")]
    InvalidIdentifier(String),

    /// The kind discriminator is not recognized.
    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),

    /// The cooldown exceeds the allowed bound.
    #[error("cooldown of {secs}s for '{identifier}' exceeds the 3600s limit")]
    CooldownTooLong {
        /// Identifier being registered.
        identifier: String,
        /// Requested cooldown.
        secs: u64,
    },

    /// Strict registration rejected a structurally invalid command.
    #[error("command '{name}' failed validation: {}", join_issues(.issues))]
    InvalidCommand {
        /// Command name.
        name: String,
        /// Every issue found.
        issues: Vec<ValidationIssue>,
    },
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for registration operations.
pub type RegistrationResult<T = ()> = Result<T, InvalidHandlerError>;

/// A handler panicked instead of returning.
///
/// The dispatcher catches the unwind and routes this error through recovery,
/// where it classifies as a critical runtime failure.
#[derive(Debug, Clone, Error)]
#[error("handler panicked: {0}")]
pub struct HandlerPanic(pub String);

impl HandlerPanic {
    /// Builds the error from a caught panic payload.
    pub fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self(message)
    }
}
