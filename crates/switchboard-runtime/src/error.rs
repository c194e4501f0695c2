//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `run` was called while the runtime is already running, or after it
    /// finished.
    #[error("Runtime is already running or has stopped")]
    AlreadyRunning,

    /// The runtime stopped accepting interactions.
    #[error("Ingress is closed")]
    IngressClosed,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
