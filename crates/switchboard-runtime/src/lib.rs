//! Switchboard Runtime - configuration, logging and lifecycle.
//!
//! This crate provides:
//! - Layered configuration (`SwitchboardConfig`, `ConfigLoader`)
//! - Logging setup driven by that configuration
//! - [`SwitchboardRuntime`], which owns the registry and dispatcher, feeds
//!   interactions from an [`Ingress`] queue and stops on a shutdown signal
//!
//! ```ignore
//! use switchboard_runtime::SwitchboardRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SwitchboardRuntime::builder().build()?;
//!     runtime.registry().register_command(mine())?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, SwitchboardConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{Ingress, RuntimeBuilder, SwitchboardRuntime};

// Re-export tracing for use by handler crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
