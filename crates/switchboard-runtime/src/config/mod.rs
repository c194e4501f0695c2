//! Configuration for the Switchboard runtime.
//!
//! Settings are layered with figment from defaults, profile files, the main
//! config file, `SWITCHBOARD_*` environment variables and programmatic
//! overrides, then checked by [`validate_config`] before use.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    CooldownConfig, DispatchConfig, ErrorsConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
    RegistryConfig, ResolverConfig, SpanEventConfig, SwitchboardConfig,
};
pub use validation::validate_config;
