//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use switchboard_framework::{
    DispatchMessages, DispatcherOptions, RecoveryOptions, ResolverOptions,
};

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SwitchboardConfig {
    /// Logging setup.
    pub logging: LoggingConfig,
    /// Handler registration.
    pub registry: RegistryConfig,
    /// Dispatch behaviour.
    pub dispatch: DispatchConfig,
    /// Cooldown housekeeping.
    pub cooldown: CooldownConfig,
    /// Resolution cache.
    pub resolver: ResolverConfig,
    /// Error recovery.
    pub errors: ErrorsConfig,
}

impl SwitchboardConfig {
    /// Converts the dispatch-related sections into [`DispatcherOptions`].
    pub fn to_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            user_cooldown: Duration::from_secs(self.dispatch.user_cooldown_secs),
            staleness: Duration::from_secs(self.dispatch.staleness_secs),
            sweep_interval: Duration::from_secs(self.cooldown.sweep_interval_secs),
            resolver: self.resolver.to_options(),
            recovery: self.errors.to_options(),
            messages: self.dispatch.to_messages(),
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything.
    Trace,
    /// Debugging detail.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Suspicious conditions.
    Warn,
    /// Failures only.
    Error,
}

impl LogLevel {
    /// Every accepted level name.
    pub const NAMES: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// The matching `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "unknown log level '{other}', expected one of {:?}",
                Self::NAMES
            )),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line, abbreviated.
    #[default]
    Compact,
    /// Single-line with every field.
    Full,
    /// Multi-line, human-oriented.
    Pretty,
    /// Newline-delimited JSON (requires the `json-log` feature).
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// The file at `logging.file_path`.
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    /// Span creation.
    pub new: bool,
    /// Span entry.
    pub enter: bool,
    /// Span exit.
    pub exit: bool,
    /// Span close, with timing.
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level name. Kept as text so an unknown name is reported by
    /// validation rather than as a parse failure.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Destination.
    pub output: LogOutput,
    /// Span events, e.g. `close` to time each dispatch.
    pub span_events: SpanEventConfig,
    /// Include thread ids.
    pub thread_ids: bool,
    /// Include file and line.
    pub file_location: bool,
    /// Log file path for [`LogOutput::File`].
    pub file_path: Option<PathBuf>,
    /// Per-target levels, e.g. `switchboard_framework::resolver = "trace"`.
    pub filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            filters: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Parsed base level, falling back to `info` when the name is unknown.
    pub fn log_level(&self) -> LogLevel {
        self.level.parse().unwrap_or_default()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// =============================================================================
// Registry / Dispatch / Cooldown
// =============================================================================

/// Handler registration settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Refuse commands that fail structural validation instead of flagging
    /// them.
    pub strict: bool,
}

/// Dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// User-wide cooldown applied to every event; 0 disables it.
    pub user_cooldown_secs: u64,
    /// Age after which an in-flight record is pruned.
    pub staleness_secs: u64,
    /// Capacity of the runtime's ingress channel.
    pub ingress_capacity: usize,
    /// Reply sent when no handler resolves.
    pub unavailable_message: String,
    /// Reply sent while on cooldown; `{seconds}` is substituted.
    pub cooldown_message: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let messages = DispatchMessages::default();
        Self {
            user_cooldown_secs: 0,
            staleness_secs: default_staleness_secs(),
            ingress_capacity: default_ingress_capacity(),
            unavailable_message: messages.unavailable,
            cooldown_message: messages.cooldown,
        }
    }
}

impl DispatchConfig {
    fn to_messages(&self) -> DispatchMessages {
        DispatchMessages {
            unavailable: self.unavailable_message.clone(),
            cooldown: self.cooldown_message.clone(),
        }
    }
}

fn default_staleness_secs() -> u64 {
    15 * 60
}

fn default_ingress_capacity() -> usize {
    1024
}

/// Cooldown housekeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Period of the sweep that removes expired cooldowns, stale in-flight
    /// records and elapsed notification windows.
    pub sweep_interval_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
        }
    }
}

// =============================================================================
// Resolver / Errors
// =============================================================================

/// Resolution cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Entries cached before eviction starts.
    pub cache_capacity: usize,
    /// Fraction of entries evicted at capacity, in `(0, 1]`.
    pub eviction_fraction: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let options = ResolverOptions::default();
        Self {
            cache_capacity: options.cache_capacity,
            eviction_fraction: options.eviction_fraction,
        }
    }
}

impl ResolverConfig {
    /// Converts to resolver options.
    pub fn to_options(&self) -> ResolverOptions {
        ResolverOptions {
            cache_capacity: self.cache_capacity,
            eviction_fraction: self.eviction_fraction,
        }
    }
}

/// Error recovery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorsConfig {
    /// Error records kept for diagnostics.
    pub ring_capacity: usize,
    /// Window in which a repeated `(actor, context)` notification is dropped,
    /// 5 to 10 seconds.
    pub dedupe_window_secs: u64,
    /// Notifications per actor per budget window.
    pub notification_budget: u32,
    /// Rolling budget window.
    pub budget_window_secs: u64,
    /// Occurrences of one context after which warnings are logged.
    pub alert_threshold: u64,
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        let options = RecoveryOptions::default();
        Self {
            ring_capacity: options.ring_capacity,
            dedupe_window_secs: options.dedupe_window.as_secs(),
            notification_budget: options.budget,
            budget_window_secs: options.budget_window.as_secs(),
            alert_threshold: options.alert_threshold,
        }
    }
}

impl ErrorsConfig {
    /// Converts to recovery options.
    pub fn to_options(&self) -> RecoveryOptions {
        RecoveryOptions {
            ring_capacity: self.ring_capacity,
            dedupe_window: Duration::from_secs(self.dedupe_window_secs),
            budget: self.notification_budget,
            budget_window: Duration::from_secs(self.budget_window_secs),
            alert_threshold: self.alert_threshold,
        }
    }
}
