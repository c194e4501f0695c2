//! Error classification.
//!
//! [`classify`] is a pure function of an error's message, code and trace. The
//! categories are tried in a fixed order and the first whose signature
//! matches wins:
//!
//! ```text
//! criticalRuntime → fatalProtocol → permission → timeout → rateLimit
//!     → validation → storage → network → transportGeneric → generic
//! ```
//!
//! Matching is case-insensitive substring search. Failures raised by a
//! [`DataStore`](switchboard_core::DataStore) carry the [`STORE_FAILURE_CODE`]
//! and are classified as storage right after the two escalated categories,
//! whatever their message says. Every category has a [`RecoveryAction`]
//! template describing what the actor is told.

use std::fmt;

use serde::{Deserialize, Serialize};

use switchboard_core::{CodedError, ReplyError, StoreError};

// ============================================================================
// Categories
// ============================================================================

/// Category assigned to a handler failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    /// Memory exhaustion, stack overflow, panics.
    CriticalRuntime,
    /// Unrecoverable transport authentication or intent errors.
    FatalProtocol,
    /// The bot lacks a permission.
    Permission,
    /// An operation timed out.
    Timeout,
    /// A rate limit was hit.
    RateLimit,
    /// Input was rejected.
    Validation,
    /// The data store failed.
    Storage,
    /// The network failed.
    Network,
    /// An otherwise unclassified failure inside the transport library.
    TransportGeneric,
    /// Everything else.
    Generic,
}

impl ErrorCategory {
    /// Every category in precedence order.
    pub const PRECEDENCE: [ErrorCategory; 10] = [
        ErrorCategory::CriticalRuntime,
        ErrorCategory::FatalProtocol,
        ErrorCategory::Permission,
        ErrorCategory::Timeout,
        ErrorCategory::RateLimit,
        ErrorCategory::Validation,
        ErrorCategory::Storage,
        ErrorCategory::Network,
        ErrorCategory::TransportGeneric,
        ErrorCategory::Generic,
    ];

    /// Name used in logs and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CriticalRuntime => "criticalRuntime",
            Self::FatalProtocol => "fatalProtocol",
            Self::Permission => "permission",
            Self::Timeout => "timeout",
            Self::RateLimit => "rateLimit",
            Self::Validation => "validation",
            Self::Storage => "storage",
            Self::Network => "network",
            Self::TransportGeneric => "transportGeneric",
            Self::Generic => "generic",
        }
    }

    /// Severity of the category.
    pub fn severity(&self) -> Severity {
        match self {
            Self::CriticalRuntime | Self::FatalProtocol => Severity::Critical,
            Self::Storage => Severity::High,
            Self::Permission | Self::Timeout | Self::Network | Self::TransportGeneric | Self::Generic => {
                Severity::Medium
            }
            Self::RateLimit | Self::Validation => Severity::Low,
        }
    }

    /// Whether retrying the same action can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::RateLimit
                | Self::Storage
                | Self::Network
                | Self::TransportGeneric
                | Self::Generic
        )
    }

    /// Whether the failure is escalated to process-level diagnostics.
    pub fn is_escalated(&self) -> bool {
        matches!(self, Self::CriticalRuntime | Self::FatalProtocol)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a classified failure, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected, actor-caused.
    Low,
    /// Transient or environmental.
    Medium,
    /// A dependency is failing.
    High,
    /// The process itself is unhealthy.
    Critical,
}

impl Severity {
    /// Log tag for the severity.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Low => "yellow",
            Self::Medium => "orange",
            Self::High => "red",
            Self::Critical => "darkred",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// Matched category.
    pub category: ErrorCategory,
    /// Category severity.
    pub severity: Severity,
    /// Whether a retry affordance is offered.
    pub retryable: bool,
    /// Whether the actor is shown a category-specific explanation.
    pub user_friendly: bool,
}

impl From<ErrorCategory> for Classification {
    fn from(category: ErrorCategory) -> Self {
        Self {
            category,
            severity: category.severity(),
            retryable: category.is_retryable(),
            user_friendly: !category.is_escalated(),
        }
    }
}

// ============================================================================
// Signatures
// ============================================================================

const CRITICAL_MESSAGES: &[&str] = &[
    "out of memory",
    "memory allocation",
    "allocation failed",
    "stack overflow",
    "maximum call stack",
    "handler panicked",
];
const CRITICAL_CODES: &[&str] = &["enomem", "err_worker_out_of_memory"];

const FATAL_MESSAGES: &[&str] = &[
    "disallowed intent",
    "invalid intent",
    "invalid token",
    "authentication failed",
    "invalid api version",
    "sharding required",
];
const FATAL_CODES: &[&str] = &["4004", "4010", "4011", "4012", "4013", "4014", "tokeninvalid"];

const PERMISSION_MESSAGES: &[&str] = &[
    "missing permissions",
    "missing access",
    "permission denied",
    "forbidden",
    "not permitted",
];
const PERMISSION_CODES: &[&str] = &["50001", "50013", "403", "eacces", "eperm"];

const TIMEOUT_MESSAGES: &[&str] = &["timeout", "timed out", "deadline exceeded"];
const TIMEOUT_CODES: &[&str] = &["etimedout", "esockettimedout", "und_err_connect_timeout"];

const RATE_LIMIT_MESSAGES: &[&str] = &["rate limit", "ratelimit", "rate-limit", "too many requests"];
const RATE_LIMIT_CODES: &[&str] = &["429", "20028", "30001"];

const VALIDATION_MESSAGES: &[&str] = &[
    "invalid",
    "validation",
    "malformed",
    "must be",
    "out of range",
    "invalid form body",
];
const VALIDATION_CODES: &[&str] = &["50035", "50006", "400"];

const STORAGE_MESSAGES: &[&str] = &[
    "database",
    "storage",
    "sqlite",
    "postgres",
    "mongo",
    "redis",
    "query failed",
    "constraint",
    "deadlock",
];
/// Code [`ErrorSignature::from_error`] assigns when a [`StoreError`] is in the
/// error chain.
pub const STORE_FAILURE_CODE: &str = "storage";

const STORAGE_CODES: &[&str] = &[
    STORE_FAILURE_CODE,
    "sqlite_busy",
    "sqlite_locked",
    "23505",
    "40p01",
];

const NETWORK_MESSAGES: &[&str] = &[
    "network",
    "connection refused",
    "connection reset",
    "socket hang up",
    "dns",
    "getaddrinfo",
    "host unreachable",
    "broken pipe",
];
const NETWORK_CODES: &[&str] = &[
    "econnrefused",
    "econnreset",
    "enotfound",
    "eai_again",
    "ehostunreach",
    "epipe",
];

const TRANSPORT_TRACES: &[&str] = &["transport error", "gateway", "websocket", "http client"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn code_matches(code: Option<&str>, codes: &[&str]) -> bool {
    code.is_some_and(|code| codes.contains(&code))
}

/// Classifies a failure by its message, optional code and optional trace.
///
/// The same inputs always produce the same result.
pub fn classify(message: &str, code: Option<&str>, trace: Option<&str>) -> Classification {
    let message = message.to_lowercase();
    let code = code.map(str::to_lowercase);
    let code = code.as_deref();
    let trace = trace.map(str::to_lowercase).unwrap_or_default();

    let matches = |messages: &[&str], codes: &[&str]| {
        contains_any(&message, messages) || code_matches(code, codes)
    };

    let category = if matches(CRITICAL_MESSAGES, CRITICAL_CODES) {
        ErrorCategory::CriticalRuntime
    } else if matches(FATAL_MESSAGES, FATAL_CODES) {
        ErrorCategory::FatalProtocol
    } else if code == Some(STORE_FAILURE_CODE) {
        ErrorCategory::Storage
    } else if matches(PERMISSION_MESSAGES, PERMISSION_CODES) {
        ErrorCategory::Permission
    } else if matches(TIMEOUT_MESSAGES, TIMEOUT_CODES) {
        ErrorCategory::Timeout
    } else if matches(RATE_LIMIT_MESSAGES, RATE_LIMIT_CODES) {
        ErrorCategory::RateLimit
    } else if matches(VALIDATION_MESSAGES, VALIDATION_CODES) {
        ErrorCategory::Validation
    } else if matches(STORAGE_MESSAGES, STORAGE_CODES) {
        ErrorCategory::Storage
    } else if matches(NETWORK_MESSAGES, NETWORK_CODES) {
        ErrorCategory::Network
    } else if contains_any(&trace, TRANSPORT_TRACES) {
        ErrorCategory::TransportGeneric
    } else {
        ErrorCategory::Generic
    };

    Classification::from(category)
}

/// The parts of an [`anyhow::Error`] the classifier reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSignature {
    /// Outermost message.
    pub message: String,
    /// First code found in the error chain.
    pub code: Option<String>,
    /// Every message in the chain, one per line.
    pub trace: String,
}

impl ErrorSignature {
    /// Extracts the signature of `err`.
    ///
    /// The code comes from the first [`CodedError`], rejected [`ReplyError`]
    /// or [`StoreError`] in the chain. A store error yields
    /// [`STORE_FAILURE_CODE`].
    pub fn from_error(err: &anyhow::Error) -> Self {
        let code = err.chain().find_map(|cause| {
            if let Some(coded) = cause.downcast_ref::<CodedError>() {
                return Some(coded.code.clone());
            }
            if cause.downcast_ref::<StoreError>().is_some() {
                return Some(STORE_FAILURE_CODE.to_string());
            }
            match cause.downcast_ref::<ReplyError>() {
                Some(ReplyError::Rejected { code, .. }) => Some(code.to_string()),
                _ => None,
            }
        });
        let trace = err
            .chain()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            message: err.to_string(),
            code,
            trace,
        }
    }

    /// Classifies this signature.
    pub fn classify(&self) -> Classification {
        classify(&self.message, self.code.as_deref(), Some(&self.trace))
    }
}

// ============================================================================
// Recovery templates
// ============================================================================

/// What the actor is told for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryAction {
    /// User-facing message.
    pub message: &'static str,
    /// Whether a retry affordance is attached.
    pub offer_retry: bool,
    /// Log tag.
    pub tag: &'static str,
}

/// Message used when nothing better can be said.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong while handling that. Please try again later.";

/// Minimal message used when the rich recovery reply cannot be delivered.
pub const PLAINTEXT_FALLBACK_MESSAGE: &str = "An error occurred.";

/// Returns the recovery template for `category`.
pub fn recovery_action(category: ErrorCategory) -> RecoveryAction {
    let message = match category {
        ErrorCategory::CriticalRuntime | ErrorCategory::FatalProtocol => GENERIC_FAILURE_MESSAGE,
        ErrorCategory::Permission => {
            "I don't have the permissions needed for that here. Ask a server admin to check my role."
        }
        ErrorCategory::Timeout => "That took too long to finish. Please try again.",
        ErrorCategory::RateLimit => "Things are busy right now. Please wait a moment and try again.",
        ErrorCategory::Validation => "Some of that input wasn't valid. Check it and try again.",
        ErrorCategory::Storage => "I couldn't reach your saved data. Your progress is safe, please try again.",
        ErrorCategory::Network => "A connection problem interrupted that. Please try again.",
        ErrorCategory::TransportGeneric => "The chat service had trouble with that request. Please try again.",
        ErrorCategory::Generic => GENERIC_FAILURE_MESSAGE,
    };
    RecoveryAction {
        message,
        offer_retry: category.is_retryable(),
        tag: category.severity().tag(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerPanic;

    fn category(message: &str) -> ErrorCategory {
        classify(message, None, None).category
    }

    #[test]
    fn test_required_signatures() {
        assert_eq!(category("Missing Permissions"), ErrorCategory::Permission);
        assert_eq!(category("request timeout after 3000ms"), ErrorCategory::Timeout);
        assert_eq!(category("Database connection failed"), ErrorCategory::Storage);
    }

    #[test]
    fn test_precedence_first_match_wins() {
        // Both permission and timeout signatures present.
        assert_eq!(
            category("missing permissions: request timed out"),
            ErrorCategory::Permission
        );
        // Storage beats network.
        assert_eq!(category("database connection refused"), ErrorCategory::Storage);
        // Fatal beats validation despite "invalid".
        assert_eq!(category("An invalid token was provided"), ErrorCategory::FatalProtocol);
        assert_eq!(category("JavaScript heap out of memory"), ErrorCategory::CriticalRuntime);
    }

    #[test]
    fn test_codes_and_trace() {
        let c = classify("request failed", Some("50013"), None);
        assert_eq!(c.category, ErrorCategory::Permission);
        let c = classify("request failed", Some("ECONNRESET"), None);
        assert_eq!(c.category, ErrorCategory::Network);
        let c = classify("request failed", None, Some("at transport error: 502"));
        assert_eq!(c.category, ErrorCategory::TransportGeneric);
        assert_eq!(category("request failed"), ErrorCategory::Generic);
    }

    #[test]
    fn test_deterministic() {
        let first = classify("weird thing", Some("E1"), None);
        for _ in 0..5 {
            assert_eq!(classify("weird thing", Some("E1"), None), first);
        }
    }

    #[test]
    fn test_escalated_categories_are_not_retryable() {
        for category in [ErrorCategory::CriticalRuntime, ErrorCategory::FatalProtocol] {
            let classification = Classification::from(category);
            assert!(!classification.retryable);
            assert!(!classification.user_friendly);
            assert_eq!(classification.severity, Severity::Critical);
            let action = recovery_action(category);
            assert!(!action.offer_retry);
            assert_eq!(action.message, GENERIC_FAILURE_MESSAGE);
        }
        assert!(recovery_action(ErrorCategory::Storage).offer_retry);
        assert!(!recovery_action(ErrorCategory::Permission).offer_retry);
    }

    #[test]
    fn test_signature_reads_chain() {
        let err = anyhow::Error::new(CodedError::new("50013", "request failed"))
            .context("while opening the shop");
        let signature = ErrorSignature::from_error(&err);
        assert_eq!(signature.message, "while opening the shop");
        assert_eq!(signature.code.as_deref(), Some("50013"));
        assert!(signature.trace.contains("request failed"));
        assert_eq!(signature.classify().category, ErrorCategory::Permission);

        let panic = anyhow::Error::new(HandlerPanic("index out of bounds".into()));
        assert_eq!(
            ErrorSignature::from_error(&panic).classify().category,
            ErrorCategory::CriticalRuntime
        );
    }

    #[test]
    fn test_store_errors_classify_as_storage() {
        // Wrapped in handler context.
        let err = anyhow::Error::new(StoreError::Unavailable("store is offline".into()))
            .context("loading player profile");
        let signature = ErrorSignature::from_error(&err);
        assert_eq!(signature.code.as_deref(), Some(STORE_FAILURE_CODE));
        assert_eq!(signature.classify().category, ErrorCategory::Storage);

        // Store messages that would otherwise match earlier categories.
        for store_err in [
            StoreError::Serialization("update for 'U1' must be a JSON object".into()),
            StoreError::Serialization("invalid type: integer, expected a map".into()),
            StoreError::Unavailable("connection timeout".into()),
        ] {
            let err = anyhow::Error::new(store_err);
            assert_eq!(
                ErrorSignature::from_error(&err).classify().category,
                ErrorCategory::Storage
            );
        }

        // Escalated categories still come first.
        let err = anyhow::Error::new(StoreError::Unavailable("out of memory".into()));
        assert_eq!(
            ErrorSignature::from_error(&err).classify().category,
            ErrorCategory::CriticalRuntime
        );
    }

    #[test]
    fn test_category_serializes_camel_case() {
        let json = serde_json::to_string(&ErrorCategory::RateLimit).unwrap();
        assert_eq!(json, "\"rateLimit\"");
    }
}
