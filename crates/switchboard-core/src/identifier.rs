//! Canonical identifier parsing.
//!
//! Component identifiers follow the `<owner>_<action>` convention, where the
//! owner is the name of the command that created the component. This module
//! is the only place an identifier is split; everything else consumes a
//! [`ParsedIdentifier`].
//!
//! # Split rule
//!
//! - The identifier is split on `_` and empty segments are discarded, so
//!   `mine__again_` parses the same as `mine_again`.
//! - The owner is always the first remaining segment.
//! - The action is every remaining segment rejoined with `_`, so
//!   `bank_deposit_all` has owner `bank` and action `deposit_all`.
//! - An identifier with a single segment has no action.
//!
//! Owners therefore cannot contain underscores; command names that need a
//! separator should use `-`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum identifier length accepted by [`is_valid_identifier`].
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// The owner/action split of a raw identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedIdentifier {
    owner: String,
    action: Option<String>,
}

impl ParsedIdentifier {
    /// Parses `raw` using the canonical split rule.
    ///
    /// Returns `None` when `raw` contains no non-empty segment.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut segments = raw.split('_').filter(|s| !s.is_empty());
        let owner = segments.next()?.to_string();
        let rest: Vec<&str> = segments.collect();
        let action = (!rest.is_empty()).then(|| rest.join("_"));
        Some(Self { owner, action })
    }

    /// The owning command name.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The sub-action tag, if any.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Rebuilds the normalized `owner_action` form.
    pub fn reconstructed(&self) -> String {
        match &self.action {
            Some(action) => format!("{}_{}", self.owner, action),
            None => self.owner.clone(),
        }
    }
}

impl fmt::Display for ParsedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reconstructed())
    }
}

/// Returns `true` if `identifier` matches `[A-Za-z0-9_-]+` and is at most
/// [`MAX_IDENTIFIER_LEN`] bytes long.
pub fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier.len() <= MAX_IDENTIFIER_LEN
        && identifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
