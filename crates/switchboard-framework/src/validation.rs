//! Structural validation of command modules.
//!
//! This is the pre-registration gate applied by
//! [`HandlerRegistry::register_command`](crate::registry::HandlerRegistry::register_command).
//! Every issue is collected so one pass reports everything wrong with a
//! module.

use std::collections::HashSet;

use thiserror::Error;

use crate::command::CommandModule;
use switchboard_core::{InteractionKind, is_valid_identifier};

/// Maximum length of command and option names.
pub const MAX_NAME_LEN: usize = 32;
/// Maximum length of command and option descriptions.
pub const MAX_DESCRIPTION_LEN: usize = 100;
/// Maximum number of options per command.
pub const MAX_OPTIONS: usize = 25;
/// Maximum number of choices per option.
pub const MAX_CHOICES: usize = 25;
/// Maximum length of a choice name.
pub const MAX_CHOICE_NAME_LEN: usize = 100;
/// Upper bound for any cooldown.
pub const MAX_COOLDOWN_SECS: u64 = 3600;

/// A single structural problem found in a command module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    /// Command name is empty or too long.
    #[error("name must be 1-32 characters, got {0}")]
    NameLength(usize),

    /// Command name contains characters outside `[A-Za-z0-9_-]`.
    #[error("name '{0}' may only contain letters, digits, '_' and '-'")]
    NamePattern(String),

    /// A module owning components has an underscore in its name, which the
    /// identifier split rule cannot route back.
    #[error("name '{0}' owns components and must not contain '_'")]
    OwnerDelimiter(String),

    /// Description is empty or too long.
    #[error("description must be 1-100 characters, got {0}")]
    DescriptionLength(usize),

    /// Too many options.
    #[error("at most 25 options are allowed, got {0}")]
    TooManyOptions(usize),

    /// Two options share a name.
    #[error("option '{0}' is declared more than once")]
    DuplicateOption(String),

    /// An option name is invalid.
    #[error("option '{option}' has an invalid name (1-32 of [A-Za-z0-9_-])")]
    OptionName {
        /// The offending option.
        option: String,
    },

    /// An option description is empty or too long.
    #[error("option '{option}' description must be 1-100 characters, got {len}")]
    OptionDescription {
        /// The offending option.
        option: String,
        /// Actual length.
        len: usize,
    },

    /// An option declares too many choices.
    #[error("option '{option}' has {count} choices, at most 25 are allowed")]
    TooManyChoices {
        /// The offending option.
        option: String,
        /// Actual count.
        count: usize,
    },

    /// A choice name is empty or too long.
    #[error("option '{option}' has a choice name of {len} characters (1-100)")]
    ChoiceName {
        /// The offending option.
        option: String,
        /// Actual length.
        len: usize,
    },

    /// The cooldown exceeds [`MAX_COOLDOWN_SECS`].
    #[error("cooldown of {0}s exceeds the 3600s limit")]
    CooldownTooLong(u64),

    /// A component action would produce an invalid identifier.
    #[error("{kind} action '{action}' does not form a valid identifier")]
    ComponentAction {
        /// Component kind.
        kind: InteractionKind,
        /// The offending action.
        action: String,
    },
}

/// Returns `true` if `name` matches `[\w-]{1,32}`.
pub fn is_valid_name(name: &str) -> bool {
    (1..=MAX_NAME_LEN).contains(&name.chars().count())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validates `module`, returning every issue found.
pub fn validate_command(module: &CommandModule) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let name = module.name();

    let name_len = name.chars().count();
    if !(1..=MAX_NAME_LEN).contains(&name_len) {
        issues.push(ValidationIssue::NameLength(name_len));
    } else if !is_valid_name(name) {
        issues.push(ValidationIssue::NamePattern(name.to_string()));
    }
    if module.has_components() && name.contains('_') {
        issues.push(ValidationIssue::OwnerDelimiter(name.to_string()));
    }

    let description_len = module.description_text().chars().count();
    if !(1..=MAX_DESCRIPTION_LEN).contains(&description_len) {
        issues.push(ValidationIssue::DescriptionLength(description_len));
    }

    if let Some(secs) = module.cooldown_seconds().filter(|secs| *secs > MAX_COOLDOWN_SECS) {
        issues.push(ValidationIssue::CooldownTooLong(secs));
    }

    let options = module.options();
    if options.len() > MAX_OPTIONS {
        issues.push(ValidationIssue::TooManyOptions(options.len()));
    }

    let mut seen = HashSet::new();
    for option in options {
        if !seen.insert(option.name.as_str()) {
            issues.push(ValidationIssue::DuplicateOption(option.name.clone()));
        }
        if !is_valid_name(&option.name) {
            issues.push(ValidationIssue::OptionName {
                option: option.name.clone(),
            });
        }
        let len = option.description.chars().count();
        if !(1..=MAX_DESCRIPTION_LEN).contains(&len) {
            issues.push(ValidationIssue::OptionDescription {
                option: option.name.clone(),
                len,
            });
        }
        if option.choices.len() > MAX_CHOICES {
            issues.push(ValidationIssue::TooManyChoices {
                option: option.name.clone(),
                count: option.choices.len(),
            });
        }
        for choice in &option.choices {
            let len = choice.name.chars().count();
            if !(1..=MAX_CHOICE_NAME_LEN).contains(&len) {
                issues.push(ValidationIssue::ChoiceName {
                    option: option.name.clone(),
                    len,
                });
            }
        }
    }

    for (kind, action) in module.component_keys() {
        if !is_valid_identifier(&format!("{name}_{action}")) {
            issues.push(ValidationIssue::ComponentAction {
                kind,
                action: action.to_string(),
            });
        }
    }

    issues
}
