//! Command modules.
//!
//! A [`CommandModule`] is the unit a feature registers: the command itself plus
//! every component handler it owns. Component handlers are stored in typed
//! tables per [`InteractionKind`] and exposed through
//! [`ComponentHandlerProvider`], so the resolver never looks anything up by
//! reflection.
//!
//! ```rust,ignore
//! let mine = CommandModule::new("mine", mine_command)
//!     .description("Dig for ore")
//!     .cooldown_secs(3)
//!     .button("again", mine_again)
//!     .button("stats", mine_stats)
//!     .select_menu("tool", pick_tool)
//!     .fallback(InteractionKind::Button, stale_mine_button);
//!
//! registry.register_command(mine)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::InteractionContext;
use crate::handler::{BoxedHandler, Handler, into_handler};
use switchboard_core::InteractionKind;

/// Key looked up in a component table when the exact action is missing.
pub const DEFAULT_ACTION: &str = "default";

/// A predicate that must pass before any handler of a module runs.
///
/// `Err` carries the reason shown to the actor.
pub type Requirement = Arc<dyn Fn(&InteractionContext) -> Result<(), String> + Send + Sync>;

/// Value type of a command option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    /// Free text.
    String,
    /// Whole number.
    Integer,
    /// Floating point number.
    Number,
    /// True or false.
    Boolean,
    /// A user mention.
    User,
}

/// A predefined choice for a command option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChoice {
    /// Display name of the choice.
    pub name: String,
    /// Value sent when chosen.
    pub value: serde_json::Value,
}

/// A declared command option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOption {
    /// Option name.
    pub name: String,
    /// Option description.
    pub description: String,
    /// Value type.
    pub kind: OptionType,
    /// Whether the option must be provided.
    #[serde(default)]
    pub required: bool,
    /// Predefined choices.
    #[serde(default)]
    pub choices: Vec<OptionChoice>,
}

impl CommandOption {
    /// Creates an optional option.
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: OptionType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required: false,
            choices: Vec::new(),
        }
    }

    /// Marks the option as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Adds a predefined choice.
    pub fn choice(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.choices.push(OptionChoice {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

/// Access to the component handlers a command owns.
///
/// Implemented by [`CommandModule`]; the resolver depends only on this trait.
pub trait ComponentHandlerProvider: Send + Sync {
    /// Handler registered for `action` under `kind`.
    fn component_handler(&self, kind: InteractionKind, action: &str) -> Option<&BoxedHandler>;

    /// Catch-all handler for `kind`.
    fn fallback_handler(&self, kind: InteractionKind) -> Option<&BoxedHandler>;
}

/// A command and the handlers it owns.
pub struct CommandModule {
    name: String,
    description: String,
    options: Vec<CommandOption>,
    cooldown_secs: Option<u64>,
    execute: BoxedHandler,
    autocomplete: Option<BoxedHandler>,
    context_menu: Option<BoxedHandler>,
    components: HashMap<InteractionKind, HashMap<String, BoxedHandler>>,
    fallbacks: HashMap<InteractionKind, BoxedHandler>,
    requirements: Vec<(String, Requirement)>,
}

impl CommandModule {
    /// Creates a module named `name` whose command runs `execute`.
    pub fn new<H, R>(name: impl Into<String>, execute: H) -> Self
    where
        H: Handler<R>,
        R: 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            options: Vec::new(),
            cooldown_secs: None,
            execute: into_handler(execute),
            autocomplete: None,
            context_menu: None,
            components: HashMap::new(),
            fallbacks: HashMap::new(),
            requirements: Vec::new(),
        }
    }

    /// Sets the command description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares an option.
    pub fn option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    /// Sets the per-identifier, per-actor cooldown.
    pub fn cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = Some(secs);
        self
    }

    /// Registers a button handler for `action`.
    pub fn button<H, R>(self, action: impl Into<String>, handler: H) -> Self
    where
        H: Handler<R>,
        R: 'static,
    {
        self.component(InteractionKind::Button, action, handler)
    }

    /// Registers a select-menu handler for `action`.
    pub fn select_menu<H, R>(self, action: impl Into<String>, handler: H) -> Self
    where
        H: Handler<R>,
        R: 'static,
    {
        self.component(InteractionKind::SelectMenu, action, handler)
    }

    /// Registers a modal handler for `action`.
    pub fn modal<H, R>(self, action: impl Into<String>, handler: H) -> Self
    where
        H: Handler<R>,
        R: 'static,
    {
        self.component(InteractionKind::Modal, action, handler)
    }

    /// Registers a component handler of any component kind.
    pub fn component<H, R>(mut self, kind: InteractionKind, action: impl Into<String>, handler: H) -> Self
    where
        H: Handler<R>,
        R: 'static,
    {
        self.components
            .entry(kind)
            .or_default()
            .insert(action.into(), into_handler(handler));
        self
    }

    /// Registers the catch-all handler for `kind`.
    pub fn fallback<H, R>(mut self, kind: InteractionKind, handler: H) -> Self
    where
        H: Handler<R>,
        R: 'static,
    {
        self.fallbacks.insert(kind, into_handler(handler));
        self
    }

    /// Registers the autocomplete handler.
    pub fn autocomplete<H, R>(mut self, handler: H) -> Self
    where
        H: Handler<R>,
        R: 'static,
    {
        self.autocomplete = Some(into_handler(handler));
        self
    }

    /// Registers a context-menu handler under the command name.
    pub fn context_menu<H, R>(mut self, handler: H) -> Self
    where
        H: Handler<R>,
        R: 'static,
    {
        self.context_menu = Some(into_handler(handler));
        self
    }

    /// Adds a requirement evaluated before any of this module's handlers.
    pub fn requirement<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&InteractionContext) -> Result<(), String> + Send + Sync + 'static,
    {
        self.requirements.push((name.into(), Arc::new(check)));
        self
    }

    /// The command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The command description.
    pub fn description_text(&self) -> &str {
        &self.description
    }

    /// Declared options.
    pub fn options(&self) -> &[CommandOption] {
        &self.options
    }

    /// Configured cooldown in whole seconds.
    pub fn cooldown_seconds(&self) -> Option<u64> {
        self.cooldown_secs
    }

    /// Configured cooldown; `None` when unset or zero.
    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// The command handler.
    pub fn execute_handler(&self) -> &BoxedHandler {
        &self.execute
    }

    /// The autocomplete handler, if any.
    pub fn autocomplete_handler(&self) -> Option<&BoxedHandler> {
        self.autocomplete.as_ref()
    }

    /// The context-menu handler, if any.
    pub fn context_menu_handler(&self) -> Option<&BoxedHandler> {
        self.context_menu.as_ref()
    }

    /// Every `(kind, action)` pair in the component tables.
    pub fn component_keys(&self) -> impl Iterator<Item = (InteractionKind, &str)> {
        self.components
            .iter()
            .flat_map(|(kind, table)| table.keys().map(move |action| (*kind, action.as_str())))
    }

    /// Returns `true` if the module owns any component or fallback handler.
    pub fn has_components(&self) -> bool {
        !self.components.is_empty() || !self.fallbacks.is_empty()
    }

    /// Evaluates every requirement in declaration order, stopping at the
    /// first failure.
    pub fn check_requirements(&self, ctx: &InteractionContext) -> Result<(), String> {
        self.requirements
            .iter()
            .try_for_each(|(_, check)| check(ctx))
    }
}

impl ComponentHandlerProvider for CommandModule {
    fn component_handler(&self, kind: InteractionKind, action: &str) -> Option<&BoxedHandler> {
        self.components.get(&kind).and_then(|table| table.get(action))
    }

    fn fallback_handler(&self, kind: InteractionKind) -> Option<&BoxedHandler> {
        self.fallbacks.get(&kind)
    }
}

impl std::fmt::Debug for CommandModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandModule")
            .field("name", &self.name)
            .field("options", &self.options.len())
            .field("cooldown_secs", &self.cooldown_secs)
            .field("components", &self.component_keys().count())
            .field("fallbacks", &self.fallbacks.keys().collect::<Vec<_>>())
            .field(
                "requirements",
                &self.requirements.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_ctx: Arc<InteractionContext>) {}

    #[test]
    fn test_component_tables_are_per_kind() {
        let module = CommandModule::new("mine", noop)
            .button("again", noop)
            .select_menu("tool", noop);

        assert!(module.component_handler(InteractionKind::Button, "again").is_some());
        assert!(module.component_handler(InteractionKind::SelectMenu, "again").is_none());
        assert!(module.component_handler(InteractionKind::SelectMenu, "tool").is_some());
        assert_eq!(module.component_keys().count(), 2);
    }

    #[test]
    fn test_fallback_lookup() {
        let module = CommandModule::new("hunt", noop).fallback(InteractionKind::Button, noop);
        assert!(module.fallback_handler(InteractionKind::Button).is_some());
        assert!(module.fallback_handler(InteractionKind::Modal).is_none());
        assert!(module.has_components());
    }

    #[test]
    fn test_zero_cooldown_means_none() {
        let module = CommandModule::new("fish", noop).cooldown_secs(0);
        assert_eq!(module.cooldown_seconds(), Some(0));
        assert_eq!(module.cooldown(), None);
    }
}
