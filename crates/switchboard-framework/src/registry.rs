//! Handler registry.
//!
//! [`HandlerRegistry`] stores handlers in one table per [`InteractionKind`],
//! keyed by identifier, together with the [`CommandModule`]s they were
//! derived from and one optional process-wide default per kind.
//!
//! The registry is written during bootstrap and read on every dispatch, so the
//! tables sit behind read-write locks. Every mutation bumps a generation
//! counter that the resolver uses to invalidate its cache.
//!
//! ```rust,ignore
//! let registry = HandlerRegistry::new(false);
//!
//! registry.register(
//!     InteractionKind::Button,
//!     "hunt_start",
//!     into_handler(hunt_start),
//!     RegisterOptions::default(),
//! )?;
//!
//! let report = registry.register_commands([mine_module(), fish_module()]);
//! info!("{report}");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::command::CommandModule;
use crate::error::{InvalidHandlerError, RegistrationResult};
use crate::handler::BoxedHandler;
use crate::validation::{MAX_COOLDOWN_SECS, ValidationIssue, validate_command};
use switchboard_core::{InteractionKind, ParsedIdentifier, is_valid_identifier};

/// Options accepted by [`HandlerRegistry::register`].
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Cooldown in seconds, at most 3600.
    pub cooldown_secs: Option<u64>,
    /// Command that owns this handler, used for requirements.
    pub owner: Option<String>,
}

impl RegisterOptions {
    /// Sets the cooldown.
    pub fn cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = Some(secs);
        self
    }

    /// Sets the owning command.
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// A registered unit of behaviour.
pub struct HandlerEntry {
    kind: InteractionKind,
    identifier: String,
    handler: BoxedHandler,
    cooldown: Option<Duration>,
    owner: Option<String>,
    flagged: bool,
}

impl HandlerEntry {
    /// The kind this entry answers.
    pub fn kind(&self) -> InteractionKind {
        self.kind
    }

    /// The identifier this entry is registered under.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The registered callback.
    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    /// The entry's cooldown, if any.
    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    /// The owning command, if any.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// `true` if the entry was force-registered despite validation issues.
    pub fn is_flagged(&self) -> bool {
        self.flagged
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("kind", &self.kind)
            .field("identifier", &self.identifier)
            .field("cooldown", &self.cooldown)
            .field("owner", &self.owner)
            .field("flagged", &self.flagged)
            .finish_non_exhaustive()
    }
}

/// Outcome of registering one command module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredCommand {
    /// Command name.
    pub name: String,
    /// Issues the module was force-registered with. Empty when clean.
    pub issues: Vec<ValidationIssue>,
}

impl RegisteredCommand {
    /// `true` if the module was registered despite validation issues.
    pub fn is_flagged(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Summary of a bulk registration.
#[derive(Debug, Default)]
pub struct RegistrationReport {
    /// Modules registered cleanly.
    pub registered: Vec<String>,
    /// Modules force-registered with validation issues.
    pub flagged: Vec<RegisteredCommand>,
    /// Modules that were refused.
    pub rejected: Vec<(String, InvalidHandlerError)>,
}

impl RegistrationReport {
    /// `true` if every module was registered.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl fmt::Display for RegistrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Commands: {} registered, {} flagged, {} rejected",
            self.registered.len(),
            self.flagged.len(),
            self.rejected.len()
        )
    }
}

type Table = HashMap<String, Arc<HandlerEntry>>;

/// Storage for every handler the dispatcher can reach.
pub struct HandlerRegistry {
    tables: RwLock<HashMap<InteractionKind, Table>>,
    commands: RwLock<HashMap<String, Arc<CommandModule>>>,
    defaults: RwLock<HashMap<InteractionKind, BoxedHandler>>,
    generation: AtomicU64,
    strict: bool,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    ///
    /// In `strict` mode commands failing structural validation are refused;
    /// otherwise they are registered and flagged.
    pub fn new(strict: bool) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            commands: RwLock::new(HashMap::new()),
            defaults: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            strict,
        }
    }

    /// Returns `true` in strict mode.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Monotonic counter bumped by every mutation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    // ─── Handler registration ───────────────────────────────────────────────

    /// Registers `handler` for `(kind, identifier)`.
    ///
    /// An existing entry under the same key is replaced with a warning.
    pub fn register(
        &self,
        kind: InteractionKind,
        identifier: &str,
        handler: BoxedHandler,
        options: RegisterOptions,
    ) -> RegistrationResult {
        if !is_valid_identifier(identifier) {
            warn!(%kind, identifier, "Rejected handler with invalid identifier");
            return Err(InvalidHandlerError::InvalidIdentifier(identifier.to_string()));
        }
        if let Some(secs) = options.cooldown_secs.filter(|s| *s > MAX_COOLDOWN_SECS) {
            warn!(%kind, identifier, secs, "Rejected handler with excessive cooldown");
            return Err(InvalidHandlerError::CooldownTooLong {
                identifier: identifier.to_string(),
                secs,
            });
        }

        self.insert(HandlerEntry {
            kind,
            identifier: identifier.to_string(),
            handler,
            cooldown: options
                .cooldown_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            owner: options.owner,
            flagged: false,
        });
        Ok(())
    }

    /// Registers a handler whose kind is given as a raw discriminator.
    pub fn register_named(
        &self,
        kind: &str,
        identifier: &str,
        handler: BoxedHandler,
        options: RegisterOptions,
    ) -> RegistrationResult {
        let kind = InteractionKind::from_str(kind).inspect_err(|e| {
            warn!(identifier, error = %e, "Rejected handler with unknown kind");
        })?;
        self.register(kind, identifier, handler, options)
    }

    fn insert(&self, entry: HandlerEntry) {
        let kind = entry.kind;
        let identifier = entry.identifier.clone();
        let flagged = entry.flagged;
        let previous = self
            .tables
            .write()
            .entry(kind)
            .or_default()
            .insert(identifier.clone(), Arc::new(entry));
        self.bump();

        if previous.is_some() {
            warn!(%kind, identifier = %identifier, "Handler re-registered, previous entry replaced");
        } else {
            debug!(%kind, identifier = %identifier, flagged, "Handler registered");
        }
    }

    /// Installs the process-wide default handler for `kind`, used when no
    /// other resolution step matches.
    pub fn set_default(&self, kind: InteractionKind, handler: BoxedHandler) {
        if self.defaults.write().insert(kind, handler).is_some() {
            warn!(%kind, "Default handler replaced");
        }
        self.bump();
    }

    // ─── Command registration ───────────────────────────────────────────────

    /// Registers a command module and derives its registry entries.
    ///
    /// The command handler is registered under the command name in the
    /// [`InteractionKind::Command`] table, and likewise for the optional
    /// autocomplete and context-menu handlers. Component handlers stay in the
    /// module's own tables and are reached through resolution.
    pub fn register_command(&self, module: CommandModule) -> RegistrationResult<RegisteredCommand> {
        let name = module.name().to_string();
        let issues = validate_command(&module);

        if !issues.is_empty() {
            if self.strict {
                warn!(command = %name, issues = issues.len(), "Rejected invalid command");
                return Err(InvalidHandlerError::InvalidCommand { name, issues });
            }
            for issue in &issues {
                warn!(command = %name, %issue, "Command registered with validation issue");
            }
        }
        if !is_valid_identifier(&name) {
            return Err(InvalidHandlerError::InvalidIdentifier(name));
        }

        let flagged = !issues.is_empty();
        let cooldown = module.cooldown();
        let derived = [
            (InteractionKind::Command, Some(module.execute_handler())),
            (InteractionKind::Autocomplete, module.autocomplete_handler()),
            (InteractionKind::ContextMenu, module.context_menu_handler()),
        ];
        {
            let mut tables = self.tables.write();
            for (kind, handler) in derived {
                let table = tables.entry(kind).or_default();
                // A reloaded module must not leave its previous version's
                // handlers reachable.
                if table
                    .get(&name)
                    .is_some_and(|entry| entry.owner.as_deref() == Some(name.as_str()))
                {
                    table.remove(&name);
                    debug!(%kind, command = %name, "Derived handler from previous module removed");
                }
                let Some(handler) = handler else { continue };
                table.insert(
                    name.clone(),
                    Arc::new(HandlerEntry {
                        kind,
                        identifier: name.clone(),
                        handler: Arc::clone(handler),
                        cooldown: (kind == InteractionKind::Command).then_some(cooldown).flatten(),
                        owner: Some(name.clone()),
                        flagged,
                    }),
                );
            }
        }

        let components = module.component_keys().count();
        if self
            .commands
            .write()
            .insert(name.clone(), Arc::new(module))
            .is_some()
        {
            warn!(command = %name, "Command re-registered, previous module replaced");
        }
        self.bump();
        info!(command = %name, components, flagged, "Command registered");

        Ok(RegisteredCommand { name, issues })
    }

    /// Registers every module, continuing past failures.
    pub fn register_commands(
        &self,
        modules: impl IntoIterator<Item = CommandModule>,
    ) -> RegistrationReport {
        let mut report = RegistrationReport::default();
        for module in modules {
            let name = module.name().to_string();
            match self.register_command(module) {
                Ok(registered) if registered.is_flagged() => report.flagged.push(registered),
                Ok(registered) => report.registered.push(registered.name),
                Err(e) => report.rejected.push((name, e)),
            }
        }
        report
    }

    // ─── Lookup ─────────────────────────────────────────────────────────────

    /// Returns the entry registered for `(kind, identifier)`.
    pub fn resolve(&self, kind: InteractionKind, identifier: &str) -> Option<Arc<HandlerEntry>> {
        self.tables
            .read()
            .get(&kind)
            .and_then(|table| table.get(identifier))
            .cloned()
    }

    /// Returns the command module named `name`.
    pub fn command(&self, name: &str) -> Option<Arc<CommandModule>> {
        self.commands.read().get(name).cloned()
    }

    /// Returns the default handler for `kind`.
    pub fn default_handler(&self, kind: InteractionKind) -> Option<BoxedHandler> {
        self.defaults.read().get(&kind).cloned()
    }

    /// Determines the cooldown that applies to `raw` without resolving a
    /// handler: the exact entry's, then the reconstructed entry's, then the
    /// owning command's.
    pub fn cooldown_for(
        &self,
        kind: InteractionKind,
        raw: &str,
        parsed: &ParsedIdentifier,
    ) -> Option<Duration> {
        {
            let tables = self.tables.read();
            if let Some(table) = tables.get(&kind) {
                let entry = table
                    .get(raw)
                    .or_else(|| table.get(parsed.reconstructed().as_str()));
                if let Some(entry) = entry {
                    if entry.cooldown.is_some() {
                        return entry.cooldown;
                    }
                    if let Some(owner) = entry.owner.as_deref() {
                        return self.command(owner).and_then(|m| m.cooldown());
                    }
                }
            }
        }
        self.command(parsed.owner()).and_then(|m| m.cooldown())
    }

    /// Number of entries registered for `kind`.
    pub fn len(&self, kind: InteractionKind) -> usize {
        self.tables.read().get(&kind).map_or(0, HashMap::len)
    }

    /// Number of registered command modules.
    pub fn command_count(&self) -> usize {
        self.commands.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.tables.read().values().all(HashMap::is_empty)
            && self.commands.read().is_empty()
            && self.defaults.read().is_empty()
    }

    // ─── Removal ────────────────────────────────────────────────────────────

    /// Removes one entry. Returns `true` if it existed.
    pub fn unregister(&self, kind: InteractionKind, identifier: &str) -> bool {
        let removed = self
            .tables
            .write()
            .get_mut(&kind)
            .is_some_and(|table| table.remove(identifier).is_some());
        if removed {
            self.bump();
            debug!(%kind, identifier, "Handler unregistered");
        }
        removed
    }

    /// Removes a command module and every entry derived from it.
    pub fn unregister_command(&self, name: &str) -> bool {
        let Some(_module) = self.commands.write().remove(name) else {
            return false;
        };
        {
            let mut tables = self.tables.write();
            for table in tables.values_mut() {
                table.retain(|_, entry| entry.owner.as_deref() != Some(name));
            }
        }
        self.bump();
        info!(command = %name, "Command unregistered");
        true
    }

    /// Clears the tables for `kind`, or everything when `kind` is `None`.
    pub fn unregister_all(&self, kind: Option<InteractionKind>) {
        match kind {
            Some(kind) => {
                self.tables.write().remove(&kind);
                self.defaults.write().remove(&kind);
            }
            None => {
                self.tables.write().clear();
                self.defaults.write().clear();
                self.commands.write().clear();
            }
        }
        self.bump();
        debug!(kind = ?kind, "Registry cleared");
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        let counts: Vec<(InteractionKind, usize)> =
            tables.iter().map(|(kind, table)| (*kind, table.len())).collect();
        f.debug_struct("HandlerRegistry")
            .field("tables", &counts)
            .field("commands", &self.command_count())
            .field("generation", &self.generation())
            .field("strict", &self.strict)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InteractionContext;
    use crate::handler::into_handler;

    async fn noop(_ctx: Arc<InteractionContext>) {}

    fn handler() -> BoxedHandler {
        into_handler(noop)
    }

    #[test]
    fn test_resolve_returns_registered_callback() {
        let registry = HandlerRegistry::default();
        let callback = handler();
        registry
            .register(
                InteractionKind::Button,
                "hunt_start",
                Arc::clone(&callback),
                RegisterOptions::default(),
            )
            .unwrap();

        let entry = registry.resolve(InteractionKind::Button, "hunt_start").unwrap();
        assert!(Arc::ptr_eq(entry.handler(), &callback));
        assert!(registry.resolve(InteractionKind::SelectMenu, "hunt_start").is_none());
    }

    #[test]
    fn test_reregistration_replaces() {
        let registry = HandlerRegistry::default();
        let first = handler();
        let second = handler();
        let options = RegisterOptions::default();
        registry
            .register(InteractionKind::Modal, "bank_deposit", Arc::clone(&first), options.clone())
            .unwrap();
        registry
            .register(InteractionKind::Modal, "bank_deposit", Arc::clone(&second), options)
            .unwrap();

        let entry = registry.resolve(InteractionKind::Modal, "bank_deposit").unwrap();
        assert!(Arc::ptr_eq(entry.handler(), &second));
        assert!(!Arc::ptr_eq(entry.handler(), &first));
        assert_eq!(registry.len(InteractionKind::Modal), 1);
    }

    #[test]
    fn test_invalid_registrations_are_reported() {
        let registry = HandlerRegistry::default();
        let err = registry
            .register(InteractionKind::Button, "bad id", handler(), RegisterOptions::default())
            .unwrap_err();
        assert!(matches!(err, InvalidHandlerError::InvalidIdentifier(_)));

        let err = registry
            .register_named("voice", "ok_id", handler(), RegisterOptions::default())
            .unwrap_err();
        assert!(matches!(err, InvalidHandlerError::UnknownKind(_)));

        let err = registry
            .register(
                InteractionKind::Button,
                "ok_id",
                handler(),
                RegisterOptions::default().cooldown_secs(3601),
            )
            .unwrap_err();
        assert!(matches!(err, InvalidHandlerError::CooldownTooLong { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_generation_bumps_on_mutation() {
        let registry = HandlerRegistry::default();
        let before = registry.generation();
        registry
            .register(InteractionKind::Button, "a_b", handler(), RegisterOptions::default())
            .unwrap();
        assert!(registry.generation() > before);
    }

    #[test]
    fn test_register_command_derives_entries() {
        let registry = HandlerRegistry::default();
        let module = CommandModule::new("mine", noop)
            .description("Dig for ore")
            .cooldown_secs(3)
            .autocomplete(noop)
            .button("again", noop);
        let registered = registry.register_command(module).unwrap();
        assert!(!registered.is_flagged());

        let entry = registry.resolve(InteractionKind::Command, "mine").unwrap();
        assert_eq!(entry.cooldown(), Some(Duration::from_secs(3)));
        assert_eq!(entry.owner(), Some("mine"));
        assert!(registry.resolve(InteractionKind::Autocomplete, "mine").is_some());
        assert!(registry.resolve(InteractionKind::ContextMenu, "mine").is_none());
        assert!(registry.resolve(InteractionKind::Button, "mine_again").is_none());
        assert!(registry.command("mine").is_some());
    }

    #[test]
    fn test_reregistering_command_drops_stale_derived_entries() {
        let registry = HandlerRegistry::default();
        registry
            .register_command(
                CommandModule::new("mine", noop)
                    .description("Dig for ore")
                    .autocomplete(noop)
                    .context_menu(noop),
            )
            .unwrap();
        let unrelated = handler();
        registry
            .register(
                InteractionKind::Autocomplete,
                "fish",
                Arc::clone(&unrelated),
                RegisterOptions::default(),
            )
            .unwrap();

        registry
            .register_command(CommandModule::new("mine", noop).description("Dig for ore"))
            .unwrap();

        assert!(registry.resolve(InteractionKind::Command, "mine").is_some());
        assert!(registry.resolve(InteractionKind::Autocomplete, "mine").is_none());
        assert!(registry.resolve(InteractionKind::ContextMenu, "mine").is_none());
        let kept = registry.resolve(InteractionKind::Autocomplete, "fish").unwrap();
        assert!(Arc::ptr_eq(kept.handler(), &unrelated));
        assert_eq!(registry.command_count(), 1);
    }

    #[test]
    fn test_strict_mode_rejects_invalid_command() {
        let strict = HandlerRegistry::new(true);
        let err = strict
            .register_command(CommandModule::new("mine", noop))
            .unwrap_err();
        assert!(matches!(err, InvalidHandlerError::InvalidCommand { .. }));
        assert_eq!(strict.command_count(), 0);

        let lenient = HandlerRegistry::new(false);
        let registered = lenient
            .register_command(CommandModule::new("mine", noop))
            .unwrap();
        assert!(registered.is_flagged());
        assert!(
            lenient
                .resolve(InteractionKind::Command, "mine")
                .unwrap()
                .is_flagged()
        );
    }

    #[test]
    fn test_bulk_registration_continues_past_failures() {
        let registry = HandlerRegistry::new(true);
        let report = registry.register_commands([
            CommandModule::new("fish", noop).description("Cast a line"),
            CommandModule::new("bad name", noop).description("Broken"),
            CommandModule::new("pets", noop).description("Care for pets"),
        ]);
        assert_eq!(report.registered, vec!["fish".to_string(), "pets".to_string()]);
        assert_eq!(report.rejected.len(), 1);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_cooldown_for_falls_back_to_owner() {
        let registry = HandlerRegistry::default();
        registry
            .register_command(
                CommandModule::new("mine", noop)
                    .description("Dig")
                    .cooldown_secs(3)
                    .button("again", noop),
            )
            .unwrap();
        registry
            .register(
                InteractionKind::Button,
                "mine_fast",
                handler(),
                RegisterOptions::default().cooldown_secs(1),
            )
            .unwrap();

        let parsed = ParsedIdentifier::parse("mine_again").unwrap();
        assert_eq!(
            registry.cooldown_for(InteractionKind::Button, "mine_again", &parsed),
            Some(Duration::from_secs(3))
        );
        let parsed = ParsedIdentifier::parse("mine_fast").unwrap();
        assert_eq!(
            registry.cooldown_for(InteractionKind::Button, "mine_fast", &parsed),
            Some(Duration::from_secs(1))
        );
        let parsed = ParsedIdentifier::parse("ghost_panel").unwrap();
        assert_eq!(
            registry.cooldown_for(InteractionKind::Button, "ghost_panel", &parsed),
            None
        );
    }

    #[test]
    fn test_unregister_paths() {
        let registry = HandlerRegistry::default();
        registry
            .register_command(CommandModule::new("fish", noop).description("Cast").autocomplete(noop))
            .unwrap();
        registry
            .register(InteractionKind::Button, "fish_reel", handler(), RegisterOptions::default())
            .unwrap();

        assert!(registry.unregister(InteractionKind::Button, "fish_reel"));
        assert!(!registry.unregister(InteractionKind::Button, "fish_reel"));

        assert!(registry.unregister_command("fish"));
        assert!(registry.resolve(InteractionKind::Command, "fish").is_none());
        assert!(registry.resolve(InteractionKind::Autocomplete, "fish").is_none());

        registry.set_default(InteractionKind::Button, handler());
        registry.unregister_all(None);
        assert!(registry.is_empty());
    }
}
