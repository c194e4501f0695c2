//! Identifier resolution.
//!
//! [`IdentifierResolver`] maps `(kind, raw identifier)` to a handler by walking
//! a fixed precedence chain and returning the first hit:
//!
//! 1. [`Exact`](ResolutionSource::Exact) - the raw identifier in the kind's table
//! 2. [`Reconstructed`](ResolutionSource::Reconstructed) - the normalized
//!    `owner_action` form in the kind's table
//! 3. [`Scoped`](ResolutionSource::Scoped) /
//!    [`ScopedDefault`](ResolutionSource::ScopedDefault) - the owning
//!    command's component table for the kind, by action then by `default`
//! 4. [`OwnerFallback`](ResolutionSource::OwnerFallback) - the owning
//!    command's catch-all for the kind
//! 5. [`GlobalDefault`](ResolutionSource::GlobalDefault) - the registry's
//!    process-wide default for the kind
//!
//! Results, including misses, are memoized under the verbatim
//! `(kind, raw identifier)` key. The cache is bounded: once it reaches
//! capacity the oldest fraction of entries, by insertion order, is evicted.
//! Any registry mutation invalidates the whole cache.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::command::{CommandModule, ComponentHandlerProvider, DEFAULT_ACTION};
use crate::handler::BoxedHandler;
use crate::registry::HandlerRegistry;
use switchboard_core::{InteractionKind, ParsedIdentifier};

/// Default number of cached resolutions.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;
/// Default fraction of the cache evicted at the high-water mark.
pub const DEFAULT_EVICTION_FRACTION: f64 = 0.25;

/// Which step of the precedence chain produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionSource {
    /// Raw identifier registered directly.
    Exact,
    /// Normalized `owner_action` form registered directly.
    Reconstructed,
    /// Action found in the owning command's component table.
    Scoped,
    /// `default` key in the owning command's component table.
    ScopedDefault,
    /// Catch-all handler of the owning command.
    OwnerFallback,
    /// Registry-wide default for the kind.
    GlobalDefault,
}

/// A resolved handler.
#[derive(Clone)]
pub struct Resolution {
    /// The handler to invoke.
    pub handler: BoxedHandler,
    /// Owning command name from the parsed identifier.
    pub owner: String,
    /// Action from the parsed identifier.
    pub action: Option<String>,
    /// Which precedence step matched.
    pub source: ResolutionSource,
    /// The owning command module, when one is registered.
    pub module: Option<Arc<CommandModule>>,
}

impl Resolution {
    /// Names the registered handler this resolution reached.
    ///
    /// Unlike the raw identifier, the tag space is bounded by what is
    /// registered: fallback and default resolutions share one tag however
    /// the identifier was spelled.
    pub fn context_tag(&self, raw: &str) -> String {
        match (self.source, self.action.as_deref()) {
            (ResolutionSource::Exact, _) => raw.to_string(),
            (ResolutionSource::Reconstructed | ResolutionSource::Scoped, Some(action)) => {
                format!("{}_{action}", self.owner)
            }
            (ResolutionSource::Reconstructed | ResolutionSource::Scoped, None) => {
                self.owner.clone()
            }
            (ResolutionSource::ScopedDefault, _) => format!("{}_{DEFAULT_ACTION}", self.owner),
            (ResolutionSource::OwnerFallback, _) => format!("{}_*", self.owner),
            (ResolutionSource::GlobalDefault, _) => "*".to_string(),
        }
    }
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("owner", &self.owner)
            .field("action", &self.action)
            .field("source", &self.source)
            .field("module", &self.module.as_ref().map(|m| m.name().to_string()))
            .finish_non_exhaustive()
    }
}

/// Resolver tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverOptions {
    /// Maximum cached entries; reaching it triggers eviction.
    pub cache_capacity: usize,
    /// Fraction of entries evicted, oldest first, in `(0, 1]`.
    pub eviction_fraction: f64,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            eviction_fraction: DEFAULT_EVICTION_FRACTION,
        }
    }
}

type CacheKey = (InteractionKind, String);

#[derive(Default)]
struct Cache {
    generation: u64,
    entries: HashMap<CacheKey, Option<Resolution>>,
    order: VecDeque<CacheKey>,
}

impl Cache {
    fn clear(&mut self, generation: u64) {
        self.generation = generation;
        self.entries.clear();
        self.order.clear();
    }

    fn evict_oldest(&mut self, count: usize) -> usize {
        let mut evicted = 0;
        while evicted < count {
            let Some(key) = self.order.pop_front() else { break };
            self.entries.remove(&key);
            evicted += 1;
        }
        evicted
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that walked the chain.
    pub misses: u64,
    /// Entries currently cached.
    pub size: usize,
}

/// Resolves identifiers against a [`HandlerRegistry`].
pub struct IdentifierResolver {
    registry: Arc<HandlerRegistry>,
    options: ResolverOptions,
    cache: Mutex<Cache>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl IdentifierResolver {
    /// Creates a resolver over `registry`.
    pub fn new(registry: Arc<HandlerRegistry>, options: ResolverOptions) -> Self {
        let generation = registry.generation();
        Self {
            registry,
            options,
            cache: Mutex::new(Cache {
                generation,
                ..Cache::default()
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The registry this resolver reads.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Resolves `raw` for `kind`, consulting the cache first.
    pub fn resolve(
        &self,
        kind: InteractionKind,
        raw: &str,
        parsed: &ParsedIdentifier,
    ) -> Option<Resolution> {
        let key = (kind, raw.to_string());
        let generation = self.registry.generation();

        {
            let mut cache = self.cache.lock();
            if cache.generation != generation {
                debug!(
                    from = cache.generation,
                    to = generation,
                    "Registry changed, resolution cache cleared"
                );
                cache.clear(generation);
            }
            if let Some(cached) = cache.entries.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return cached.clone();
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let resolution = self.walk(kind, raw, parsed);
        trace!(
            %kind,
            identifier = raw,
            source = ?resolution.as_ref().map(|r| r.source),
            "Identifier resolved"
        );

        let mut cache = self.cache.lock();
        // A registration may have landed while the chain was walked.
        if cache.generation == generation && !cache.entries.contains_key(&key) {
            if cache.entries.len() >= self.options.cache_capacity {
                let count = self.eviction_count();
                cache.evict_oldest(count);
            }
            cache.order.push_back(key.clone());
            cache.entries.insert(key, resolution.clone());
        }
        resolution
    }

    /// Walks the precedence chain without touching the cache.
    pub fn walk(
        &self,
        kind: InteractionKind,
        raw: &str,
        parsed: &ParsedIdentifier,
    ) -> Option<Resolution> {
        let module = self.registry.command(parsed.owner());
        let resolved = |handler: BoxedHandler, source, module: Option<Arc<CommandModule>>| {
            Some(Resolution {
                handler,
                owner: parsed.owner().to_string(),
                action: parsed.action().map(str::to_string),
                source,
                module,
            })
        };

        if let Some(entry) = self.registry.resolve(kind, raw) {
            let module = entry.owner().and_then(|o| self.registry.command(o)).or(module);
            return resolved(Arc::clone(entry.handler()), ResolutionSource::Exact, module);
        }

        let reconstructed = parsed.reconstructed();
        if reconstructed != raw {
            if let Some(entry) = self.registry.resolve(kind, &reconstructed) {
                let module = entry.owner().and_then(|o| self.registry.command(o)).or(module);
                return resolved(
                    Arc::clone(entry.handler()),
                    ResolutionSource::Reconstructed,
                    module,
                );
            }
        }

        if let Some(provider) = module.as_deref() {
            let scoped = parsed
                .action()
                .and_then(|action| provider.component_handler(kind, action))
                .map(|h| (h, ResolutionSource::Scoped))
                .or_else(|| {
                    provider
                        .component_handler(kind, DEFAULT_ACTION)
                        .map(|h| (h, ResolutionSource::ScopedDefault))
                })
                .or_else(|| {
                    provider
                        .fallback_handler(kind)
                        .map(|h| (h, ResolutionSource::OwnerFallback))
                });
            if let Some((handler, source)) = scoped {
                return resolved(Arc::clone(handler), source, module.clone());
            }
        }

        self.registry
            .default_handler(kind)
            .and_then(|handler| resolved(handler, ResolutionSource::GlobalDefault, module))
    }

    fn eviction_count(&self) -> usize {
        let count = (self.options.cache_capacity as f64 * self.options.eviction_fraction).ceil();
        (count as usize).max(1)
    }

    /// Evicts the oldest fraction if the cache is at its high-water mark, or
    /// clears it if the registry changed. Returns the number of entries
    /// dropped.
    pub fn sweep(&self) -> usize {
        let generation = self.registry.generation();
        let mut cache = self.cache.lock();
        if cache.generation != generation {
            let dropped = cache.entries.len();
            cache.clear(generation);
            return dropped;
        }
        if cache.entries.len() >= self.options.cache_capacity {
            let count = self.eviction_count();
            return cache.evict_oldest(count);
        }
        0
    }

    /// Drops every cached entry.
    pub fn clear_cache(&self) {
        let generation = self.registry.generation();
        self.cache.lock().clear(generation);
    }

    /// Current cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.cache.lock().entries.len(),
        }
    }
}

impl std::fmt::Debug for IdentifierResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierResolver")
            .field("options", &self.options)
            .field("cache", &self.cache_stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InteractionContext;
    use crate::handler::into_handler;
    use crate::registry::RegisterOptions;

    async fn noop(_ctx: Arc<InteractionContext>) {}

    fn parse(raw: &str) -> ParsedIdentifier {
        ParsedIdentifier::parse(raw).unwrap()
    }

    fn setup() -> (Arc<HandlerRegistry>, IdentifierResolver) {
        let registry = Arc::new(HandlerRegistry::default());
        let resolver = IdentifierResolver::new(Arc::clone(&registry), ResolverOptions::default());
        (registry, resolver)
    }

    fn source(resolver: &IdentifierResolver, kind: InteractionKind, raw: &str) -> Option<ResolutionSource> {
        resolver.resolve(kind, raw, &parse(raw)).map(|r| r.source)
    }

    #[test]
    fn test_exact_beats_owner_fallback() {
        let (registry, resolver) = setup();
        let exact = into_handler(noop);
        registry
            .register_command(
                CommandModule::new("hunt", noop)
                    .description("Hunt")
                    .fallback(InteractionKind::Button, noop),
            )
            .unwrap();
        registry
            .register(
                InteractionKind::Button,
                "hunt_start",
                Arc::clone(&exact),
                RegisterOptions::default(),
            )
            .unwrap();

        let resolution = resolver
            .resolve(InteractionKind::Button, "hunt_start", &parse("hunt_start"))
            .unwrap();
        assert_eq!(resolution.source, ResolutionSource::Exact);
        assert!(Arc::ptr_eq(&resolution.handler, &exact));
        assert!(resolution.module.is_some());

        assert_eq!(
            source(&resolver, InteractionKind::Button, "hunt_other"),
            Some(ResolutionSource::OwnerFallback)
        );
    }

    #[test]
    fn test_reconstructed_form_absorbs_delimiter_noise() {
        let (registry, resolver) = setup();
        registry
            .register(
                InteractionKind::Button,
                "bank_deposit",
                into_handler(noop),
                RegisterOptions::default(),
            )
            .unwrap();
        assert_eq!(
            source(&resolver, InteractionKind::Button, "bank__deposit_"),
            Some(ResolutionSource::Reconstructed)
        );
    }

    #[test]
    fn test_scoped_then_default_then_global() {
        let (registry, resolver) = setup();
        registry
            .register_command(
                CommandModule::new("mine", noop)
                    .description("Dig")
                    .button("again", noop)
                    .button(DEFAULT_ACTION, noop),
            )
            .unwrap();
        registry.set_default(InteractionKind::SelectMenu, into_handler(noop));

        assert_eq!(
            source(&resolver, InteractionKind::Button, "mine_again"),
            Some(ResolutionSource::Scoped)
        );
        assert_eq!(
            source(&resolver, InteractionKind::Button, "mine_unknown"),
            Some(ResolutionSource::ScopedDefault)
        );
        assert_eq!(
            source(&resolver, InteractionKind::SelectMenu, "mine_tool"),
            Some(ResolutionSource::GlobalDefault)
        );
        assert_eq!(source(&resolver, InteractionKind::Modal, "mine_form"), None);
    }

    #[test]
    fn test_context_tag_names_the_registered_handler() {
        let (registry, resolver) = setup();
        registry
            .register_command(
                CommandModule::new("hunt", noop)
                    .description("Hunt")
                    .button("start", noop)
                    .fallback(InteractionKind::Button, noop),
            )
            .unwrap();
        registry
            .register(
                InteractionKind::Modal,
                "bank_deposit",
                into_handler(noop),
                RegisterOptions::default(),
            )
            .unwrap();
        registry.set_default(InteractionKind::SelectMenu, into_handler(noop));

        let tag = |kind, raw: &str| {
            resolver
                .resolve(kind, raw, &parse(raw))
                .map(|r| r.context_tag(raw))
        };
        assert_eq!(tag(InteractionKind::Modal, "bank_deposit").as_deref(), Some("bank_deposit"));
        assert_eq!(tag(InteractionKind::Modal, "bank__deposit").as_deref(), Some("bank_deposit"));
        assert_eq!(tag(InteractionKind::Button, "hunt_start").as_deref(), Some("hunt_start"));
        // Made-up actions collapse onto the handler that caught them.
        assert_eq!(tag(InteractionKind::Button, "hunt_x1").as_deref(), Some("hunt_*"));
        assert_eq!(tag(InteractionKind::Button, "hunt_x2").as_deref(), Some("hunt_*"));
        assert_eq!(tag(InteractionKind::SelectMenu, "any_thing").as_deref(), Some("*"));
    }

    #[test]
    fn test_cache_keys_on_raw_identifier() {
        let (registry, resolver) = setup();
        registry
            .register_command(
                CommandModule::new("pets", noop)
                    .description("Pets")
                    .fallback(InteractionKind::Button, noop),
            )
            .unwrap();

        let feed = resolver
            .resolve(InteractionKind::Button, "pets_feed", &parse("pets_feed"))
            .unwrap();
        let walk = resolver
            .resolve(InteractionKind::Button, "pets_walk", &parse("pets_walk"))
            .unwrap();
        assert_eq!(feed.action.as_deref(), Some("feed"));
        assert_eq!(walk.action.as_deref(), Some("walk"));

        let again = resolver
            .resolve(InteractionKind::Button, "pets_feed", &parse("pets_feed"))
            .unwrap();
        assert_eq!(again.action.as_deref(), Some("feed"));
        assert_eq!(resolver.cache_stats().hits, 1);
        assert_eq!(resolver.cache_stats().size, 2);
    }

    #[test]
    fn test_absent_is_cached_and_invalidated_by_registration() {
        let (registry, resolver) = setup();
        assert!(source(&resolver, InteractionKind::Button, "ghost_panel").is_none());
        assert!(source(&resolver, InteractionKind::Button, "ghost_panel").is_none());
        assert_eq!(resolver.cache_stats().hits, 1);

        registry
            .register(
                InteractionKind::Button,
                "ghost_panel",
                into_handler(noop),
                RegisterOptions::default(),
            )
            .unwrap();
        assert_eq!(
            source(&resolver, InteractionKind::Button, "ghost_panel"),
            Some(ResolutionSource::Exact)
        );
    }

    #[test]
    fn test_oldest_fraction_evicted_at_capacity() {
        let registry = Arc::new(HandlerRegistry::default());
        let resolver = IdentifierResolver::new(
            Arc::clone(&registry),
            ResolverOptions {
                cache_capacity: 8,
                eviction_fraction: 0.25,
            },
        );
        for i in 0..8 {
            let raw = format!("ghost_{i}");
            resolver.resolve(InteractionKind::Button, &raw, &parse(&raw));
        }
        assert_eq!(resolver.cache_stats().size, 8);

        resolver.resolve(InteractionKind::Button, "ghost_8", &parse("ghost_8"));
        assert_eq!(resolver.cache_stats().size, 7);

        // The two oldest were evicted, so re-resolving them misses.
        let misses = resolver.cache_stats().misses;
        resolver.resolve(InteractionKind::Button, "ghost_0", &parse("ghost_0"));
        assert_eq!(resolver.cache_stats().misses, misses + 1);
        resolver.resolve(InteractionKind::Button, "ghost_7", &parse("ghost_7"));
        assert_eq!(resolver.cache_stats().misses, misses + 1);
    }

    #[test]
    fn test_sweep_clears_on_generation_change() {
        let (registry, resolver) = setup();
        resolver.resolve(InteractionKind::Button, "a_b", &parse("a_b"));
        assert_eq!(resolver.sweep(), 0);
        registry.unregister_all(None);
        assert_eq!(resolver.sweep(), 1);
        assert_eq!(resolver.cache_stats().size, 0);
    }
}
