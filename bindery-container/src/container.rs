//! # The Container — heart of bindery
//!
//! A Laravel-style service container: string-keyed bindings built by
//! explicit factories, shared safely between threads.
//!
//! # Architecture
//! ```text
//! ContainerBuilder ──build()──> Container (cheap Clone handle)
//!                                   │
//!                         make(key) │  alias → cached instance
//!                                   │  → contextual override
//!                                   │  → binding factory (Resolver + BuildFrame)
//!                                   │  → extenders → singleton cache
//!                                   ▼  → after-resolving observers
//!                                 Value
//! ```
//!
//! # Examples
//! ```rust
//! use bindery_container::prelude::*;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! struct Config { url: String }
//! struct Database { url: String }
//!
//! let container = Container::new();
//! container.instance("config", Config { url: "postgres://localhost".into() }).unwrap();
//! container.singleton("db", |r| {
//!     let config: Arc<Config> = r.resolve("config")?;
//!     Ok(Database { url: config.url.clone() })
//! }).unwrap();
//!
//! let counter = Arc::new(AtomicU32::new(0));
//! let ticks = counter.clone();
//! container.bind("tick", move |_| Ok(ticks.fetch_add(1, Ordering::SeqCst) + 1)).unwrap();
//!
//! let db: Arc<Database> = container.resolve("db").unwrap();
//! assert_eq!(db.url, "postgres://localhost");
//! assert_eq!(*container.resolve::<u32>("tick").unwrap(), 1);
//! assert_eq!(*container.resolve::<u32>("tick").unwrap(), 2);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bindery_support::rendering::suggest_similar;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::contextual::ContextualBuilder;
use crate::error::{BinderyError, CircularDependencyError, NotRegisteredError, Result};
use crate::key::{AbstractKey, Key};
use crate::registry::{
    ActivatorFn, AfterResolvingFn, Binding, ExtenderFn, FactoryFn, Lookup, ReboundFn, Registration, Registry,
};
use crate::resolver::{BuildFrame, Resolver};
use crate::scope::Scope;
use crate::snapshot::ContainerSnapshot;
use crate::value::Value;

/// Key under which a container registers itself unless configured otherwise.
pub const CONTAINER_KEY: AbstractKey = AbstractKey::from_static("container");

// ============================================================
// ContainerBuilder
// ============================================================

/// Configures a [`Container`].
///
/// # Examples
/// ```rust
/// use bindery_container::prelude::*;
///
/// let container = Container::builder()
///     .allow_override(false)
///     .self_key("app")
///     .build();
///
/// container.instance("port", 8000u16).unwrap();
/// assert!(container.instance("port", 9000u16).is_err());
/// assert!(container.bound("app"));
/// ```
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    allow_override: bool,
    self_key: AbstractKey,
    max_suggestions: usize,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self {
            allow_override: true,
            self_key: CONTAINER_KEY,
            max_suggestions: 3,
        }
    }

    /// Allow re-registering keys that are already bound (default: `true`).
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }

    /// Key the container registers itself under (default: `"container"`).
    pub fn self_key(mut self, key: impl Into<AbstractKey>) -> Self {
        self.self_key = key.into();
        self
    }

    /// How many "did you mean" suggestions unresolved keys report (default: 3).
    pub fn max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max;
        self
    }

    /// Builds an empty container holding only its self-registration.
    pub fn build(self) -> Container {
        let container = Container {
            inner: Arc::new(Inner {
                registry: RwLock::new(Registry::new()),
                contextual: DashMap::new(),
                settings: self,
            }),
        };
        container.register_self();
        container
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// Thread-safe service container.
///
/// `Container` is a handle: clones share the same tables. All operations
/// take `&self`; registration may happen at any time, including after
/// providers have booted.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

struct Inner {
    registry: RwLock<Registry>,
    contextual: DashMap<(AbstractKey, AbstractKey), FactoryFn>,
    settings: ContainerBuilder,
}

/// How a value came to be, for post-build bookkeeping.
enum Built<'g> {
    Contextual,
    Transient,
    Singleton { gate: &'g Arc<OnceCell<Value>>, applied: usize },
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Creates a container with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new builder.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// `true` if both handles point at the same container.
    pub fn ptr_eq(&self, other: &Container) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Registration ──

    /// Registers a transient factory: it runs on every [`make`](Self::make).
    ///
    /// Replaces any previous binding for `key`. If the key had already been
    /// resolved, it is rebuilt at once and rebinding callbacks fire.
    ///
    /// # Errors
    /// The rebuild's error, if it fails. The new binding stays registered
    /// either way; the next [`make`](Self::make) tries it again.
    pub fn bind<T, F>(&self, key: impl Into<AbstractKey>, factory: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.bind_factory(key, erase(factory), Scope::Transient)
    }

    /// Registers a singleton factory: it runs once, on first resolve.
    ///
    /// Rebinding follows the same rules as [`bind`](Self::bind).
    pub fn singleton<T, F>(&self, key: impl Into<AbstractKey>, factory: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.bind_factory(key, erase(factory), Scope::Singleton)
    }

    /// Registers an already type-erased factory.
    pub fn bind_factory(&self, key: impl Into<AbstractKey>, factory: FactoryFn, scope: Scope) -> Result<()> {
        self.register_binding(key.into(), Binding::Factory(Registration::new(factory, scope)))
    }

    /// Registers a pre-built value as a permanent singleton.
    pub fn instance<T: Any + Send + Sync>(&self, key: impl Into<AbstractKey>, value: T) -> Result<()> {
        self.put_instance(key.into(), Value::new(value))
    }

    /// Registers a shared value without re-wrapping it.
    pub fn instance_arc<T: Any + Send + Sync>(&self, key: impl Into<AbstractKey>, value: Arc<T>) -> Result<()> {
        self.put_instance(key.into(), Value::from_arc(value))
    }

    /// Installs a lazy placeholder: the first resolve of `key` runs
    /// `activator`, which is expected to bind the key for real.
    ///
    /// A cached value for `key` is dropped, but nothing is rebuilt until
    /// the key is resolved again.
    ///
    /// Used by [`ProviderRegistry`](crate::provider_registry::ProviderRegistry)
    /// for deferred providers.
    pub fn defer(
        &self,
        key: impl Into<AbstractKey>,
        activator: impl Fn(&Container) -> Result<()> + Send + Sync + 'static,
    ) -> Result<()> {
        let activator: ActivatorFn = Arc::new(activator);
        self.register_binding(key.into(), Binding::Deferred(activator))
    }

    /// Registers `alias` as another name for `key`.
    ///
    /// # Errors
    /// [`BinderyError::SelfAlias`] if `alias` names `key` itself.
    pub fn alias(&self, key: impl Into<AbstractKey>, alias: impl Into<AbstractKey>) -> Result<()> {
        self.inner.registry.write().register_alias(key.into(), alias.into())
    }

    /// Starts a contextual binding: `when(consumer).needs(dep).give(..)`.
    pub fn when(&self, consumer: impl Into<AbstractKey>) -> ContextualBuilder<'_> {
        ContextualBuilder::new(self, consumer.into())
    }

    /// Decorates every value built for `key`.
    ///
    /// A singleton that is already cached is decorated in place and
    /// rebinding callbacks fire with the decorated value.
    pub fn extend<T, F>(&self, key: impl Into<AbstractKey>, decorator: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(Arc<T>, &Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        let key = key.into();
        let error_key = key.clone();
        self.extend_value(key, move |value: Value, resolver: &Resolver<'_>| {
            let typed = value.cast::<T>(&error_key)?;
            decorator(typed, resolver).map(Value::new)
        })
    }

    /// Untyped form of [`extend`](Self::extend).
    pub fn extend_value<F>(&self, key: impl Into<AbstractKey>, decorator: F) -> Result<()>
    where
        F: Fn(Value, &Resolver<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        let extender: ExtenderFn = Arc::new(decorator);
        let key = {
            let mut registry = self.inner.registry.write();
            let key = registry.canonical(&key.into());
            registry.push_extender(key.clone(), extender);
            key
        };
        debug!(key = %key, "Registered extender");

        self.apply_late_extenders(&key).map(|_| ())
    }

    /// Brings a cached instance up to date with extenders registered after
    /// it was built, firing rebinding callbacks for each swap. Returns the
    /// cached instance, if any.
    fn apply_late_extenders(&self, key: &AbstractKey) -> Result<Option<Value>> {
        loop {
            let pending = self.inner.registry.read().pending_extenders(key);
            let Some((current, applied, extenders)) = pending else {
                return Ok(None);
            };
            if extenders.is_empty() {
                return Ok(Some(current));
            }

            trace!(key = %key, applied, pending = extenders.len(), "Decorating cached instance");
            let root = self.root();
            let decorated = extenders
                .iter()
                .try_fold(current.clone(), |value, extender| extender(value, &root))?;

            // A rebind or another decoration may have won the race; then look again.
            let replaced = self
                .inner
                .registry
                .write()
                .replace_instance(key, &current, decorated.clone(), extenders.len());
            if replaced {
                self.fire_rebound(key, &decorated);
            }
        }
    }

    /// Adds keys to a tag group. Order is kept; duplicates are allowed.
    pub fn tag<I, K>(&self, keys: I, tag: impl Into<String>)
    where
        I: IntoIterator<Item = K>,
        K: Into<AbstractKey>,
    {
        let keys = keys.into_iter().map(Into::into).collect();
        self.inner.registry.write().tag(tag.into(), keys);
    }

    /// Registers a callback fired with the new value whenever a resolved
    /// key is rebound or extended.
    pub fn rebinding<F>(&self, key: impl Into<AbstractKey>, callback: F)
    where
        F: Fn(&Container, &Value) + Send + Sync + 'static,
    {
        let callback: ReboundFn = Arc::new(callback);
        let mut registry = self.inner.registry.write();
        let key = registry.canonical(&key.into());
        registry.add_rebound(key, callback);
    }

    /// Registers a callback fired after every fresh build.
    pub fn after_resolving<F>(&self, callback: F)
    where
        F: Fn(&AbstractKey, &Value) + Send + Sync + 'static,
    {
        let callback: AfterResolvingFn = Arc::new(callback);
        self.inner.registry.write().add_after_resolving(callback);
    }

    // ── Resolution ──

    /// Resolves a key.
    ///
    /// # Errors
    /// - [`BinderyError::UnregisteredAbstract`]: nothing bound under the key
    /// - [`BinderyError::CircularDependency`]: the key depends on itself
    /// - any error returned by the factory or an extender
    pub fn make(&self, key: impl Into<AbstractKey>) -> Result<Value> {
        self.root().make(key)
    }

    /// Resolves a key as `Arc<T>`.
    ///
    /// ```rust,ignore
    /// let router: Arc<Router> = container.resolve("router")?;
    /// ```
    pub fn resolve<T: Any + Send + Sync>(&self, key: impl Into<AbstractKey>) -> Result<Arc<T>> {
        self.root().resolve(key)
    }

    /// Resolves a key and clones the `T` out of it.
    pub fn resolve_cloned<T: Any + Send + Sync + Clone>(&self, key: impl Into<AbstractKey>) -> Result<T> {
        self.root().resolve_cloned(key)
    }

    /// Resolves a typed token.
    pub fn get<T: Any + Send + Sync>(&self, key: &Key<T>) -> Result<Arc<T>> {
        self.root().get(key)
    }

    /// Resolves every key in a tag group, in order.
    pub fn tagged(&self, tag: &str) -> Result<Vec<Value>> {
        self.root().tagged(tag)
    }

    /// Resolves every key in a tag group as `T`.
    pub fn tagged_as<T: Any + Send + Sync>(&self, tag: &str) -> Result<Vec<Arc<T>>> {
        self.root().tagged_as(tag)
    }

    // ── Introspection ──

    /// `true` if the key has a binding (a pending deferred one included) or an instance.
    pub fn bound(&self, key: impl Into<AbstractKey>) -> bool {
        let registry = self.inner.registry.read();
        registry.is_bound(&registry.canonical(&key.into()))
    }

    /// `true` if the key holds an instance or was built since it was last bound.
    pub fn resolved(&self, key: impl Into<AbstractKey>) -> bool {
        let registry = self.inner.registry.read();
        registry.is_resolved(&registry.canonical(&key.into()))
    }

    /// `true` if `key` is an alias.
    pub fn is_alias(&self, key: impl Into<AbstractKey>) -> bool {
        self.inner.registry.read().is_alias(&key.into())
    }

    /// Every key with a binding or instance, sorted.
    pub fn bindings(&self) -> Vec<AbstractKey> {
        self.inner.registry.read().keys()
    }

    /// A serializable picture of the container's tables.
    pub fn snapshot(&self) -> ContainerSnapshot {
        self.inner.registry.read().snapshot(self.inner.contextual.len())
    }

    // ── Removal ──

    /// Removes the binding and the cached instance for a key.
    pub fn forget(&self, key: impl Into<AbstractKey>) {
        let mut registry = self.inner.registry.write();
        let key = registry.canonical(&key.into());
        registry.forget(&key);
    }

    /// Resets every table, keeping only the container's self-registration.
    pub fn flush(&self) {
        self.inner.registry.write().clear();
        self.inner.contextual.clear();
        self.register_self();
        debug!("Flushed container");
    }

    // ── Internal ──

    fn root(&self) -> Resolver<'_> {
        Resolver::new(self, None)
    }

    fn register_self(&self) {
        let factory: FactoryFn = Arc::new(|resolver: &Resolver<'_>| Ok(Value::new(resolver.container().clone())));
        let key = self.inner.settings.self_key.clone();
        let registration = Binding::Factory(Registration::new(factory, Scope::Transient));
        // Overriding is always allowed here: the registry was just created or cleared.
        let _ = self.inner.registry.write().register_binding(key, registration, true);
    }

    fn register_binding(&self, key: AbstractKey, binding: Binding) -> Result<()> {
        // A deferred placeholder waits for the next resolve instead.
        let rebuild = matches!(binding, Binding::Factory(_));
        let (key, was_resolved) = {
            let mut registry = self.inner.registry.write();
            let key = registry.canonical(&key);
            let was_resolved = registry.register_binding(key.clone(), binding, self.inner.settings.allow_override)?;
            (key, was_resolved)
        };

        if was_resolved && rebuild {
            debug!(key = %key, "Rebuilding rebound key");
            let value = self.make(key.clone())?;
            self.fire_rebound(&key, &value);
        }
        Ok(())
    }

    fn put_instance(&self, key: AbstractKey, value: Value) -> Result<()> {
        let (key, was_known) = {
            let mut registry = self.inner.registry.write();
            let key = registry.canonical(&key);
            let was_known = registry.put_instance(key.clone(), value.clone(), self.inner.settings.allow_override)?;
            (key, was_known)
        };

        if was_known {
            self.fire_rebound(&key, &value);
        }
        Ok(())
    }

    pub(crate) fn add_contextual(&self, consumer: AbstractKey, needed: AbstractKey, factory: FactoryFn) {
        let (consumer, needed) = {
            let registry = self.inner.registry.read();
            (registry.canonical(&consumer), registry.canonical(&needed))
        };
        debug!(consumer = %consumer, needs = %needed, "Registered contextual binding");
        self.inner.contextual.insert((consumer, needed), factory);
    }

    pub(crate) fn tagged_keys(&self, tag: &str) -> Vec<AbstractKey> {
        self.inner.registry.read().tagged(tag)
    }

    pub(crate) fn drop_deferred(&self, key: &AbstractKey) {
        let mut registry = self.inner.registry.write();
        let key = registry.canonical(key);
        registry.drop_deferred(&key);
    }

    /// The resolution algorithm. `frame` is the build that asked for `key`.
    pub(crate) fn make_within(&self, key: AbstractKey, frame: Option<&BuildFrame<'_>>) -> Result<Value> {
        loop {
            let (canonical, lookup) = {
                let registry = self.inner.registry.read();
                let canonical = registry.canonical(&key);
                let lookup = registry.lookup(&canonical);
                (canonical, lookup)
            };
            trace!(key = %key, canonical = %canonical, consumer = ?frame.map(BuildFrame::key), "Resolving");

            if let Lookup::Instance(value) = lookup {
                return Ok(value);
            }

            if let Some(factory) = frame.and_then(|f| self.contextual_factory(f.key(), &canonical)) {
                trace!(key = %canonical, "Using contextual binding");
                let (value, _) = self.build(&canonical, &factory, frame)?;
                self.finish(&canonical, &value, Built::Contextual);
                return Ok(value);
            }

            match lookup {
                Lookup::Factory(registration) => return self.build_registration(&canonical, &registration, frame),
                Lookup::Deferred(activator) => {
                    debug!(key = %canonical, "Activating deferred binding");
                    activator(self)?;
                    // A provider that listed the key without binding it leaves the placeholder behind.
                    self.drop_deferred(&canonical);
                }
                Lookup::Instance(value) => return Ok(value),
                Lookup::Missing => return Err(self.not_registered(canonical, frame)),
            }
        }
    }

    fn build_registration(
        &self,
        key: &AbstractKey,
        registration: &Registration,
        frame: Option<&BuildFrame<'_>>,
    ) -> Result<Value> {
        if !registration.scope.is_cached() {
            let (value, _) = self.build(key, &registration.factory, frame)?;
            self.finish(key, &value, Built::Transient);
            return Ok(value);
        }

        // Must happen before touching the gate: re-entering a OnceCell from its own initializer deadlocks.
        check_cycle(key, frame)?;

        let mut applied = None;
        let value = registration
            .gate
            .get_or_try_init(|| {
                let (value, count) = self.build(key, &registration.factory, frame)?;
                applied = Some(count);
                Ok::<_, BinderyError>(value)
            })?
            .clone();

        let Some(applied) = applied else {
            return Ok(value);
        };
        let gate = &registration.gate;
        if self.finish(key, &value, Built::Singleton { gate, applied }) {
            // Extenders registered while the factory ran missed this value.
            if let Some(latest) = self.apply_late_extenders(key)? {
                return Ok(latest);
            }
        }
        Ok(value)
    }

    /// Runs a factory with `key` pushed onto the build context, then the
    /// extenders. Also returns how many extenders were applied.
    fn build(&self, key: &AbstractKey, factory: &FactoryFn, parent: Option<&BuildFrame<'_>>) -> Result<(Value, usize)> {
        check_cycle(key, parent)?;

        let value = {
            let frame = BuildFrame::new(key.clone(), parent);
            factory(&Resolver::new(self, Some(&frame)))?
        };

        let extenders = self.inner.registry.read().extenders(key);
        let outer = Resolver::new(self, parent);
        let value = extenders
            .iter()
            .try_fold(value, |value, extender| extender(value, &outer))?;
        Ok((value, extenders.len()))
    }

    /// Records a fresh build and notifies observers. Returns whether a
    /// singleton was cached.
    fn finish(&self, key: &AbstractKey, value: &Value, built: Built<'_>) -> bool {
        let (cached, callbacks) = {
            let mut registry = self.inner.registry.write();
            let cached = match built {
                Built::Singleton { gate, applied } => {
                    let cached = registry.cache_singleton(key, value, gate, applied);
                    if cached {
                        registry.mark_resolved(key);
                    }
                    cached
                }
                Built::Transient => {
                    registry.mark_resolved(key);
                    false
                }
                Built::Contextual => false,
            };
            (cached, registry.after_resolving_callbacks())
        };

        for callback in callbacks {
            callback(key, value);
        }
        cached
    }

    fn fire_rebound(&self, key: &AbstractKey, value: &Value) {
        let callbacks = self.inner.registry.read().rebound_callbacks(key);
        trace!(key = %key, callbacks = callbacks.len(), "Firing rebound callbacks");
        for callback in callbacks {
            callback(self, value);
        }
    }

    fn contextual_factory(&self, consumer: &AbstractKey, needed: &AbstractKey) -> Option<FactoryFn> {
        if self.inner.contextual.is_empty() {
            return None;
        }
        self.inner
            .contextual
            .get(&(consumer.clone(), needed.clone()))
            .map(|entry| entry.value().clone())
    }

    fn not_registered(&self, requested: AbstractKey, frame: Option<&BuildFrame<'_>>) -> BinderyError {
        let names = self.inner.registry.read().known_names();
        let available: Vec<&str> = names.iter().map(AbstractKey::as_str).collect();
        let suggestions = suggest_similar(requested.as_str(), &available, self.inner.settings.max_suggestions);

        BinderyError::UnregisteredAbstract(NotRegisteredError {
            requested,
            required_by: frame.map(|f| f.key().clone()),
            suggestions,
        })
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.read();
        f.debug_struct("Container")
            .field("registered", &registry.len())
            .field("contextual", &self.inner.contextual.len())
            .field("allow_override", &self.inner.settings.allow_override)
            .finish()
    }
}

fn erase<T, F>(factory: F) -> FactoryFn
where
    T: Any + Send + Sync,
    F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move |resolver: &Resolver<'_>| factory(resolver).map(Value::new))
}

fn check_cycle(key: &AbstractKey, frame: Option<&BuildFrame<'_>>) -> Result<()> {
    let Some(frame) = frame.filter(|f| f.contains(key)) else {
        return Ok(());
    };

    let path = frame.path();
    let start = path.iter().position(|k| k == key).unwrap_or(0);
    let mut chain = path[start..].to_vec();
    chain.push(key.clone());

    warn!(cycle = ?chain, "Circular dependency detected");
    Err(BinderyError::CircularDependency(CircularDependencyError { chain }))
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder};
    pub use crate::error::{BinderyError, Result};
    pub use crate::key::{AbstractKey, Key};
    pub use crate::provider::{ProviderStatus, ServiceProvider};
    pub use crate::provider_registry::ProviderRegistry;
    pub use crate::resolver::Resolver;
    pub use crate::scope::Scope;
    pub use crate::value::Value;
    pub use std::sync::Arc;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[test]
    fn transient_counts_up() {
        let container = Container::new();
        let count = counter();
        let c = count.clone();
        container.bind("Foo", move |_| Ok(c.fetch_add(1, Ordering::SeqCst) + 1)).unwrap();

        assert_eq!(*container.resolve::<u32>("Foo").unwrap(), 1);
        assert_eq!(*container.resolve::<u32>("Foo").unwrap(), 2);
    }

    #[test]
    fn singleton_factory_called_once() {
        let container = Container::new();
        let count = counter();
        let c = count.clone();
        container.singleton("Bar", move |_| Ok(c.fetch_add(1, Ordering::SeqCst) + 1)).unwrap();

        assert_eq!(*container.resolve::<u32>("Bar").unwrap(), 1);
        assert_eq!(*container.resolve::<u32>("Bar").unwrap(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn singleton_values_are_identical() {
        let container = Container::new();
        container.singleton("cache", |_| Ok(vec![0u8; 4])).unwrap();

        let a = container.make("cache").unwrap();
        let b = container.make("cache").unwrap();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn transient_values_are_distinct() {
        let container = Container::new();
        container.bind("request", |_| Ok(String::from("req"))).unwrap();

        let a = container.make("request").unwrap();
        let b = container.make("request").unwrap();
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn instance_is_returned_as_is() {
        let container = Container::new();
        let shared = Arc::new(String::from("shared"));
        container.instance_arc("name", shared.clone()).unwrap();

        let resolved: Arc<String> = container.resolve("name").unwrap();
        assert!(Arc::ptr_eq(&resolved, &shared));
        assert!(container.resolved("name"));
    }

    #[test]
    fn unregistered_key_fails_with_suggestions() {
        let container = Container::new();
        container.instance("config", 1u8).unwrap();

        match container.make("confg") {
            Err(BinderyError::UnregisteredAbstract(e)) => {
                assert_eq!(e.requested, "confg");
                assert!(e.required_by.is_none());
                assert_eq!(e.suggestions, vec!["config".to_string()]);
            }
            other => panic!("expected UnregisteredAbstract, got {other:?}"),
        }
    }

    #[test]
    fn missing_dependency_names_its_consumer() {
        let container = Container::new();
        container.bind("mailer", |r| r.make("transport")).unwrap();

        match container.make("mailer") {
            Err(BinderyError::UnregisteredAbstract(e)) => {
                assert_eq!(e.requested, "transport");
                assert_eq!(e.required_by.unwrap(), "mailer");
            }
            other => panic!("expected UnregisteredAbstract, got {other:?}"),
        }
    }

    #[test]
    fn type_mismatch_reports_types() {
        let container = Container::new();
        container.instance("port", 8000u16).unwrap();

        match container.resolve::<String>("port") {
            Err(BinderyError::TypeMismatch(e)) => {
                assert_eq!(e.key, "port");
                assert!(e.expected.contains("String"));
                assert_eq!(e.actual, "u16");
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn typed_token_round_trip() {
        const PORT: Key<u16> = Key::new("port");
        let container = Container::new();
        container.instance(&PORT, 8080u16).unwrap();
        assert_eq!(*container.get(&PORT).unwrap(), 8080);
    }

    #[test]
    fn resolve_cloned_copies_value() {
        let container = Container::new();
        container.instance("greeting", String::from("hi")).unwrap();
        let greeting: String = container.resolve_cloned("greeting").unwrap();
        assert_eq!(greeting, "hi");
    }

    #[test]
    fn alias_shares_singleton() {
        let container = Container::new();
        let count = counter();
        let c = count.clone();
        container.singleton("a", move |_| Ok(c.fetch_add(1, Ordering::SeqCst))).unwrap();
        container.alias("a", "b").unwrap();

        let via_alias = container.make("b").unwrap();
        let direct = container.make("a").unwrap();
        assert!(via_alias.ptr_eq(&direct));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(container.is_alias("b"));
        assert!(container.bound("b"));
    }

    #[test]
    fn self_alias_is_an_error() {
        let container = Container::new();
        assert!(matches!(container.alias("view", "view"), Err(BinderyError::SelfAlias { .. })));
    }

    #[test]
    fn binding_through_alias_targets_canonical_key() {
        let container = Container::new();
        container.instance("config", 1u8).unwrap();
        container.alias("config", "configuration").unwrap();
        container.instance("configuration", 2u8).unwrap();

        assert_eq!(*container.resolve::<u8>("config").unwrap(), 2);
    }

    #[test]
    fn rebinding_evicts_cached_singleton_and_notifies() {
        let container = Container::new();
        container.singleton("driver", |_| Ok(String::from("file"))).unwrap();
        let first: Arc<String> = container.resolve("driver").unwrap();
        assert_eq!(first.as_str(), "file");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        container.rebinding("driver", move |_, value| {
            log.lock().push(value.downcast::<String>().unwrap().to_string());
        });

        container.singleton("driver", |_| Ok(String::from("redis"))).unwrap();
        assert_eq!(*seen.lock(), vec!["redis".to_string()]);
        assert_eq!(container.resolve::<String>("driver").unwrap().as_str(), "redis");
    }

    #[test]
    fn rebinding_unresolved_key_is_silent() {
        let container = Container::new();
        container.singleton("driver", |_| Ok(1u8)).unwrap();
        let fired = counter();
        let f = fired.clone();
        container.rebinding("driver", move |_, _| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        container.singleton("driver", |_| Ok(2u8)).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!container.resolved("driver"));
    }

    #[test]
    fn instance_over_bound_key_notifies() {
        let container = Container::new();
        container.bind("clock", |_| Ok(0u64)).unwrap();
        let fired = counter();
        let f = fired.clone();
        container.rebinding("clock", move |_, value| {
            assert_eq!(*value.downcast::<u64>().unwrap(), 42);
            f.fetch_add(1, Ordering::SeqCst);
        });

        container.instance("clock", 42u64).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn extenders_apply_in_order() {
        let container = Container::new();
        container.bind("greeting", |_| Ok(String::from("hello"))).unwrap();
        container.extend("greeting", |s: Arc<String>, _| Ok(format!("{s} world"))).unwrap();
        container.extend("greeting", |s: Arc<String>, _| Ok(format!("{s}!"))).unwrap();

        assert_eq!(container.resolve::<String>("greeting").unwrap().as_str(), "hello world!");
    }

    #[test]
    fn extend_after_resolution_rewraps_once_and_notifies() {
        let container = Container::new();
        let builds = counter();
        let b = builds.clone();
        container
            .singleton("k", move |_| {
                b.fetch_add(1, Ordering::SeqCst);
                Ok(String::from("base"))
            })
            .unwrap();
        container.extend("k", |s: Arc<String>, _| Ok(format!("{s}+a"))).unwrap();
        assert_eq!(container.resolve::<String>("k").unwrap().as_str(), "base+a");

        let rebound = Arc::new(Mutex::new(None));
        let slot = rebound.clone();
        container.rebinding("k", move |_, value| {
            *slot.lock() = Some(value.downcast::<String>().unwrap().to_string());
        });

        container.extend("k", |s: Arc<String>, _| Ok(format!("{s}+b"))).unwrap();
        assert_eq!(container.resolve::<String>("k").unwrap().as_str(), "base+a+b");
        assert_eq!(rebound.lock().as_deref(), Some("base+a+b"));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn extend_during_singleton_build_is_not_lost() {
        use std::sync::Barrier;
        use std::thread;

        let container = Container::new();
        let builds = counter();
        let b = builds.clone();
        container
            .singleton("k", move |_| {
                b.fetch_add(1, Ordering::SeqCst);
                Ok(String::from("base"))
            })
            .unwrap();

        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let (e, r) = (entered.clone(), release.clone());
        container
            .extend("k", move |s: Arc<String>, _| {
                e.wait();
                r.wait();
                Ok(format!("{s}+a"))
            })
            .unwrap();

        let builder = {
            let container = container.clone();
            thread::spawn(move || container.resolve_cloned::<String>("k").unwrap())
        };
        // The builder is now running the first extender.
        entered.wait();
        container.extend("k", |s: Arc<String>, _| Ok(format!("{s}+b"))).unwrap();
        release.wait();

        assert_eq!(builder.join().unwrap(), "base+a+b");
        assert_eq!(container.resolve::<String>("k").unwrap().as_str(), "base+a+b");
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn extend_with_wrong_type_fails_on_make() {
        let container = Container::new();
        container.bind("n", |_| Ok(1u32)).unwrap();
        container.extend("n", |s: Arc<String>, _| Ok(s.to_string())).unwrap();
        assert!(matches!(container.make("n"), Err(BinderyError::TypeMismatch(_))));
    }

    #[test]
    fn tagged_resolves_in_order() {
        let container = Container::new();
        container.instance("cpu", String::from("cpu")).unwrap();
        container.instance("memory", String::from("memory")).unwrap();
        container.tag(["cpu", "memory"], "reports");

        let reports: Vec<String> = container
            .tagged_as::<String>("reports")
            .unwrap()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(reports, vec!["cpu", "memory"]);
        assert!(container.tagged("nothing").unwrap().is_empty());
    }

    #[test]
    fn tagged_matches_make() {
        let container = Container::new();
        container.singleton("a", |_| Ok(1u8)).unwrap();
        container.singleton("b", |_| Ok(2u8)).unwrap();
        container.tag(["a", "b"], "t");

        let tagged = container.tagged("t").unwrap();
        assert!(tagged[0].ptr_eq(&container.make("a").unwrap()));
        assert!(tagged[1].ptr_eq(&container.make("b").unwrap()));
    }

    #[test]
    fn contextual_value_only_for_consumer() {
        let container = Container::new();
        container.bind("Dep", |_| Ok(7i32)).unwrap();
        container.when("Consumer").needs("Dep").give_value(42i32);
        container.bind("Consumer", |r| r.resolve::<i32>("Dep").map(|dep| *dep)).unwrap();
        container.bind("Other", |r| r.resolve::<i32>("Dep").map(|dep| *dep)).unwrap();

        assert_eq!(*container.resolve::<i32>("Consumer").unwrap(), 42);
        assert_eq!(*container.resolve::<i32>("Other").unwrap(), 7);
        assert_eq!(*container.resolve::<i32>("Dep").unwrap(), 7);
    }

    #[test]
    fn contextual_override_applies_only_to_innermost_consumer() {
        let container = Container::new();
        container.bind("Dep", |_| Ok(String::from("default"))).unwrap();
        container.when("Outer").needs("Dep").give(|_| Ok(String::from("contextual")));
        container.bind("Inner", |r| r.resolve_cloned::<String>("Dep")).unwrap();
        container
            .bind("Outer", |r| {
                let own = r.resolve_cloned::<String>("Dep")?;
                let inner = r.resolve_cloned::<String>("Inner")?;
                Ok(format!("{own}/{inner}"))
            })
            .unwrap();

        assert_eq!(container.resolve::<String>("Outer").unwrap().as_str(), "contextual/default");
    }

    #[test]
    fn contextual_results_are_not_cached() {
        let container = Container::new();
        container.singleton("Dep", |_| Ok(String::from("shared"))).unwrap();
        container.when("Consumer").needs("Dep").give(|_| Ok(String::from("scoped")));
        container.bind("Consumer", |r| r.resolve_cloned::<String>("Dep")).unwrap();

        assert_eq!(container.resolve::<String>("Consumer").unwrap().as_str(), "scoped");
        assert!(!container.resolved("Dep"));
        assert_eq!(container.resolve::<String>("Dep").unwrap().as_str(), "shared");
    }

    #[test]
    fn cached_instance_beats_contextual() {
        let container = Container::new();
        container.instance("Dep", 1u8).unwrap();
        container.when("Consumer").needs("Dep").give_value(2u8);
        container.bind("Consumer", |r| r.resolve_cloned::<u8>("Dep")).unwrap();

        // The instance is cached, so the contextual entry is never consulted.
        assert_eq!(*container.resolve::<u8>("Consumer").unwrap(), 1);
    }

    #[test]
    fn circular_dependency_is_reported() {
        let container = Container::new();
        container.singleton("a", |r| r.make("b")).unwrap();
        container.bind("b", |r| r.make("a")).unwrap();

        match container.make("a") {
            Err(BinderyError::CircularDependency(e)) => {
                assert_eq!(e.chain, vec!["a", "b", "a"]);
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
        // The failed build left nothing cached; fixing the binding works.
        container.bind("b", |_| Ok(5u8)).unwrap();
        assert_eq!(*container.resolve::<u8>("a").unwrap(), 5);
    }

    #[test]
    fn failing_factory_unwinds_build_context() {
        let container = Container::new();
        container.bind("broken", |_| Err::<u8, _>(BinderyError::construction("broken", "boom"))).unwrap();
        container
            .bind("consumer", |r| {
                assert!(r.make("broken").is_err());
                Ok(r.build_path())
            })
            .unwrap();

        let path = container.resolve::<Vec<AbstractKey>>("consumer").unwrap();
        assert_eq!(*path, vec![AbstractKey::from("consumer")]);
    }

    #[test]
    fn panicking_factory_unwinds_build_context() {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        let container = Container::new();
        let attempts = counter();
        let a = attempts.clone();
        container
            .singleton("fragile", move |_| {
                if a.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("fragile factory panicked");
                }
                Ok(String::from("recovered"))
            })
            .unwrap();
        container
            .bind("consumer", |r| {
                assert!(catch_unwind(AssertUnwindSafe(|| r.make("fragile"))).is_err());
                Ok(r.build_path())
            })
            .unwrap();

        let path = container.resolve::<Vec<AbstractKey>>("consumer").unwrap();
        assert_eq!(*path, vec![AbstractKey::from("consumer")]);
        assert!(!container.resolved("fragile"));
        assert_eq!(container.resolve::<String>("fragile").unwrap().as_str(), "recovered");
    }

    #[test]
    fn failed_rebuild_keeps_new_binding() {
        let container = Container::new();
        container.singleton("driver", |_| Ok(String::from("file"))).unwrap();
        container.make("driver").unwrap();

        let err = container
            .singleton("driver", |_| Err::<String, _>(BinderyError::construction("driver", "no socket")))
            .unwrap_err();
        assert!(matches!(err, BinderyError::ConstructionFailed { .. }));
        assert!(container.bound("driver"));
        assert!(!container.resolved("driver"));
        assert!(container.make("driver").is_err());

        container.singleton("driver", |_| Ok(String::from("redis"))).unwrap();
        assert_eq!(container.resolve::<String>("driver").unwrap().as_str(), "redis");
    }

    #[test]
    fn failed_singleton_can_be_retried() {
        let container = Container::new();
        let attempts = counter();
        let a = attempts.clone();
        container
            .singleton("flaky", move |_| {
                if a.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(BinderyError::construction("flaky", "first attempt fails"))
                } else {
                    Ok(String::from("ok"))
                }
            })
            .unwrap();

        assert!(matches!(container.make("flaky"), Err(BinderyError::ConstructionFailed { .. })));
        assert_eq!(container.resolve::<String>("flaky").unwrap().as_str(), "ok");
        assert!(container.resolved("flaky"));
    }

    #[test]
    fn after_resolving_fires_on_fresh_builds_only() {
        let container = Container::new();
        container.singleton("s", |_| Ok(1u8)).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        container.after_resolving(move |key, _| log.lock().push(key.to_string()));

        container.make("s").unwrap();
        container.make("s").unwrap();
        assert_eq!(*seen.lock(), vec!["s".to_string()]);
    }

    #[test]
    fn forget_removes_binding_and_instance() {
        let container = Container::new();
        container.singleton("s", |_| Ok(1u8)).unwrap();
        container.make("s").unwrap();
        container.forget("s");

        assert!(!container.bound("s"));
        assert!(!container.resolved("s"));
        assert!(container.make("s").unwrap_err().is_unregistered());
    }

    #[test]
    fn flush_keeps_self_registration() {
        let container = Container::new();
        container.instance("config", 1u8).unwrap();
        container.alias("config", "cfg").unwrap();
        container.tag(["config"], "all");
        container.flush();

        assert!(!container.bound("config"));
        assert!(!container.is_alias("cfg"));
        assert!(container.tagged("all").unwrap().is_empty());
        assert_eq!(container.bindings(), vec![CONTAINER_KEY]);

        let me: Arc<Container> = container.resolve("container").unwrap();
        assert!(me.ptr_eq(&container));
    }

    #[test]
    fn override_can_be_disabled() {
        let container = Container::builder().allow_override(false).build();
        container.singleton("db", |_| Ok(1u8)).unwrap();
        assert!(matches!(
            container.singleton("db", |_| Ok(2u8)),
            Err(BinderyError::AlreadyRegistered(_))
        ));
        container.forget("db");
        container.singleton("db", |_| Ok(3u8)).unwrap();
    }

    #[test]
    fn deferred_binding_activates_once() {
        let container = Container::new();
        let activations = counter();
        let a = activations.clone();
        container
            .defer("mailer", move |c| {
                a.fetch_add(1, Ordering::SeqCst);
                c.singleton("mailer", |_| Ok(String::from("smtp")))
            })
            .unwrap();

        assert!(container.bound("mailer"));
        assert!(!container.resolved("mailer"));
        assert_eq!(container.resolve::<String>("mailer").unwrap().as_str(), "smtp");
        assert_eq!(container.resolve::<String>("mailer").unwrap().as_str(), "smtp");
        assert_eq!(activations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deferred_binding_that_binds_nothing_is_unregistered() {
        let container = Container::new();
        container.defer("ghost", |_| Ok(())).unwrap();
        assert!(container.make("ghost").unwrap_err().is_unregistered());
        assert!(!container.bound("ghost"));
    }

    #[test]
    fn debug_display() {
        let container = Container::new();
        container.instance("one", 1i32).unwrap();
        let debug = format!("{container:?}");
        assert!(debug.contains("Container"));
        assert!(debug.contains("registered: 2"));
    }
}
