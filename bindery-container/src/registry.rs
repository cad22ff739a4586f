//! Binding registry — the container's tables.
//!
//! Holds bindings, cached instances, aliases, extenders, tags and
//! observer lists. The registry itself never runs user code: the
//! [`Container`](crate::container::Container) reads what it needs under a
//! lock, releases the lock, and only then calls factories or callbacks.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use crate::container::Container;
use crate::error::{AlreadyRegisteredError, BinderyError, Result};
use crate::key::AbstractKey;
use crate::resolver::Resolver;
use crate::scope::Scope;
use crate::snapshot::{BindingInfo, ContainerSnapshot};
use crate::value::Value;

/// Type alias for factory functions.
///
/// A factory receives a [`Resolver`] (to resolve its own dependencies in
/// the current build context) and returns the built value.
///
/// `Arc` rather than `Box`: a factory is cloned out of the registry so it
/// can run without the registry lock held.
pub type FactoryFn = Arc<dyn Fn(&Resolver<'_>) -> Result<Value> + Send + Sync>;

/// Decorator applied to freshly built values of one key.
pub type ExtenderFn = Arc<dyn Fn(Value, &Resolver<'_>) -> Result<Value> + Send + Sync>;

/// One-shot hook that performs the real registration behind a deferred key.
pub type ActivatorFn = Arc<dyn Fn(&Container) -> Result<()> + Send + Sync>;

/// Observer fired with the rebuilt value when a resolved key is rebound.
pub type ReboundFn = Arc<dyn Fn(&Container, &Value) + Send + Sync>;

/// Observer fired after every fresh build.
pub type AfterResolvingFn = Arc<dyn Fn(&AbstractKey, &Value) + Send + Sync>;

/// A factory registration.
///
/// `gate` makes singleton construction exactly-once; a new registration
/// always gets a new gate, so values built for an older binding are never
/// observed through the new one.
#[derive(Clone)]
pub(crate) struct Registration {
    pub factory: FactoryFn,
    pub scope: Scope,
    pub gate: Arc<OnceCell<Value>>,
}

impl Registration {
    pub fn new(factory: FactoryFn, scope: Scope) -> Self {
        Self {
            factory,
            scope,
            gate: Arc::new(OnceCell::new()),
        }
    }
}

#[derive(Clone)]
pub(crate) enum Binding {
    Factory(Registration),
    /// Placeholder installed for a deferred provider's key.
    Deferred(ActivatorFn),
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Factory(reg) => f.debug_struct("Factory").field("scope", &reg.scope).finish(),
            Binding::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// What a resolution should do next for a canonical key.
pub(crate) enum Lookup {
    Instance(Value),
    Factory(Registration),
    Deferred(ActivatorFn),
    Missing,
}

/// Stores every table of one container.
#[derive(Default)]
pub(crate) struct Registry {
    bindings: HashMap<AbstractKey, Binding>,
    instances: HashMap<AbstractKey, Value>,
    /// How many of a key's extenders its cached instance has been through.
    decorated: HashMap<AbstractKey, usize>,
    aliases: HashMap<AbstractKey, AbstractKey>,
    resolved: HashSet<AbstractKey>,
    extenders: HashMap<AbstractKey, Vec<ExtenderFn>>,
    tags: HashMap<String, Vec<AbstractKey>>,
    rebound: HashMap<AbstractKey, Vec<ReboundFn>>,
    after_resolving: Vec<AfterResolvingFn>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Follows the alias table to the canonical key.
    ///
    /// Chains are acyclic: [`Registry::register_alias`] refuses to close a loop.
    pub fn canonical(&self, key: &AbstractKey) -> AbstractKey {
        let mut current = key;
        while let Some(target) = self.aliases.get(current) {
            trace!(from = %current, to = %target, "Following alias");
            current = target;
        }
        current.clone()
    }

    /// Registers a binding under a canonical key.
    ///
    /// Evicts any cached instance. Returns whether the key had been
    /// resolved before, so the caller knows to fire rebind callbacks.
    ///
    /// # Errors
    /// [`BinderyError::AlreadyRegistered`] if the key is bound and
    /// `allow_override` is false. Deferred placeholders never count as bound.
    pub fn register_binding(
        &mut self,
        key: AbstractKey,
        binding: Binding,
        allow_override: bool,
    ) -> Result<bool> {
        if !allow_override && self.is_concretely_bound(&key) {
            return Err(BinderyError::AlreadyRegistered(AlreadyRegisteredError { key }));
        }

        let had_instance = self.instances.remove(&key).is_some();
        self.decorated.remove(&key);
        let was_resolved = self.resolved.remove(&key) || had_instance;
        debug!(key = %key, binding = ?binding, "Registered binding");
        self.bindings.insert(key, binding);
        Ok(was_resolved)
    }

    /// Stores a pre-built value, removing the binding for the key.
    ///
    /// Returns whether the key was bound or resolved before.
    pub fn put_instance(&mut self, key: AbstractKey, value: Value, allow_override: bool) -> Result<bool> {
        if !allow_override && self.is_concretely_bound(&key) {
            return Err(BinderyError::AlreadyRegistered(AlreadyRegisteredError { key }));
        }

        let had_binding = self.bindings.remove(&key).is_some();
        let was_resolved = self.resolved.remove(&key);
        let was_known = had_binding || was_resolved || self.instances.contains_key(&key);
        debug!(key = %key, value = ?value, "Registered instance");
        // Extenders registered before the instance do not apply to it.
        let applied = self.extenders.get(&key).map_or(0, Vec::len);
        self.decorated.insert(key.clone(), applied);
        self.instances.insert(key, value);
        Ok(was_known)
    }

    /// Registers `alias` as another name for `key`.
    ///
    /// # Errors
    /// [`BinderyError::SelfAlias`] if `alias` equals `key` or the key
    /// already resolves to `alias`.
    pub fn register_alias(&mut self, key: AbstractKey, alias: AbstractKey) -> Result<()> {
        if alias == key {
            return Err(BinderyError::SelfAlias { key });
        }
        let target = self.canonical(&key);
        if target == alias {
            return Err(BinderyError::SelfAlias { key: alias });
        }

        debug!(alias = %alias, target = %target, "Registered alias");
        self.aliases.insert(alias, target);
        Ok(())
    }

    pub fn is_alias(&self, key: &AbstractKey) -> bool {
        self.aliases.contains_key(key)
    }

    /// Looks up a canonical key. Instances win over bindings.
    pub fn lookup(&self, key: &AbstractKey) -> Lookup {
        if let Some(value) = self.instances.get(key) {
            return Lookup::Instance(value.clone());
        }
        match self.bindings.get(key) {
            Some(Binding::Factory(reg)) => Lookup::Factory(reg.clone()),
            Some(Binding::Deferred(activator)) => Lookup::Deferred(activator.clone()),
            None => Lookup::Missing,
        }
    }

    /// Caches a singleton that went through the first `applied` extenders,
    /// unless the binding was replaced while it was being built.
    pub fn cache_singleton(
        &mut self,
        key: &AbstractKey,
        value: &Value,
        gate: &Arc<OnceCell<Value>>,
        applied: usize,
    ) -> bool {
        match self.bindings.get(key) {
            Some(Binding::Factory(reg)) if Arc::ptr_eq(&reg.gate, gate) => {
                self.instances.insert(key.clone(), value.clone());
                self.decorated.insert(key.clone(), applied);
                true
            }
            _ => false,
        }
    }

    pub fn mark_resolved(&mut self, key: &AbstractKey) {
        if !self.resolved.contains(key) {
            self.resolved.insert(key.clone());
        }
    }

    /// Removes a deferred placeholder; real bindings are left alone.
    pub fn drop_deferred(&mut self, key: &AbstractKey) -> bool {
        if matches!(self.bindings.get(key), Some(Binding::Deferred(_))) {
            self.bindings.remove(key);
            return true;
        }
        false
    }

    pub fn push_extender(&mut self, key: AbstractKey, extender: ExtenderFn) {
        self.extenders.entry(key).or_default().push(extender);
    }

    pub fn extenders(&self, key: &AbstractKey) -> Vec<ExtenderFn> {
        self.extenders.get(key).cloned().unwrap_or_default()
    }

    /// The cached instance, how many extenders it has been through, and
    /// the extenders it has not seen yet.
    pub fn pending_extenders(&self, key: &AbstractKey) -> Option<(Value, usize, Vec<ExtenderFn>)> {
        let current = self.instances.get(key)?.clone();
        let applied = self.decorated.get(key).copied().unwrap_or(0);
        let pending = self
            .extenders
            .get(key)
            .and_then(|all| all.get(applied..))
            .map(<[ExtenderFn]>::to_vec)
            .unwrap_or_default();
        Some((current, applied, pending))
    }

    /// Swaps a cached instance for one decorated by `count` more extenders,
    /// only if nothing replaced or decorated it in the meantime.
    pub fn replace_instance(&mut self, key: &AbstractKey, current: &Value, replacement: Value, count: usize) -> bool {
        let Some(slot) = self.instances.get_mut(key) else {
            return false;
        };
        if !slot.ptr_eq(current) {
            return false;
        }
        *slot = replacement;
        *self.decorated.entry(key.clone()).or_insert(0) += count;
        true
    }

    pub fn tag(&mut self, tag: String, keys: Vec<AbstractKey>) {
        debug!(tag = %tag, keys = ?keys, "Tagged bindings");
        self.tags.entry(tag).or_default().extend(keys);
    }

    pub fn tagged(&self, tag: &str) -> Vec<AbstractKey> {
        self.tags.get(tag).cloned().unwrap_or_default()
    }

    pub fn add_rebound(&mut self, key: AbstractKey, callback: ReboundFn) {
        self.rebound.entry(key).or_default().push(callback);
    }

    pub fn rebound_callbacks(&self, key: &AbstractKey) -> Vec<ReboundFn> {
        self.rebound.get(key).cloned().unwrap_or_default()
    }

    pub fn add_after_resolving(&mut self, callback: AfterResolvingFn) {
        self.after_resolving.push(callback);
    }

    pub fn after_resolving_callbacks(&self) -> Vec<AfterResolvingFn> {
        self.after_resolving.clone()
    }

    /// `true` if the key has a binding (deferred included) or an instance.
    pub fn is_bound(&self, key: &AbstractKey) -> bool {
        self.bindings.contains_key(key) || self.instances.contains_key(key)
    }

    fn is_concretely_bound(&self, key: &AbstractKey) -> bool {
        self.instances.contains_key(key) || matches!(self.bindings.get(key), Some(Binding::Factory(_)))
    }

    pub fn is_resolved(&self, key: &AbstractKey) -> bool {
        self.resolved.contains(key) || self.instances.contains_key(key)
    }

    /// Removes binding, instance and resolved mark for a key.
    pub fn forget(&mut self, key: &AbstractKey) {
        debug!(key = %key, "Forgot binding");
        self.bindings.remove(key);
        self.instances.remove(key);
        self.decorated.remove(key);
        self.resolved.remove(key);
    }

    /// Empties every table.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Registered keys, sorted: bindings and instances.
    pub fn keys(&self) -> Vec<AbstractKey> {
        let mut keys: Vec<AbstractKey> = self
            .bindings
            .keys()
            .chain(self.instances.keys().filter(|k| !self.bindings.contains_key(*k)))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Every name a caller could have meant: keys plus aliases.
    pub fn known_names(&self) -> Vec<AbstractKey> {
        let mut names = self.keys();
        names.extend(self.aliases.keys().cloned());
        names
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn snapshot(&self, contextual: usize) -> ContainerSnapshot {
        let bindings = self
            .keys()
            .into_iter()
            .map(|key| {
                let (scope, deferred) = match self.bindings.get(&key) {
                    Some(Binding::Factory(reg)) => (Some(reg.scope), false),
                    Some(Binding::Deferred(_)) => (None, true),
                    None => (None, false),
                };
                BindingInfo {
                    cached: self.instances.contains_key(&key),
                    resolved: self.is_resolved(&key),
                    extenders: self.extenders.get(&key).map_or(0, Vec::len),
                    scope,
                    deferred,
                    key,
                }
            })
            .collect();

        ContainerSnapshot {
            bindings,
            aliases: self.aliases.iter().map(|(a, k)| (a.clone(), k.clone())).collect::<BTreeMap<_, _>>(),
            tags: self.tags.iter().map(|(t, k)| (t.clone(), k.clone())).collect::<BTreeMap<_, _>>(),
            contextual,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("bindings", &self.bindings.len())
            .field("instances", &self.instances.len())
            .field("aliases", &self.aliases.len())
            .field("tags", &self.tags.len())
            .finish()
    }
}
