//! Provider lifecycle: register, boot, and lazy activation of deferred providers.
//!
//! ```text
//!  register(p) ──eager──> p.register() ──> loaded ──boot()──> p.boot()
//!       │                                     ▲
//!       └─deferred─> placeholder per key ─────┘  first make(key):
//!                                                 p.register() once, boot if booted
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use crate::container::Container;
use crate::error::{BinderyError, Result};
use crate::key::AbstractKey;
use crate::provider::{ProviderStatus, ServiceProvider};

/// Registers and boots [`ServiceProvider`]s against one container.
///
/// Handles are cheap to clone and share their state.
#[derive(Clone)]
pub struct ProviderRegistry {
    container: Container,
    state: Arc<Mutex<RegistryState>>,
}

#[derive(Default)]
struct RegistryState {
    /// Providers whose `register` has run, in registration order.
    loaded: Vec<Arc<dyn ServiceProvider>>,
    /// Keys still waiting on a deferred provider.
    deferred: BTreeMap<AbstractKey, Arc<dyn ServiceProvider>>,
    registered: HashSet<usize>,
    statuses: HashMap<usize, ProviderStatus>,
    booted: bool,
}

/// Shared by the placeholders of one deferred provider.
struct Activation {
    provider: Arc<dyn ServiceProvider>,
    keys: Vec<AbstractKey>,
    latch: OnceCell<()>,
    /// Thread running `register`, so that a provider resolving its own keys fails instead of deadlocking.
    activating: Mutex<Option<ThreadId>>,
}

fn provider_id(provider: &Arc<dyn ServiceProvider>) -> usize {
    Arc::as_ptr(provider).cast::<()>() as usize
}

impl ProviderRegistry {
    /// Creates a registry bound to `container`.
    pub fn new(container: Container) -> Self {
        Self {
            container,
            state: Arc::new(Mutex::new(RegistryState::default())),
        }
    }

    /// The container providers register into.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Adds a provider.
    ///
    /// An eager provider registers at once, and boots at once if
    /// [`boot`](Self::boot) has already run. A deferred provider only
    /// installs placeholders for the keys it provides. Registering the same
    /// provider (the same `Arc`) twice does nothing.
    ///
    /// A deferred provider whose boot fails while it is being activated is
    /// left registered but not booted. Later resolves of its keys do not
    /// boot it again; the next [`boot`](Self::boot) does.
    ///
    /// # Errors
    /// [`BinderyError::ProviderRegistration`] or [`BinderyError::ProviderBoot`]
    /// wrapping the provider's own error. A provider that failed to register
    /// may be registered again.
    pub fn register(&self, provider: Arc<dyn ServiceProvider>) -> Result<()> {
        let id = provider_id(&provider);
        if !self.state.lock().registered.insert(id) {
            debug!(provider = provider.name(), "Provider already registered");
            return Ok(());
        }

        if provider.is_deferred() {
            return self.register_deferred(provider, id);
        }

        if let Err(source) = provider.register(&self.container) {
            self.state.lock().registered.remove(&id);
            return Err(registration_failed(provider.as_ref(), source));
        }
        info!(provider = provider.name(), "Registered provider");

        let boot_now = {
            let mut state = self.state.lock();
            state.loaded.push(provider.clone());
            state.statuses.insert(id, ProviderStatus::Registered);
            state.booted
        };

        if boot_now {
            boot_provider(&self.state, &self.container, &provider)?;
        }
        Ok(())
    }

    fn register_deferred(&self, provider: Arc<dyn ServiceProvider>, id: usize) -> Result<()> {
        let keys = provider.provides();
        if keys.is_empty() {
            warn!(provider = provider.name(), "Deferred provider provides no keys and will never load");
        }

        {
            let mut state = self.state.lock();
            for key in &keys {
                state.deferred.insert(key.clone(), provider.clone());
            }
            state.statuses.insert(id, ProviderStatus::Deferred);
        }

        let activation = Arc::new(Activation {
            provider: provider.clone(),
            keys: keys.clone(),
            latch: OnceCell::new(),
            activating: Mutex::new(None),
        });

        for key in keys {
            let activation = activation.clone();
            let state = self.state.clone();
            self.container
                .defer(key, move |container| activation.run(container, &state))?;
        }
        info!(provider = provider.name(), "Deferred provider");
        Ok(())
    }

    /// Boots every registered provider that has not booted yet, in
    /// registration order. Later calls only boot providers added since.
    ///
    /// # Errors
    /// The first [`BinderyError::ProviderBoot`]; providers after it are not
    /// booted, and the failed one is retried by the next call.
    #[instrument(skip(self), name = "provider_boot")]
    pub fn boot(&self) -> Result<()> {
        let pending = {
            let mut state = self.state.lock();
            state.booted = true;
            state
                .loaded
                .iter()
                .filter(|p| state.statuses.get(&provider_id(p)) != Some(&ProviderStatus::Booted))
                .cloned()
                .collect::<Vec<_>>()
        };

        debug!(count = pending.len(), "Booting providers");
        for provider in &pending {
            boot_provider(&self.state, &self.container, provider)?;
        }
        Ok(())
    }

    /// `true` once [`boot`](Self::boot) has been called.
    pub fn booted(&self) -> bool {
        self.state.lock().booted
    }

    /// Providers whose `register` has run, in order. Deferred providers
    /// appear once activated.
    pub fn providers(&self) -> Vec<Arc<dyn ServiceProvider>> {
        self.state.lock().loaded.clone()
    }

    /// Keys still waiting on a deferred provider, sorted.
    pub fn deferred_services(&self) -> Vec<AbstractKey> {
        self.state.lock().deferred.keys().cloned().collect()
    }

    /// Lifecycle stage of a provider, or `None` if it was never registered here.
    pub fn status(&self, provider: &Arc<dyn ServiceProvider>) -> Option<ProviderStatus> {
        self.state.lock().statuses.get(&provider_id(provider)).copied()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ProviderRegistry")
            .field("loaded", &state.loaded.iter().map(|p| p.name().to_string()).collect::<Vec<_>>())
            .field("deferred", &state.deferred.keys().collect::<Vec<_>>())
            .field("booted", &state.booted)
            .finish()
    }
}

impl Activation {
    /// Loads the provider the first time any of its keys is resolved.
    fn run(&self, container: &Container, state: &Mutex<RegistryState>) -> Result<()> {
        let current = thread::current().id();
        if *self.activating.lock() == Some(current) {
            trace!(provider = self.provider.name(), "Provider resolved its own key while registering");
            return Ok(());
        }

        let mut loaded_here = false;
        self.latch.get_or_try_init(|| {
            *self.activating.lock() = Some(current);
            let result = self.load(container, state);
            *self.activating.lock() = None;
            loaded_here = result.is_ok();
            result
        })?;

        // Booting outside the latch keeps a failed boot from registering the provider twice.
        // The latch is spent either way, so only `boot()` retries a failed boot.
        if loaded_here && state.lock().booted {
            boot_provider(state, container, &self.provider)?;
        }
        Ok(())
    }

    fn load(&self, container: &Container, state: &Mutex<RegistryState>) -> Result<()> {
        self.provider
            .register(container)
            .map_err(|source| registration_failed(self.provider.as_ref(), source))?;

        for key in &self.keys {
            container.drop_deferred(key);
        }

        {
            let mut state = state.lock();
            for key in &self.keys {
                state.deferred.remove(key);
            }
            state.loaded.push(self.provider.clone());
            state
                .statuses
                .insert(provider_id(&self.provider), ProviderStatus::Registered);
        }
        info!(provider = self.provider.name(), "Activated deferred provider");
        Ok(())
    }
}

fn boot_provider(state: &Mutex<RegistryState>, container: &Container, provider: &Arc<dyn ServiceProvider>) -> Result<()> {
    let id = provider_id(provider);
    {
        let mut state = state.lock();
        if state.statuses.get(&id) == Some(&ProviderStatus::Booted) {
            return Ok(());
        }
        state.statuses.insert(id, ProviderStatus::Booted);
    }

    if let Err(source) = provider.boot(container) {
        state.lock().statuses.insert(id, ProviderStatus::Registered);
        warn!(provider = provider.name(), error = %source, "Provider failed to boot");
        return Err(BinderyError::ProviderBoot {
            provider: provider.name().to_string(),
            source: Box::new(source),
        });
    }

    info!(provider = provider.name(), "Booted provider");
    Ok(())
}

fn registration_failed(provider: &dyn ServiceProvider, source: BinderyError) -> BinderyError {
    warn!(provider = provider.name(), error = %source, "Provider failed to register");
    BinderyError::ProviderRegistration {
        provider: provider.name().to_string(),
        source: Box::new(source),
    }
}
