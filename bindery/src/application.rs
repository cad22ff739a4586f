//! Application kernel: a container plus its provider registry.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use bindery_container::{Container, ProviderRegistry, Result, ServiceProvider};
use tracing::{debug, info};

/// Top-level application object.
///
/// Derefs to its [`Container`], so bindings can be registered and resolved
/// on it directly.
///
/// ```rust
/// use bindery::prelude::*;
/// use bindery::Application;
///
/// struct RoutingProvider;
///
/// impl ServiceProvider for RoutingProvider {
///     fn register(&self, container: &Container) -> Result<()> {
///         container.singleton("router", |_| Ok(vec!["/", "/health"]))
///     }
/// }
///
/// let app = Application::new();
/// app.register(RoutingProvider).unwrap();
///
/// let routes = app
///     .run(|app| app.resolve::<Vec<&str>>("router").map(|r| r.len()))
///     .unwrap();
/// assert_eq!(routes, 2);
/// assert!(app.booted());
/// ```
pub struct Application {
    container: Container,
    providers: ProviderRegistry,
}

impl Application {
    /// Creates an application around a fresh container.
    pub fn new() -> Self {
        Self::with_container(Container::new())
    }

    /// Creates an application around a configured container.
    pub fn with_container(container: Container) -> Self {
        let providers = ProviderRegistry::new(container.clone());
        debug!("Created application");
        Self { container, providers }
    }

    /// Registers a provider.
    pub fn register<P: ServiceProvider + 'static>(&self, provider: P) -> Result<()> {
        self.providers.register(Arc::new(provider))
    }

    /// Registers a provider that is already shared.
    pub fn register_arc(&self, provider: Arc<dyn ServiceProvider>) -> Result<()> {
        self.providers.register(provider)
    }

    /// Boots every registered provider. Safe to call more than once.
    pub fn boot(&self) -> Result<()> {
        self.providers.boot()
    }

    pub fn booted(&self) -> bool {
        self.providers.booted()
    }

    /// Providers whose `register` has run, in order.
    pub fn providers(&self) -> Vec<Arc<dyn ServiceProvider>> {
        self.providers.providers()
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn provider_registry(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Boots if needed, then hands the application to `main`.
    pub fn run<R>(&self, main: impl FnOnce(&Application) -> Result<R>) -> Result<R> {
        if !self.booted() {
            self.boot()?;
        }
        info!(bindings = self.container.bindings().len(), "Application running");
        main(self)
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Application {
    type Target = Container;

    fn deref(&self) -> &Container {
        &self.container
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("container", &self.container)
            .field("providers", &self.providers)
            .finish()
    }
}
