//! Service providers: modules of related bindings.
//!
//! A provider binds its services in [`register`](ServiceProvider::register)
//! and wires them together in [`boot`](ServiceProvider::boot), which runs
//! only after every eager provider has registered. A deferred provider is
//! not registered at all until one of the keys it
//! [`provides`](ServiceProvider::provides) is first resolved.
//!
//! # Examples
//! ```rust
//! use bindery_container::prelude::*;
//!
//! struct MailProvider;
//!
//! impl ServiceProvider for MailProvider {
//!     fn register(&self, container: &Container) -> Result<()> {
//!         container.singleton("mailer", |r| {
//!             let host: Arc<String> = r.resolve("mail.host")?;
//!             Ok(format!("smtp://{host}"))
//!         })
//!     }
//!
//!     fn provides(&self) -> Vec<AbstractKey> {
//!         vec!["mailer".into()]
//!     }
//!
//!     fn is_deferred(&self) -> bool {
//!         true
//!     }
//! }
//!
//! let container = Container::new();
//! container.instance("mail.host", String::from("localhost")).unwrap();
//!
//! let providers = ProviderRegistry::new(container.clone());
//! providers.register(Arc::new(MailProvider)).unwrap();
//! assert!(providers.providers().is_empty());
//!
//! let mailer: Arc<String> = container.resolve("mailer").unwrap();
//! assert_eq!(mailer.as_str(), "smtp://localhost");
//! assert_eq!(providers.providers().len(), 1);
//! ```

use std::fmt;

use serde::Serialize;

use crate::container::Container;
use crate::error::Result;
use crate::key::AbstractKey;

/// A module that registers related services into a container.
///
/// Only [`register`](Self::register) is required; everything else has a
/// default suited to an eager provider with nothing to boot.
pub trait ServiceProvider: Send + Sync {
    /// Binds services. Called once, before any provider boots.
    ///
    /// Should only register: other providers' services may not exist yet.
    fn register(&self, container: &Container) -> Result<()>;

    /// Runs after every eager provider has registered.
    fn boot(&self, container: &Container) -> Result<()> {
        let _ = container;
        Ok(())
    }

    /// Keys this provider binds. Only consulted for deferred providers.
    fn provides(&self) -> Vec<AbstractKey> {
        Vec::new()
    }

    /// `true` to postpone registration until a provided key is resolved.
    fn is_deferred(&self) -> bool {
        false
    }

    /// Human-readable name for logs and error messages.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Where a provider is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProviderStatus {
    /// Waiting for one of its keys to be resolved.
    Deferred,
    /// `register` has run.
    Registered,
    /// `boot` has run.
    Booted,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderStatus::Deferred => write!(f, "Deferred"),
            ProviderStatus::Registered => write!(f, "Registered"),
            ProviderStatus::Booted => write!(f, "Booted"),
        }
    }
}
