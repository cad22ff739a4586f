//! Core container implementation for bindery.

pub mod container;
pub mod contextual;
pub mod error;
pub mod key;
pub mod provider;
pub mod provider_registry;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod snapshot;
pub mod value;

pub use container::{prelude, Container, ContainerBuilder, CONTAINER_KEY};
pub use error::{BinderyError, Result};
pub use key::{AbstractKey, Key};
pub use provider::{ProviderStatus, ServiceProvider};
pub use provider_registry::ProviderRegistry;
pub use resolver::Resolver;
pub use scope::Scope;
pub use snapshot::ContainerSnapshot;
pub use value::Value;
