//! Error types for container and provider operations.
//!
//! Wiring mistakes fail fast with messages that say what was asked for,
//! who asked for it, and what was probably meant.

use std::fmt;

use bindery_support::rendering::{render_chain, shorten_type_name};

use crate::key::AbstractKey;

/// Main error type for all bindery operations.
#[derive(Debug, thiserror::Error)]
pub enum BinderyError {
    /// `make` found neither a binding nor an instance for the key.
    #[error("{}", .0)]
    UnregisteredAbstract(NotRegisteredError),

    /// A key was aliased to itself, directly or through an alias chain.
    #[error("[{key}] is aliased to itself")]
    SelfAlias { key: AbstractKey },

    /// Typed retrieval found a value of a different type.
    #[error("{}", .0)]
    TypeMismatch(TypeMismatchError),

    /// A key was requested while it was already being built on the same call chain.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// A factory reported an error of its own.
    #[error("Failed to construct [{key}]: {source}")]
    ConstructionFailed {
        key: AbstractKey,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Key already bound while overriding is disabled.
    #[error("{}", .0)]
    AlreadyRegistered(AlreadyRegisteredError),

    /// A service provider's `register` failed.
    #[error("Provider {provider} failed to register: {source}")]
    ProviderRegistration {
        provider: String,
        #[source]
        source: Box<BinderyError>,
    },

    /// A service provider's `boot` failed.
    #[error("Provider {provider} failed to boot: {source}")]
    ProviderBoot {
        provider: String,
        #[source]
        source: Box<BinderyError>,
    },
}

impl BinderyError {
    /// Wraps an application error raised while building `key`.
    pub fn construction(
        key: impl Into<AbstractKey>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ConstructionFailed {
            key: key.into(),
            source: source.into(),
        }
    }

    /// `true` for [`BinderyError::UnregisteredAbstract`].
    pub fn is_unregistered(&self) -> bool {
        matches!(self, Self::UnregisteredAbstract(_))
    }
}

/// Error when a key has no binding and no instance.
#[derive(Debug)]
pub struct NotRegisteredError {
    /// The canonical key that was requested.
    pub requested: AbstractKey,
    /// The binding under construction that asked for it, if any.
    pub required_by: Option<AbstractKey>,
    /// Registered keys with similar names.
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No binding registered for [{}]", self.requested)?;

        if let Some(ref parent) = self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: register [{}] in a service provider, or check that its provider is registered",
            self.requested
        )
    }
}

/// Error when typed retrieval disagrees with the stored type.
#[derive(Debug)]
pub struct TypeMismatchError {
    pub key: AbstractKey,
    /// Type the caller asked for.
    pub expected: &'static str,
    /// Type actually produced by the binding.
    pub actual: &'static str,
}

impl fmt::Display for TypeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type mismatch for [{}]: expected {}, found {}",
            self.key,
            shorten_type_name(self.expected),
            shorten_type_name(self.actual),
        )
    }
}

/// Error when a key depends on itself.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// Keys from the first occurrence to the repeated one, e.g. `["a", "b", "a"]`.
    pub chain: Vec<AbstractKey>,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circular dependency detected:\n  {}", render_chain(&self.chain))?;
        write!(
            f,
            "\n  Hint: resolve one side lazily in a provider's boot() instead of its factory"
        )
    }
}

/// Error when a key is registered twice and overriding is disabled.
#[derive(Debug)]
pub struct AlreadyRegisteredError {
    pub key: AbstractKey,
}

impl fmt::Display for AlreadyRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] is already bound", self.key)?;
        write!(
            f,
            "\n  Hint: call forget() first, or build the container with allow_override(true)"
        )
    }
}

/// Convenient Result type for bindery operations.
pub type Result<T> = std::result::Result<T, BinderyError>;
