//! Binding lifetimes.
//!
//! - [`Scope::Transient`]: the factory runs on every `make`
//! - [`Scope::Singleton`]: the factory runs once, the result is cached
//!   until the key is rebound, forgotten, or the container is flushed
use std::fmt;

use serde::Serialize;

/// How long a value built by a binding lives.
///
/// # Examples
/// ```
/// use bindery_container::scope::Scope;
///
/// assert!(Scope::Singleton.is_cached());
/// assert!(!Scope::Transient.is_cached());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Scope {
    /// A new value on every resolve.
    ///
    /// Equivalent to Laravel `bind()`.
    Transient,

    /// One value shared by every caller.
    ///
    /// Built on first resolve, exactly once even under concurrent first
    /// access. Equivalent to Laravel `singleton()`.
    Singleton,
}

impl Scope {
    /// Returns `true` if resolved values are cached.
    #[inline]
    pub fn is_cached(&self) -> bool {
        matches!(self, Scope::Singleton)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Transient => write!(f, "Transient"),
            Scope::Singleton => write!(f, "Singleton"),
        }
    }
}
