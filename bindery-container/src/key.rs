//! Binding identification keys.
//!
//! [`AbstractKey`] names a service inside the container. Keys are plain
//! strings (`"config"`, `"router"`, `"view"`) so that independent
//! components can agree on them without sharing types.
//!
//! [`Key<T>`] is a typed token: the same string, plus the Rust type the
//! binding produces, so retrieval through it is checked at compile time.

use std::any::type_name;
use std::borrow::{Borrow, Cow};
use std::fmt;
use std::marker::PhantomData;

use serde::{Serialize, Serializer};

/// Uniquely identifies a binding in the container.
///
/// # Examples
/// ```
/// use bindery_container::key::AbstractKey;
///
/// const ROUTER: AbstractKey = AbstractKey::from_static("router");
/// assert_eq!(ROUTER.as_str(), "router");
///
/// let dynamic = AbstractKey::from(format!("cache.{}", "redis"));
/// assert_eq!(dynamic, "cache.redis");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbstractKey(Cow<'static, str>);

impl AbstractKey {
    /// Creates a key from a static string, usable in `const` items.
    #[inline]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a key named after the fully qualified Rust type `T`.
    ///
    /// ```
    /// use bindery_container::key::AbstractKey;
    ///
    /// struct Mailer;
    /// assert!(AbstractKey::of::<Mailer>().as_str().ends_with("::Mailer"));
    /// ```
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Cow::Borrowed(type_name::<T>()))
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for AbstractKey {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for AbstractKey {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl From<&AbstractKey> for AbstractKey {
    fn from(key: &AbstractKey) -> Self {
        key.clone()
    }
}

impl<T: ?Sized> From<&Key<T>> for AbstractKey {
    fn from(key: &Key<T>) -> Self {
        key.abstract_key().clone()
    }
}

impl Borrow<str> for AbstractKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AbstractKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for AbstractKey {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for AbstractKey {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Debug for AbstractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AbstractKey({:?})", self.as_str())
    }
}

impl fmt::Display for AbstractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AbstractKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A typed token for a binding that produces values of type `T`.
///
/// # Examples
/// ```
/// use bindery_container::prelude::*;
///
/// struct Router { routes: usize }
/// const ROUTER: Key<Router> = Key::new("router");
///
/// let container = Container::new();
/// container.singleton(&ROUTER, |_| Ok(Router { routes: 3 })).unwrap();
///
/// let router = container.get(&ROUTER).unwrap();
/// assert_eq!(router.routes, 3);
/// ```
pub struct Key<T: ?Sized> {
    key: AbstractKey,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized> Key<T> {
    /// Creates a typed token from a static name.
    #[inline]
    pub const fn new(name: &'static str) -> Self {
        Self {
            key: AbstractKey::from_static(name),
            _marker: PhantomData,
        }
    }

    /// Creates a typed token from any key.
    #[inline]
    pub fn from_key(key: impl Into<AbstractKey>) -> Self {
        Self {
            key: key.into(),
            _marker: PhantomData,
        }
    }

    /// Returns the untyped key.
    #[inline]
    pub fn abstract_key(&self) -> &AbstractKey {
        &self.key
    }
}

impl<T: ?Sized + 'static> Key<T> {
    /// A token named after `T` itself.
    #[inline]
    pub fn of_type() -> Self {
        Self::from_key(AbstractKey::of::<T>())
    }
}

impl<T: ?Sized> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key<{}>({:?})", type_name::<T>(), self.key.as_str())
    }
}

impl<T: ?Sized> fmt::Display for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key, f)
    }
}
