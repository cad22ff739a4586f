//! The resolver handed to factories, and the build context it carries.
//!
//! Each nested build pushes a [`BuildFrame`] that lives on the Rust call
//! stack and points at its parent. Unwinding (by return, `?` or panic)
//! pops it, and two threads resolving at once each walk their own chain.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::error::Result;
use crate::key::{AbstractKey, Key};
use crate::value::Value;

/// One key under construction, linked to the build that requested it.
pub(crate) struct BuildFrame<'a> {
    key: AbstractKey,
    parent: Option<&'a BuildFrame<'a>>,
}

impl<'a> BuildFrame<'a> {
    pub fn new(key: AbstractKey, parent: Option<&'a BuildFrame<'a>>) -> Self {
        Self { key, parent }
    }

    pub fn key(&self) -> &AbstractKey {
        &self.key
    }

    /// Frames from innermost to outermost.
    pub fn ancestors(&self) -> impl Iterator<Item = &AbstractKey> + '_ {
        let mut next = Some(self);
        std::iter::from_fn(move || {
            let frame = next?;
            next = frame.parent;
            Some(&frame.key)
        })
    }

    pub fn contains(&self, key: &AbstractKey) -> bool {
        self.ancestors().any(|k| k == key)
    }

    /// Keys from the outermost build to this one.
    pub fn path(&self) -> Vec<AbstractKey> {
        let mut path: Vec<AbstractKey> = self.ancestors().cloned().collect();
        path.reverse();
        path
    }
}

/// Resolves dependencies from inside a factory.
///
/// Factories receive a `Resolver` instead of the bare container so that
/// their own `make` calls happen in the right build context: contextual
/// bindings registered with [`Container::when`] apply to the consumer
/// currently being built.
///
/// ```rust
/// use bindery_container::prelude::*;
///
/// let container = Container::new();
/// container.instance("dsn", String::from("postgres://localhost")).unwrap();
/// container.singleton("db", |r| {
///     let dsn: Arc<String> = r.resolve("dsn")?;
///     Ok(format!("connected to {dsn}"))
/// }).unwrap();
///
/// let db: Arc<String> = container.resolve("db").unwrap();
/// assert_eq!(db.as_str(), "connected to postgres://localhost");
/// ```
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    container: &'a Container,
    frame: Option<&'a BuildFrame<'a>>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(container: &'a Container, frame: Option<&'a BuildFrame<'a>>) -> Self {
        Self { container, frame }
    }

    /// The container being resolved from.
    pub fn container(&self) -> &'a Container {
        self.container
    }

    /// The key whose factory is running, if any.
    pub fn consumer(&self) -> Option<&AbstractKey> {
        self.frame.map(BuildFrame::key)
    }

    /// Keys currently under construction, outermost first.
    pub fn build_path(&self) -> Vec<AbstractKey> {
        self.frame.map(BuildFrame::path).unwrap_or_default()
    }

    /// Resolves a key in this build context.
    pub fn make(&self, key: impl Into<AbstractKey>) -> Result<Value> {
        self.container.make_within(key.into(), self.frame)
    }

    /// Resolves a key and downcasts it to `T`.
    ///
    /// # Errors
    /// [`BinderyError::TypeMismatch`](crate::error::BinderyError::TypeMismatch)
    /// if the binding produced another type.
    pub fn resolve<T: Any + Send + Sync>(&self, key: impl Into<AbstractKey>) -> Result<Arc<T>> {
        let key = key.into();
        let value = self.make(key.clone())?;
        value.cast::<T>(&key)
    }

    /// Resolves a key and clones the `T` out of it.
    pub fn resolve_cloned<T: Any + Send + Sync + Clone>(&self, key: impl Into<AbstractKey>) -> Result<T> {
        self.resolve::<T>(key).map(|value| T::clone(&value))
    }

    /// Resolves a typed token.
    pub fn get<T: Any + Send + Sync>(&self, key: &Key<T>) -> Result<Arc<T>> {
        self.resolve::<T>(key.abstract_key())
    }

    /// Resolves every key under `tag`, in tag order.
    pub fn tagged(&self, tag: &str) -> Result<Vec<Value>> {
        self.container
            .tagged_keys(tag)
            .into_iter()
            .map(|key| self.make(key))
            .collect()
    }

    /// Resolves every key under `tag` as `T`.
    pub fn tagged_as<T: Any + Send + Sync>(&self, tag: &str) -> Result<Vec<Arc<T>>> {
        self.container
            .tagged_keys(tag)
            .into_iter()
            .map(|key| self.resolve::<T>(key))
            .collect()
    }
}

impl fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("build_path", &self.build_path())
            .finish()
    }
}
