//! Type-erased values produced by bindings.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use crate::error::{BinderyError, Result, TypeMismatchError};
use crate::key::AbstractKey;

/// A built value, shared by reference count.
///
/// Cloning a `Value` clones the `Arc`, so every holder of a singleton sees
/// the same allocation. The name of the concrete type is kept for error
/// messages, since `dyn Any` cannot report it.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    /// Wraps `value` in a fresh allocation.
    ///
    /// Wrapping a `Value` returns it unchanged rather than nesting it.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        let boxed: Box<dyn Any + Send + Sync> = Box::new(value);
        match boxed.downcast::<Value>() {
            Ok(value) => *value,
            Err(boxed) => Self {
                inner: Arc::from(boxed),
                type_name: type_name::<T>(),
            },
        }
    }

    /// Wraps an existing `Arc` without reallocating, preserving its identity.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: type_name::<T>(),
        }
    }

    /// Name of the concrete type held.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the value holds a `T`.
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Returns the held value as `Arc<T>`, or `None` if it holds another type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    /// Downcasts to `T`, reporting a type mismatch against `key`.
    pub fn cast<T: Any + Send + Sync>(&self, key: &AbstractKey) -> Result<Arc<T>> {
        self.downcast::<T>().ok_or_else(|| {
            BinderyError::TypeMismatch(TypeMismatchError {
                key: key.clone(),
                expected: type_name::<T>(),
                actual: self.type_name,
            })
        })
    }

    /// Borrows the held value as `&T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// `true` if both values share one allocation.
    #[inline]
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.type_name)
            .field("ptr", &Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_to_held_type() {
        let value = Value::new(String::from("hello"));
        assert_eq!(value.downcast::<String>().unwrap().as_str(), "hello");
        assert!(value.downcast::<u32>().is_none());
        assert!(value.type_name().contains("String"));
    }

    #[test]
    fn clones_share_allocation() {
        let value = Value::new(7u8);
        let copy = value.clone();
        assert!(value.ptr_eq(&copy));
        assert!(!value.ptr_eq(&Value::new(7u8)));
    }

    #[test]
    fn wrapping_a_value_does_not_nest() {
        let inner = Value::new(1u64);
        let outer = Value::new(inner.clone());
        assert!(outer.ptr_eq(&inner));
        assert!(outer.is::<u64>());
    }

    #[test]
    fn from_arc_keeps_identity() {
        let shared = Arc::new(vec![1, 2, 3]);
        let value = Value::from_arc(shared.clone());
        assert!(Arc::ptr_eq(&value.downcast::<Vec<i32>>().unwrap(), &shared));
    }
}
