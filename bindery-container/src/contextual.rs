//! Contextual bindings: `when(consumer).needs(dependency).give(..)`.
//!
//! An override only applies while `consumer`'s own factory is running.
//! Nested builds deeper down see the regular binding again.
//!
//! ```rust
//! use bindery_container::prelude::*;
//!
//! let container = Container::new();
//! container.bind("disk", |_| Ok(String::from("local"))).unwrap();
//! container.when("photos").needs("disk").give_value(String::from("s3"));
//! container.bind("photos", |r| r.resolve_cloned::<String>("disk")).unwrap();
//!
//! assert_eq!(container.resolve::<String>("photos").unwrap().as_str(), "s3");
//! assert_eq!(container.resolve::<String>("disk").unwrap().as_str(), "local");
//! ```

use std::any::Any;
use std::sync::Arc;

use crate::container::Container;
use crate::error::Result;
use crate::key::AbstractKey;
use crate::registry::FactoryFn;
use crate::resolver::Resolver;
use crate::value::Value;

/// First step: the consumer is known.
#[must_use = "a contextual binding does nothing until `.needs(..).give(..)` is called"]
pub struct ContextualBuilder<'c> {
    container: &'c Container,
    consumer: AbstractKey,
}

impl<'c> ContextualBuilder<'c> {
    pub(crate) fn new(container: &'c Container, consumer: AbstractKey) -> Self {
        Self { container, consumer }
    }

    /// Names the dependency being overridden.
    pub fn needs(self, needed: impl Into<AbstractKey>) -> ContextualBinding<'c> {
        ContextualBinding {
            container: self.container,
            consumer: self.consumer,
            needed: needed.into(),
        }
    }
}

/// Second step: consumer and dependency are known.
#[must_use = "a contextual binding does nothing until `.give(..)` is called"]
pub struct ContextualBinding<'c> {
    container: &'c Container,
    consumer: AbstractKey,
    needed: AbstractKey,
}

impl ContextualBinding<'_> {
    /// Builds the dependency with `factory` for this consumer.
    ///
    /// The factory runs on every resolve; its results are never cached.
    pub fn give<T, F>(self, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Resolver<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.give_factory(Arc::new(move |resolver: &Resolver<'_>| factory(resolver).map(Value::new)));
    }

    /// Hands this consumer the same pre-built value every time.
    pub fn give_value<T: Any + Send + Sync>(self, value: T) {
        let value = Value::new(value);
        self.give_factory(Arc::new(move |_: &Resolver<'_>| Ok(value.clone())));
    }

    /// Installs an already type-erased factory.
    pub fn give_factory(self, factory: FactoryFn) {
        self.container.add_contextual(self.consumer, self.needed, factory);
    }
}
