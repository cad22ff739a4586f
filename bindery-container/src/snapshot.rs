//! Serializable view of a container's tables, for diagnostics.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::key::AbstractKey;
use crate::scope::Scope;

/// One registered key.
#[derive(Debug, Clone, Serialize)]
pub struct BindingInfo {
    pub key: AbstractKey,
    /// `None` for instances and pending deferred keys.
    pub scope: Option<Scope>,
    /// Waiting for its provider to be activated.
    pub deferred: bool,
    /// A value is held in the instance cache.
    pub cached: bool,
    pub resolved: bool,
    pub extenders: usize,
}

/// Everything a container knows, captured at one point in time.
///
/// ```rust
/// use bindery_container::prelude::*;
///
/// let container = Container::new();
/// container.singleton("db", |_| Ok(1u8)).unwrap();
/// container.alias("db", "database").unwrap();
///
/// let snapshot = container.snapshot();
/// assert_eq!(snapshot.aliases.get("database").map(AbstractKey::as_str), Some("db"));
/// assert!(snapshot.binding("db").is_some());
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ContainerSnapshot {
    /// Sorted by key.
    pub bindings: Vec<BindingInfo>,
    /// Alias to target.
    pub aliases: BTreeMap<AbstractKey, AbstractKey>,
    pub tags: BTreeMap<String, Vec<AbstractKey>>,
    /// Number of contextual overrides.
    pub contextual: usize,
}

impl ContainerSnapshot {
    /// Looks up the entry for a key.
    pub fn binding(&self, key: &str) -> Option<&BindingInfo> {
        self.bindings.iter().find(|info| info.key == key)
    }
}
