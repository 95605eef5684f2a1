//! Instance registry.
//!
//! Owns the set of live connector instances, keyed by unique instance name.
//! The connector object holds its own health state internally; the registry
//! stores only the handle.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use spectre_core::Connector;

use crate::error::{RuntimeError, RuntimeResult};

/// Thread-safe mapping of instance name to live connector.
///
/// `list` and `snapshot` return copies; observers must tolerate the snapshot
/// going stale immediately after return. The internal lock is never held
/// across I/O.
pub struct InstanceRegistry {
    inner: RwLock<HashMap<String, Arc<dyn Connector>>>,
}

impl InstanceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connector under `name`.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::InvalidArgument`] for an empty name.
    /// - [`RuntimeError::DuplicateInstance`] if the name is taken; existing
    ///   state is unchanged.
    pub fn register(&self, name: &str, connector: Arc<dyn Connector>) -> RuntimeResult<()> {
        if name.is_empty() {
            return Err(RuntimeError::InvalidArgument(
                "instance name must not be empty".into(),
            ));
        }
        let mut map = write(&self.inner);
        if map.contains_key(name) {
            return Err(RuntimeError::DuplicateInstance(name.to_owned()));
        }
        debug!(instance = name, "registered instance");
        map.insert(name.to_owned(), connector);
        Ok(())
    }

    /// Look up an instance by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        read(&self.inner).get(name).cloned()
    }

    /// Remove an instance, returning whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let existed = write(&self.inner).remove(name).is_some();
        if existed {
            debug!(instance = name, "removed instance");
        }
        existed
    }

    /// Registered instance names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.inner).keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// A point-in-time copy of all `(name, connector)` pairs, sorted by
    /// name. The health loop probes against such a snapshot so it never
    /// holds the registry lock across connector I/O.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn Connector>)> {
        let mut entries: Vec<(String, Arc<dyn Connector>)> = read(&self.inner)
            .iter()
            .map(|(name, connector)| (name.clone(), Arc::clone(connector)))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Remove every instance, returning the drained pairs for teardown.
    pub fn clear(&self) -> Vec<(String, Arc<dyn Connector>)> {
        write(&self.inner).drain().collect()
    }

    /// Number of registered instances.
    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        read(&self.inner).is_empty()
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("instance_count", &self.len())
            .field("instances", &self.list())
            .finish()
    }
}

type InstanceMap = HashMap<String, Arc<dyn Connector>>;

fn read(lock: &RwLock<InstanceMap>) -> std::sync::RwLockReadGuard<'_, InstanceMap> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write(lock: &RwLock<InstanceMap>) -> std::sync::RwLockWriteGuard<'_, InstanceMap> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
