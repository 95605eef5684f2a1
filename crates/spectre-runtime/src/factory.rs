//! Factory registry.
//!
//! Maps connector type names to constructors. Populated once at process
//! startup by the explicit "register all connectors" step; the manager only
//! reads from it afterwards.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use spectre_core::Connector;

use crate::error::{RuntimeError, RuntimeResult};

/// Constructs a connector from `(instance_name, config)`.
///
/// The config value is the instance's free-form `config` mapping, untouched
/// by the loader; the factory owns per-type validation and fails with
/// [`RuntimeError::Factory`] when the mapping is malformed for its type.
pub type ConnectorFactory =
    Arc<dyn Fn(&str, &serde_yaml::Value) -> RuntimeResult<Arc<dyn Connector>> + Send + Sync>;

/// Thread-safe registry of connector factories keyed by type name.
///
/// Registration and lookup both occur under a readers-writer lock that is
/// never held across I/O. Duplicate registration is an error, not an upsert.
pub struct FactoryRegistry {
    inner: RwLock<HashMap<String, ConnectorFactory>>,
}

impl FactoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory under `type_name`.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::InvalidArgument`] for an empty type name.
    /// - [`RuntimeError::DuplicateType`] if the name is taken; prior
    ///   registrations are unaffected.
    pub fn register(&self, type_name: &str, factory: ConnectorFactory) -> RuntimeResult<()> {
        if type_name.is_empty() {
            return Err(RuntimeError::InvalidArgument(
                "connector type name must not be empty".into(),
            ));
        }
        let mut map = write(&self.inner);
        if map.contains_key(type_name) {
            return Err(RuntimeError::DuplicateType(type_name.to_owned()));
        }
        debug!(connector_type = type_name, "registered connector factory");
        map.insert(type_name.to_owned(), factory);
        Ok(())
    }

    /// Look up the factory for `type_name`. Pure read; never fails.
    #[must_use]
    pub fn lookup(&self, type_name: &str) -> Option<ConnectorFactory> {
        read(&self.inner).get(type_name).cloned()
    }

    /// Registered type names, sorted. For diagnostics.
    #[must_use]
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = read(&self.inner).keys().cloned().collect();
        types.sort_unstable();
        types
    }

    /// Number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.inner).len()
    }

    /// Whether no factories are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        read(&self.inner).is_empty()
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("types", &self.list_types())
            .finish()
    }
}

type FactoryMap = HashMap<String, ConnectorFactory>;

fn read(lock: &RwLock<FactoryMap>) -> std::sync::RwLockReadGuard<'_, FactoryMap> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write(lock: &RwLock<FactoryMap>) -> std::sync::RwLockWriteGuard<'_, FactoryMap> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
