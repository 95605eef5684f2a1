//! Connector contract and health model.
//!
//! A connector is a compiled-in integration with one observability backend
//! (a log store, a metrics source, a dashboard provider). The lifecycle
//! manager holds connectors behind the [`Connector`] capability set and never
//! learns their concrete types.

use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tool::ToolRegistry;

// Health
// ---------------------------------------------------------------------------

/// Observed health of a connector instance.
///
/// Transitions: instances begin `Stopped`, move to `Healthy` after a
/// successful start, may oscillate between `Healthy` and `Degraded` while the
/// backend (or a credential) comes and goes, and return to `Stopped` on an
/// explicit stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// The backend is reachable and requests can be served.
    Healthy,
    /// The instance exists and its tools are registered, but the backend
    /// cannot currently serve requests (unreachable, credential missing).
    Degraded,
    /// The instance has not been started, or has been stopped.
    Stopped,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// HealthCell
// ---------------------------------------------------------------------------

/// Shared, lock-guarded health state.
///
/// Connectors keep one cell and hand clones to their tool handlers (via
/// [`HealthGatedTool`](crate::tool::HealthGatedTool)) and background tasks.
/// Reads and writes take the lock only long enough to copy the value, so the
/// cell is safe to consult on request paths.
#[derive(Clone)]
pub struct HealthCell {
    inner: Arc<RwLock<Health>>,
}

impl HealthCell {
    /// Create a cell in the initial `Stopped` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Health::Stopped)),
        }
    }

    /// Current health. Never blocks on I/O; a poisoned lock yields the
    /// last-written value.
    #[must_use]
    pub fn get(&self) -> Health {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Overwrite the health state.
    pub fn set(&self, health: Health) {
        match self.inner.write() {
            Ok(mut guard) => *guard = health,
            Err(poisoned) => *poisoned.into_inner() = health,
        }
    }

    /// Whether the cell currently reads `Healthy`.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.get() == Health::Healthy
    }
}

impl Default for HealthCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HealthCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HealthCell").field(&self.get()).finish()
    }
}

// ConnectorMetadata
// ---------------------------------------------------------------------------

/// Immutable description of a connector instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorMetadata {
    /// Instance name, unique within the running manager.
    pub name: String,
    /// Connector type name (the factory key, e.g. `victorialogs`).
    #[serde(rename = "type")]
    pub connector_type: String,
    /// Declared connector version as a semver string. Validated against the
    /// manager's optional minimum-version constraint.
    pub version: String,
    /// Human-readable description.
    pub description: String,
}

// ConnectorError
// ---------------------------------------------------------------------------

/// Errors returned by connector lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The instance configuration was malformed for this connector type.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The backend could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A required credential is missing or could not be obtained.
    #[error("credential unavailable: {0}")]
    Credential(String),

    /// Declaring a tool on the registry failed.
    #[error("tool registration failed: {0}")]
    ToolRegistration(String),

    /// Catch-all for internal errors.
    #[error("internal connector error: {0}")]
    Internal(String),
}

/// Convenience alias for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

// Connector
// ---------------------------------------------------------------------------

/// The capability set every backend connector satisfies.
///
/// Lifecycle calls carry no explicit deadline; the caller bounds each call
/// with `tokio::time::timeout` (the lifecycle manager owns those budgets).
///
/// # Idempotency
///
/// `start` on a `Healthy` instance is a no-op; on a `Degraded` instance it is
/// a recovery attempt. `stop` on a `Stopped` instance is a no-op. The
/// periodic health loop relies on these laws to reuse `start` as its
/// recovery primitive.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Instance metadata. Pure and cheap; always safe to call.
    fn metadata(&self) -> ConnectorMetadata;

    /// Bring the instance up (or recover a degraded one).
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unreachable or a credential is
    /// missing. The instance must still be usable afterwards: it reports
    /// `Degraded` and its tools answer with a service-unavailable error.
    async fn start(&self) -> ConnectorResult<()>;

    /// Tear the instance down, releasing clients and background tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown fails; the manager logs and proceeds.
    async fn stop(&self) -> ConnectorResult<()>;

    /// Probe current health. Implementations keep this bounded (~2 s); the
    /// manager additionally enforces the bound with a timeout.
    async fn health(&self) -> Health;

    /// Declare this instance's tools on the given registry.
    ///
    /// Called after `start` completes, whether that start left the instance
    /// `Healthy` or `Degraded`, so the tool surface stays stable while the
    /// backend is down.
    ///
    /// # Errors
    ///
    /// Returns an error if a declaration is rejected; the manager logs and
    /// continues.
    fn register_tools(&self, registry: &mut dyn ToolRegistry) -> ConnectorResult<()>;
}

impl fmt::Debug for dyn Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = self.metadata();
        f.debug_struct("Connector")
            .field("name", &meta.name)
            .field("type", &meta.connector_type)
            .field("version", &meta.version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_cell_starts_stopped() {
        let cell = HealthCell::new();
        assert_eq!(cell.get(), Health::Stopped);
        assert!(!cell.is_healthy());
    }

    #[test]
    fn health_cell_transitions() {
        let cell = HealthCell::new();
        cell.set(Health::Healthy);
        assert!(cell.is_healthy());
        cell.set(Health::Degraded);
        assert_eq!(cell.get(), Health::Degraded);
        cell.set(Health::Stopped);
        assert_eq!(cell.get(), Health::Stopped);
    }

    #[test]
    fn health_cell_clones_share_state() {
        let cell = HealthCell::new();
        let clone = cell.clone();
        cell.set(Health::Healthy);
        assert_eq!(clone.get(), Health::Healthy);
    }

    #[test]
    fn health_display() {
        assert_eq!(Health::Healthy.to_string(), "healthy");
        assert_eq!(Health::Degraded.to_string(), "degraded");
        assert_eq!(Health::Stopped.to_string(), "stopped");
    }

    #[test]
    fn health_serde_round_trip() {
        let json = serde_json::to_string(&Health::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
        let back: Health = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Health::Degraded);
    }

    #[test]
    fn metadata_serializes_type_field() {
        let meta = ConnectorMetadata {
            name: "vl-prod".into(),
            connector_type: "victorialogs".into(),
            version: "1.2.0".into(),
            description: "VictoriaLogs log store".into(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "victorialogs");
        assert_eq!(json["name"], "vl-prod");
    }
}
