//! Compiled-in observability connectors.
//!
//! Each module implements one backend behind the `Connector` capability set:
//!
//! - [`victorialogs`]: VictoriaLogs log store (`overview`, `patterns`,
//!   `logs` tools)
//! - [`logzio`]: Logz.io log management (`search`, `accounts` tools), with
//!   a hot-reloadable API token from a Kubernetes Secret
//! - [`grafana`]: Grafana dashboards and datasources (`dashboards`,
//!   `datasources` tools)
//!
//! Connectors are compiled in, not loaded from external artifacts. The
//! outer process makes them available by calling
//! [`register_builtin_factories`] before constructing the manager.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod grafana;
pub mod logzio;
mod scaffold;
pub mod victorialogs;

use std::sync::Arc;

use spectre_runtime::{FactoryRegistry, RuntimeResult};
use spectre_secrets::SecretInformer;

/// Register every built-in connector factory.
///
/// The `informer` feeds the secret watchers of credentialed connectors
/// (currently Logz.io); it is captured by their factories.
///
/// # Errors
///
/// Returns the registry error if any type name is already taken.
pub fn register_builtin_factories(
    registry: &FactoryRegistry,
    informer: Arc<dyn SecretInformer>,
) -> RuntimeResult<()> {
    registry.register(victorialogs::CONNECTOR_TYPE, victorialogs::factory())?;
    registry.register(logzio::CONNECTOR_TYPE, logzio::factory(informer))?;
    registry.register(grafana::CONNECTOR_TYPE, grafana::factory())?;
    Ok(())
}
