//! The Spectre integration runtime.
//!
//! Composes the factory registry, the instance registry, the configuration
//! loader and watcher, and the tool-registration bridge into a single
//! supervised unit: the [`IntegrationManager`]. The manager starts
//! connectors, gates them on a minimum version, registers their tools on the
//! outer protocol server, recovers degraded instances from a periodic health
//! loop, and performs full-restart reloads when the configuration file
//! changes.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod bridge;
pub mod error;
pub mod factory;
pub mod instances;
pub mod manager;

pub use bridge::{qualified_tool_name, InMemoryToolServer, ToolBridge, ToolServer};
pub use error::{RuntimeError, RuntimeResult};
pub use factory::{ConnectorFactory, FactoryRegistry};
pub use instances::InstanceRegistry;
pub use manager::{
    IntegrationManager, InstanceStatus, ManagerOptions, DEFAULT_HEALTH_INTERVAL,
    DEFAULT_SHUTDOWN_TIMEOUT, HEALTH_PROBE_TIMEOUT,
};
