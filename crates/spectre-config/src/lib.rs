//! Spectre configuration: typed YAML document, loader/writer, and a
//! debounced file watcher for hot-reload.
//!
//! The configuration file declares the set of connector instances the
//! integration runtime should run. The loader enforces the schema version
//! and document-level invariants; per-type validation of each instance's
//! free-form `config` mapping is the owning factory's responsibility.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod loader;
pub mod types;
pub mod watcher;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, write};
pub use types::{InstanceConfig, SpectreConfig, SCHEMA_VERSION};
pub use watcher::{ConfigWatcher, ReloadHandler, DEFAULT_DEBOUNCE, DEFAULT_STOP_TIMEOUT};
