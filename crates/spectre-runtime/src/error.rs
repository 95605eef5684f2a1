//! Runtime error types.

use spectre_config::ConfigError;

/// Errors from registries and the lifecycle manager.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A registration or lookup argument was malformed (e.g. empty name).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A factory for this connector type is already registered.
    #[error("connector type already registered: {0}")]
    DuplicateType(String),

    /// An instance with this name is already registered.
    #[error("instance already registered: {0}")]
    DuplicateInstance(String),

    /// No factory is registered for this connector type.
    #[error("unknown connector type: {0}")]
    UnknownType(String),

    /// A factory rejected its instance configuration.
    #[error("factory failed for instance {instance}: {message}")]
    Factory {
        /// The instance being constructed.
        instance: String,
        /// Why construction failed.
        message: String,
    },

    /// A connector reported a version that is not valid semver. Treated
    /// exactly like a version mismatch: fatal to the start pass.
    #[error("instance {instance} reported unparseable version {version:?}")]
    InvalidVersion {
        /// The offending instance.
        instance: String,
        /// The unparseable version string.
        version: String,
    },

    /// A connector's version is below the configured minimum.
    #[error("instance {instance} version {version} is below the minimum {minimum}")]
    VersionMismatch {
        /// The offending instance.
        instance: String,
        /// The connector's declared version.
        version: String,
        /// The configured floor.
        minimum: String,
    },

    /// The manager was constructed with an unparseable minimum version.
    #[error("invalid minimum version {value:?}: {source}")]
    InvalidMinVersion {
        /// The raw flag value.
        value: String,
        /// The semver parse failure.
        #[source]
        source: semver::Error,
    },

    /// The manager was constructed with an empty configuration path.
    #[error("config path must not be empty")]
    EmptyConfigPath,

    /// `start` was called on a manager that is already running.
    #[error("manager already started")]
    AlreadyStarted,

    /// A configuration-layer failure (fatal at initial load).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The file watcher failed to start; startup was rolled back.
    #[error("config watcher failed to start: {0}")]
    WatcherStart(#[source] ConfigError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
