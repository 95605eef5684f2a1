//! Configuration error types.

/// Errors from loading, validating, writing, or watching configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: String,
    },

    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not well-formed YAML for the expected document shape.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Path that was attempted.
        path: String,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// The document declares an unsupported `schema_version`.
    #[error("unsupported schema_version {found:?} (expected {expected:?})")]
    Schema {
        /// The version string found in the document.
        found: String,
        /// The single supported version.
        expected: &'static str,
    },

    /// The document violates an invariant (duplicate or missing names).
    #[error("invalid config: {message}")]
    Validation {
        /// What was wrong.
        message: String,
    },

    /// Serializing or persisting the document failed.
    #[error("failed to write config {path}: {message}")]
    Write {
        /// Path that was attempted.
        path: String,
        /// What went wrong.
        message: String,
    },

    /// The filesystem watcher could not be initialized.
    #[error("filesystem watcher: {0}")]
    WatchInit(String),

    /// The watch loop did not drain within the stop timeout.
    #[error("config watcher did not stop within the timeout")]
    StopTimeout,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
