//! Loading and writing the configuration file.

use std::io::Write as _;
use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::types::SpectreConfig;

/// Load and validate the configuration document at `path`.
///
/// The file is read in a single operation (no separate existence check, so
/// there is no stat/read race) and validated after deserialization.
///
/// # Errors
///
/// - [`ConfigError::FileNotFound`] if the file does not exist.
/// - [`ConfigError::Read`] for any other I/O failure.
/// - [`ConfigError::Parse`] for malformed YAML (including an empty file).
/// - [`ConfigError::Schema`] / [`ConfigError::Validation`] per
///   [`SpectreConfig::validate`].
pub fn load(path: &Path) -> ConfigResult<SpectreConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        },
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    let config: SpectreConfig =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;

    config.validate()?;
    debug!(path = %path.display(), instances = config.instances.len(), "loaded config");
    Ok(config)
}

/// Atomically write `config` to `path`.
///
/// The document is serialized into a temporary file in the target directory
/// and renamed over `path`, so a concurrent reader never observes a partial
/// file. The file watcher treats the rename like any other change.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] if the document fails its own
/// invariants, and [`ConfigError::Write`] for serialization or I/O failures.
pub fn write(path: &Path, config: &SpectreConfig) -> ConfigResult<()> {
    config.validate()?;

    let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir),
        None => tempfile::NamedTempFile::new(),
    }
    .map_err(|e| ConfigError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    tmp.write_all(yaml.as_bytes())
        .map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    tmp.persist(path).map_err(|e| ConfigError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    debug!(path = %path.display(), "wrote config");
    Ok(())
}
