//! Configuration document types.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// The single supported configuration schema version.
///
/// Any other value (including future versions) is rejected at load time;
/// there is no auto-upgrade path.
pub const SCHEMA_VERSION: &str = "v1";

/// One connector instance declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Unique instance name within the document. Also a naming component of
    /// the instance's tools (`{type}_{name}_{tool}`).
    #[serde(default)]
    pub name: String,
    /// Connector type name; must match a registered factory.
    #[serde(rename = "type", default)]
    pub connector_type: String,
    /// Whether the manager should run this instance.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free-form per-type configuration. Opaque to the loader; the owning
    /// factory validates it.
    #[serde(default)]
    pub config: serde_yaml::Value,
}

fn default_enabled() -> bool {
    true
}

/// The whole configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectreConfig {
    /// Schema version tag; must equal [`SCHEMA_VERSION`].
    #[serde(default)]
    pub schema_version: String,
    /// Declared connector instances, in document order.
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

impl SpectreConfig {
    /// Validate document-level invariants.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Validation`] for an empty `schema_version`, an
    ///   empty instance `name` or `type`, or duplicate instance names.
    /// - [`ConfigError::Schema`] for any `schema_version` other than
    ///   [`SCHEMA_VERSION`].
    pub fn validate(&self) -> ConfigResult<()> {
        if self.schema_version.is_empty() {
            return Err(ConfigError::Validation {
                message: "schema_version must not be empty".into(),
            });
        }
        if self.schema_version != SCHEMA_VERSION {
            return Err(ConfigError::Schema {
                found: self.schema_version.clone(),
                expected: SCHEMA_VERSION,
            });
        }

        let mut seen = HashSet::new();
        for instance in &self.instances {
            if instance.name.is_empty() {
                return Err(ConfigError::Validation {
                    message: "instance name must not be empty".into(),
                });
            }
            if instance.connector_type.is_empty() {
                return Err(ConfigError::Validation {
                    message: format!("instance {:?} has an empty type", instance.name),
                });
            }
            if !seen.insert(instance.name.as_str()) {
                return Err(ConfigError::Validation {
                    message: format!("duplicate instance name: {:?}", instance.name),
                });
            }
        }
        Ok(())
    }

    /// The enabled instances, in document order.
    pub fn enabled_instances(&self) -> impl Iterator<Item = &InstanceConfig> {
        self.instances.iter().filter(|i| i.enabled)
    }
}
