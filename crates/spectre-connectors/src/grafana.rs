//! Grafana connector.
//!
//! Exposes a Grafana installation through `dashboards` (search) and
//! `datasources` (inventory) tools. An optional API key is attached to every
//! request; anonymous read-only installations work without one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use spectre_core::{
    Connector, ConnectorError, ConnectorMetadata, ConnectorResult, Health, HealthCell,
    HealthGatedTool, ToolRegistry, ToolSpec,
};
use spectre_runtime::{ConnectorFactory, RuntimeError};

use crate::scaffold::{http_client, parse_base_url, parse_instance_config, probe_endpoint, HttpQueryTool};

/// Factory key for this connector.
pub const CONNECTOR_TYPE: &str = "grafana";

/// Declared connector version.
pub const CONNECTOR_VERSION: &str = "1.1.0";

/// Instance configuration for [`GrafanaConnector`].
#[derive(Debug, Clone, Deserialize)]
pub struct GrafanaConfig {
    /// Base URL of the Grafana installation.
    pub url: String,
    /// Optional service-account token, sent as a bearer credential.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout for queries, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// A Grafana installation instance.
pub struct GrafanaConnector {
    name: String,
    base_url: String,
    client: reqwest::Client,
    health: HealthCell,
}

/// Factory for the instance registry: `(name, config)` → connector.
#[must_use]
pub fn factory() -> ConnectorFactory {
    Arc::new(|name, config| {
        let config: GrafanaConfig = parse_instance_config(name, config)?;
        let base_url = parse_base_url(name, &config.url)?;

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let mut value = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| RuntimeError::Factory {
                    instance: name.to_owned(),
                    message: format!("api_key is not a valid header value: {e}"),
                })?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let client = http_client(name, Duration::from_secs(config.timeout_secs), headers)?;
        Ok(Arc::new(GrafanaConnector {
            name: name.to_owned(),
            base_url,
            client,
            health: HealthCell::new(),
        }) as Arc<dyn Connector>)
    })
}

impl GrafanaConnector {
    fn health_endpoint(&self) -> String {
        format!("{}/api/health", self.base_url)
    }

    async fn probe(&self) -> Result<(), String> {
        match probe_endpoint(&self.client, &self.health_endpoint()).await {
            Ok(()) => {
                self.health.set(Health::Healthy);
                Ok(())
            },
            Err(e) => {
                self.health.set(Health::Degraded);
                Err(e)
            },
        }
    }
}

#[async_trait]
impl Connector for GrafanaConnector {
    fn metadata(&self) -> ConnectorMetadata {
        ConnectorMetadata {
            name: self.name.clone(),
            connector_type: CONNECTOR_TYPE.into(),
            version: CONNECTOR_VERSION.into(),
            description: "Grafana dashboards and datasources".into(),
        }
    }

    async fn start(&self) -> ConnectorResult<()> {
        if self.health.get() == Health::Healthy {
            return Ok(());
        }
        debug!(instance = %self.name, url = %self.base_url, "starting grafana connector");
        self.probe().await.map_err(|e| {
            warn!(instance = %self.name, error = %e, "grafana backend unreachable");
            ConnectorError::Connection(e)
        })
    }

    async fn stop(&self) -> ConnectorResult<()> {
        self.health.set(Health::Stopped);
        Ok(())
    }

    async fn health(&self) -> Health {
        if self.health.get() == Health::Stopped {
            return Health::Stopped;
        }
        let _ = self.probe().await;
        self.health.get()
    }

    fn register_tools(&self, registry: &mut dyn ToolRegistry) -> ConnectorResult<()> {
        let tools = [
            (
                "dashboards",
                "Search dashboards by title or tag",
                "api/search?type=dash-db",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Title substring to match"},
                        "tag": {"type": "string", "description": "Dashboard tag to filter by"},
                        "limit": {"type": "integer", "description": "Maximum dashboards to return"}
                    }
                }),
            ),
            (
                "datasources",
                "List the configured datasources",
                "api/datasources",
                json!({"type": "object", "properties": {}}),
            ),
        ];

        for (name, description, path, schema) in tools {
            let handler = HttpQueryTool::new(
                self.client.clone(),
                format!("{}/{path}", self.base_url),
            );
            registry
                .register(ToolSpec::new(
                    name,
                    description,
                    schema,
                    HealthGatedTool::wrap(self.name.clone(), self.health.clone(), Arc::new(handler)),
                ))
                .map_err(|e| ConnectorError::ToolRegistration(e.to_string()))?;
        }
        Ok(())
    }
}
