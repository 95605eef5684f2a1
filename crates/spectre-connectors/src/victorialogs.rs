//! VictoriaLogs connector.
//!
//! Exposes a VictoriaLogs instance through three tools backed by its LogsQL
//! HTTP API: `overview` (hits over time), `patterns` (field facets), and
//! `logs` (raw query).

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
use spectre_runtime::ConnectorFactory;

use crate::scaffold::{http_client, parse_base_url, parse_instance_config, probe_endpoint, HttpQueryTool};

/// Factory key for this connector.
pub const CONNECTOR_TYPE: &str = "victorialogs";

/// Declared connector version.
pub const CONNECTOR_VERSION: &str = "1.2.0";

/// Instance configuration for [`VictoriaLogsConnector`].
#[derive(Debug, Clone, Deserialize)]
pub struct VictoriaLogsConfig {
    /// Base URL of the VictoriaLogs instance, e.g. `http://vl:9428`.
    pub url: String,
    /// Request timeout for queries, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// A VictoriaLogs log store instance.
pub struct VictoriaLogsConnector {
    name: String,
    base_url: String,
    client: reqwest::Client,
    health: HealthCell,
}

/// Factory for the instance registry: `(name, config)` → connector.
#[must_use]
pub fn factory() -> ConnectorFactory {
    Arc::new(|name, config| {
        let config: VictoriaLogsConfig = parse_instance_config(name, config)?;
        let base_url = parse_base_url(name, &config.url)?;
        let client = http_client(
            name,
            Duration::from_secs(config.timeout_secs),
            reqwest::header::HeaderMap::new(),
        )?;
        Ok(Arc::new(VictoriaLogsConnector {
            name: name.to_owned(),
            base_url,
            client,
            health: HealthCell::new(),
        }) as Arc<dyn Connector>)
    })
}

impl VictoriaLogsConnector {
    fn health_endpoint(&self) -> String {
        format!("{}/health", self.base_url)
    }

    /// Probe the backend and fold the outcome into the health cell.
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
impl Connector for VictoriaLogsConnector {
    fn metadata(&self) -> ConnectorMetadata {
        ConnectorMetadata {
            name: self.name.clone(),
            connector_type: CONNECTOR_TYPE.into(),
            version: CONNECTOR_VERSION.into(),
            description: "VictoriaLogs log store".into(),
        }
    }

    async fn start(&self) -> ConnectorResult<()> {
        if self.health.get() == Health::Healthy {
            return Ok(());
        }
        debug!(instance = %self.name, url = %self.base_url, "starting victorialogs connector");
        self.probe().await.map_err(|e| {
            warn!(instance = %self.name, error = %e, "victorialogs backend unreachable");
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
                "overview",
                "Log volume overview: hits per time bucket for a LogsQL filter",
                "select/logsql/hits",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "LogsQL filter"},
                        "start": {"type": "string", "description": "Start of the time range"},
                        "end": {"type": "string", "description": "End of the time range"},
                        "step": {"type": "string", "description": "Bucket width, e.g. 1h"}
                    },
                    "required": ["query"]
                }),
            ),
            (
                "patterns",
                "Most frequent values per log field for a LogsQL filter",
                "select/logsql/facets",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "LogsQL filter"},
                        "start": {"type": "string", "description": "Start of the time range"},
                        "end": {"type": "string", "description": "End of the time range"},
                        "limit": {"type": "integer", "description": "Values per field"}
                    },
                    "required": ["query"]
                }),
            ),
            (
                "logs",
                "Run a LogsQL query and return matching log entries",
                "select/logsql/query",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "LogsQL query"},
                        "start": {"type": "string", "description": "Start of the time range"},
                        "end": {"type": "string", "description": "End of the time range"},
                        "limit": {"type": "integer", "description": "Maximum entries to return"}
                    },
                    "required": ["query"]
                }),
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
