//! Logz.io connector.
//!
//! Exposes a Logz.io account through `search` and `accounts` tools. The API
//! token comes either inline from the instance config or from a watched
//! Kubernetes Secret; in the latter case rotation reaches the next request
//! without restarting the instance.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use spectre_core::{
    Connector, ConnectorError, ConnectorMetadata, ConnectorResult, Health, HealthCell,
    HealthGatedTool, ToolError, ToolHandler, ToolRegistry, ToolResult, ToolSpec,
};
use spectre_runtime::ConnectorFactory;
use spectre_secrets::{SecretInformer, SecretRef, SecretWatcher};

use crate::scaffold::{http_client, parse_base_url, parse_instance_config, query_params, read_json_response};

/// Factory key for this connector.
pub const CONNECTOR_TYPE: &str = "logzio";

/// Declared connector version.
pub const CONNECTOR_VERSION: &str = "1.0.0";

/// Header carrying the Logz.io API token.
const TOKEN_HEADER: &str = "X-API-TOKEN";

/// Instance configuration for [`LogzioConnector`].
#[derive(Debug, Clone, Deserialize)]
pub struct LogzioConfig {
    /// API base URL; regional accounts override the default.
    #[serde(default = "default_api_url")]
    pub url: String,
    /// Inline API token. Mutually preferred-against by `token_secret`.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Kubernetes Secret holding the API token. Takes precedence over
    /// `api_token` when both are set, so operators can migrate to rotation
    /// without removing the inline value first.
    #[serde(default)]
    pub token_secret: Option<SecretRef>,
    /// Request timeout for queries, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.logz.io".to_owned()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Where the connector obtains its API token.
#[derive(Clone)]
enum TokenSource {
    Inline(String),
    Watched(Arc<SecretWatcher>),
}

impl TokenSource {
    fn current(&self) -> Option<String> {
        match self {
            Self::Inline(token) => Some(token.clone()),
            Self::Watched(watcher) => watcher.get_token(),
        }
    }
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline(_) => f.write_str("TokenSource::Inline(***)"),
            Self::Watched(watcher) => f.debug_tuple("TokenSource::Watched").field(watcher).finish(),
        }
    }
}

/// A Logz.io account instance.
pub struct LogzioConnector {
    name: String,
    base_url: String,
    client: reqwest::Client,
    health: HealthCell,
    token: TokenSource,
}

/// Factory for the instance registry. Captures the host-supplied Secret
/// informer for instances that reference a `token_secret`.
#[must_use]
pub fn factory(informer: Arc<dyn SecretInformer>) -> ConnectorFactory {
    Arc::new(move |name, config| {
        let config: LogzioConfig = parse_instance_config(name, config)?;
        let base_url = parse_base_url(name, &config.url)?;

        let token = match (&config.token_secret, &config.api_token) {
            (Some(reference), _) => TokenSource::Watched(Arc::new(SecretWatcher::new(
                reference.clone(),
                Arc::clone(&informer),
            ))),
            (None, Some(token)) => TokenSource::Inline(token.clone()),
            (None, None) => {
                return Err(spectre_runtime::RuntimeError::Factory {
                    instance: name.to_owned(),
                    message: "either api_token or token_secret must be set".into(),
                });
            },
        };

        let client = http_client(
            name,
            Duration::from_secs(config.timeout_secs),
            reqwest::header::HeaderMap::new(),
        )?;
        Ok(Arc::new(LogzioConnector {
            name: name.to_owned(),
            base_url,
            client,
            health: HealthCell::new(),
            token,
        }) as Arc<dyn Connector>)
    })
}

impl LogzioConnector {
    /// Health derives from credential availability: the connector is fit to
    /// serve exactly when it can authenticate.
    fn evaluate_health(&self) -> Health {
        if self.token.current().is_some() {
            Health::Healthy
        } else {
            Health::Degraded
        }
    }
}

#[async_trait]
impl Connector for LogzioConnector {
    fn metadata(&self) -> ConnectorMetadata {
        ConnectorMetadata {
            name: self.name.clone(),
            connector_type: CONNECTOR_TYPE.into(),
            version: CONNECTOR_VERSION.into(),
            description: "Logz.io log management".into(),
        }
    }

    async fn start(&self) -> ConnectorResult<()> {
        if self.health.get() == Health::Healthy {
            return Ok(());
        }
        debug!(instance = %self.name, "starting logzio connector");

        if let TokenSource::Watched(watcher) = &self.token {
            watcher.start().await.map_err(|e| {
                self.health.set(Health::Degraded);
                ConnectorError::Credential(e.to_string())
            })?;
        }

        let health = self.evaluate_health();
        self.health.set(health);
        if health == Health::Degraded {
            warn!(instance = %self.name, "api token unavailable, starting degraded");
            return Err(ConnectorError::Credential(
                "api token not yet available".into(),
            ));
        }
        Ok(())
    }

    async fn stop(&self) -> ConnectorResult<()> {
        if let TokenSource::Watched(watcher) = &self.token {
            if let Err(e) = watcher.stop().await {
                warn!(instance = %self.name, error = %e, "secret watcher stop failed");
            }
        }
        self.health.set(Health::Stopped);
        Ok(())
    }

    async fn health(&self) -> Health {
        if self.health.get() == Health::Stopped {
            return Health::Stopped;
        }
        let health = self.evaluate_health();
        self.health.set(health);
        health
    }

    fn register_tools(&self, registry: &mut dyn ToolRegistry) -> ConnectorResult<()> {
        let tools = [
            (
                "search",
                "Search log documents with the Logz.io query DSL",
                Endpoint::Post("v1/search"),
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "object", "description": "Elasticsearch-style query body"},
                        "size": {"type": "integer", "description": "Maximum hits to return"},
                        "from": {"type": "integer", "description": "Offset into the result set"}
                    }
                }),
            ),
            (
                "accounts",
                "List the time-based accounts visible to this token",
                Endpoint::Get("v1/account-management/time-based-accounts"),
                json!({"type": "object", "properties": {}}),
            ),
        ];

        for (name, description, endpoint, schema) in tools {
            let handler = LogzioTool {
                client: self.client.clone(),
                base_url: self.base_url.clone(),
                endpoint,
                token: self.token.clone(),
                instance: self.name.clone(),
            };
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

/// HTTP shape of one Logz.io tool.
#[derive(Clone, Copy)]
enum Endpoint {
    /// GET with the arguments as query parameters.
    Get(&'static str),
    /// POST with the arguments as the JSON body.
    Post(&'static str),
}

/// Authenticated request handler. Reads the token per call so a rotated
/// credential is picked up by the very next request.
struct LogzioTool {
    client: reqwest::Client,
    base_url: String,
    endpoint: Endpoint,
    token: TokenSource,
    instance: String,
}

#[async_trait]
impl ToolHandler for LogzioTool {
    async fn call(&self, args: Value) -> ToolResult<Value> {
        let Some(token) = self.token.current() else {
            return Err(ToolError::ServiceUnavailable {
                instance: self.instance.clone(),
            });
        };

        let request = match self.endpoint {
            Endpoint::Get(path) => self
                .client
                .get(format!("{}/{path}", self.base_url))
                .query(&query_params(&args)?),
            Endpoint::Post(path) => self
                .client
                .post(format!("{}/{path}", self.base_url))
                .json(&args),
        };

        let response = request
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| ToolError::Backend(e.to_string()))?;
        read_json_response(response).await
    }
}
