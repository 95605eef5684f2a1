//! Lifecycle scaffolding shared by every connector.
//!
//! Config parsing, endpoint validation, HTTP client construction, the
//! reachability probe used by `start`/`health`, and the generic
//! query-parameter tool handler.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use spectre_core::{ToolError, ToolHandler, ToolResult};
use spectre_runtime::{RuntimeError, RuntimeResult};

/// Bound on reachability probes, matching the manager's health budget.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Deserialize an instance's free-form `config` mapping into the
/// connector's typed config.
pub(crate) fn parse_instance_config<T: DeserializeOwned>(
    instance: &str,
    value: &serde_yaml::Value,
) -> RuntimeResult<T> {
    serde_yaml::from_value(value.clone()).map_err(|e| RuntimeError::Factory {
        instance: instance.to_owned(),
        message: e.to_string(),
    })
}

/// Validate an endpoint and normalize it (scheme check, no trailing slash).
///
/// Connectors build request paths by appending to the returned string, so a
/// trailing slash would produce double separators.
pub(crate) fn parse_base_url(instance: &str, raw: &str) -> RuntimeResult<String> {
    let url = Url::parse(raw).map_err(|e| RuntimeError::Factory {
        instance: instance.to_owned(),
        message: format!("invalid url {raw:?}: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RuntimeError::Factory {
            instance: instance.to_owned(),
            message: format!("unsupported url scheme {:?}", url.scheme()),
        });
    }
    Ok(raw.trim_end_matches('/').to_owned())
}

/// Build the connector's HTTP client with its configured request timeout.
pub(crate) fn http_client(
    instance: &str,
    timeout: Duration,
    headers: reqwest::header::HeaderMap,
) -> RuntimeResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| RuntimeError::Factory {
            instance: instance.to_owned(),
            message: format!("http client: {e}"),
        })
}

/// Probe a backend endpoint for reachability.
///
/// # Errors
///
/// Returns a description of the failure (transport error or non-success
/// status) for the caller to log and fold into its health state.
pub(crate) async fn probe_endpoint(client: &reqwest::Client, url: &str) -> Result<(), String> {
    let response = client
        .get(url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(format!("probe of {url} returned {status}"))
    }
}

// HttpQueryTool
// ---------------------------------------------------------------------------

/// Generic tool handler: forwards the argument object as query parameters to
/// one backend endpoint and surfaces the JSON response.
pub(crate) struct HttpQueryTool {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpQueryTool {
    pub(crate) fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl ToolHandler for HttpQueryTool {
    async fn call(&self, args: Value) -> ToolResult<Value> {
        let params = query_params(&args)?;
        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| ToolError::Backend(e.to_string()))?;
        read_json_response(response).await
    }
}

/// Render a tool argument object as HTTP query parameters.
///
/// Only scalar values are accepted; nested structures indicate a malformed
/// call rather than something to silently stringify.
pub(crate) fn query_params(args: &Value) -> ToolResult<Vec<(String, String)>> {
    match args {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(ToolError::InvalidArguments(format!(
                            "argument {key:?} must be a scalar, got {other}"
                        )));
                    },
                };
                Ok((key.clone(), rendered))
            })
            .collect(),
        _ => Err(ToolError::InvalidArguments(
            "tool arguments must be a JSON object".into(),
        )),
    }
}

/// Collect a backend response as JSON, tolerating non-JSON bodies (some
/// backends stream NDJSON or plain text) by wrapping them as a string.
pub(crate) async fn read_json_response(response: reqwest::Response) -> ToolResult<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ToolError::Backend(e.to_string()))?;
    if !status.is_success() {
        return Err(ToolError::Backend(format!("backend returned {status}: {body}")));
    }
    match serde_json::from_str(&body) {
        Ok(value) => Ok(value),
        Err(_) => Ok(Value::String(body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_base_url_normalizes_trailing_slash() {
        assert_eq!(
            parse_base_url("i", "http://vl:9428/").unwrap(),
            "http://vl:9428"
        );
        assert_eq!(
            parse_base_url("i", "https://grafana.example.com").unwrap(),
            "https://grafana.example.com"
        );
    }

    #[test]
    fn parse_base_url_rejects_garbage() {
        assert!(parse_base_url("i", "not a url").is_err());
        assert!(parse_base_url("i", "ftp://vl:9428").is_err());
    }

    #[test]
    fn parse_instance_config_surfaces_serde_errors() {
        #[derive(serde::Deserialize)]
        struct NeedsUrl {
            #[allow(dead_code)]
            url: String,
        }

        let value: serde_yaml::Value = serde_yaml::from_str("timeout: 3").unwrap();
        let result: RuntimeResult<NeedsUrl> = parse_instance_config("vl-prod", &value);
        assert!(matches!(
            result,
            Err(RuntimeError::Factory { instance, .. }) if instance == "vl-prod"
        ));
    }

    #[test]
    fn query_params_accepts_scalars() {
        let params = query_params(&json!({"query": "error", "limit": 100, "desc": true})).unwrap();
        assert!(params.contains(&("query".into(), "error".into())));
        assert!(params.contains(&("limit".into(), "100".into())));
        assert!(params.contains(&("desc".into(), "true".into())));
    }

    #[test]
    fn query_params_rejects_nested_values() {
        assert!(query_params(&json!({"filter": {"a": 1}})).is_err());
        assert!(query_params(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn query_params_accepts_null_as_empty() {
        assert!(query_params(&Value::Null).unwrap().is_empty());
    }
}
