//! Tool registration bridge.
//!
//! Adapts the [`ToolRegistry`] capability a connector expects to the
//! [`ToolServer`] operation the outer protocol server provides, qualifying
//! each short tool name with the owning instance on the way through.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

use spectre_core::{ToolError, ToolRegistry, ToolResult, ToolSpec};

/// Fully qualified tool name: `{type}_{instance}_{tool}`.
///
/// Keeps tools from different instances of the same type apart and lets
/// protocol clients attribute a tool to its backend at a glance.
#[must_use]
pub fn qualified_tool_name(connector_type: &str, instance: &str, tool: &str) -> String {
    format!("{connector_type}_{instance}_{tool}")
}

// ToolServer
// ---------------------------------------------------------------------------

/// The operation the outer protocol server exposes to the bridge.
///
/// # Upsert semantics
///
/// `add_tool` registers **or replaces** the tool with that name. The manager
/// re-registers every connector's tools on each lifecycle transition
/// (including reloads); upsert semantics keep that idempotent instead of
/// accumulating stale entries. Implementations that cannot replace must
/// treat a duplicate as a replacement anyway or reject it with
/// [`ToolError::Registration`].
pub trait ToolServer: Send + Sync {
    /// Register or replace one tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Registration`] if the server rejects the
    /// declaration.
    fn add_tool(&self, tool: ToolSpec) -> ToolResult<()>;
}

// ToolBridge
// ---------------------------------------------------------------------------

/// Per-instance adapter handed to `Connector::register_tools`.
///
/// Each declaration is renamed from its short form to the qualified form and
/// forwarded to the outer server.
pub struct ToolBridge {
    server: Arc<dyn ToolServer>,
    connector_type: String,
    instance: String,
}

impl ToolBridge {
    /// Create a bridge that attributes declarations to one instance.
    #[must_use]
    pub fn new(
        server: Arc<dyn ToolServer>,
        connector_type: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            server,
            connector_type: connector_type.into(),
            instance: instance.into(),
        }
    }
}

impl ToolRegistry for ToolBridge {
    fn register(&mut self, tool: ToolSpec) -> ToolResult<()> {
        let name = qualified_tool_name(&self.connector_type, &self.instance, &tool.name);
        debug!(tool = %name, "registering tool");
        self.server.add_tool(ToolSpec { name, ..tool })
    }
}

impl std::fmt::Debug for ToolBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBridge")
            .field("connector_type", &self.connector_type)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

// InMemoryToolServer
// ---------------------------------------------------------------------------

/// An upserting in-memory [`ToolServer`].
///
/// Stands in for the wire transport in tests and in the development binary:
/// it keeps the tool table and can invoke handlers directly.
#[derive(Default)]
pub struct InMemoryToolServer {
    tools: RwLock<HashMap<String, ToolSpec>>,
}

impl InMemoryToolServer {
    /// Create an empty server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered tool names, sorted.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.tools).keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.tools).len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        read(&self.tools).is_empty()
    }

    /// Whether a tool with this qualified name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        read(&self.tools).contains_key(name)
    }

    /// Invoke a registered tool by qualified name.
    ///
    /// The handler is cloned out of the table before the call so the table
    /// lock is never held across handler I/O.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] for an unknown name, or
    /// whatever the handler returns.
    pub async fn call(&self, name: &str, args: Value) -> ToolResult<Value> {
        let handler = {
            let tools = read(&self.tools);
            let spec = tools
                .get(name)
                .ok_or_else(|| ToolError::InvalidArguments(format!("unknown tool: {name}")))?;
            Arc::clone(&spec.handler)
        };
        handler.call(args).await
    }
}

impl ToolServer for InMemoryToolServer {
    fn add_tool(&self, tool: ToolSpec) -> ToolResult<()> {
        let mut tools = match self.tools.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tools.insert(tool.name.clone(), tool);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryToolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryToolServer")
            .field("tool_count", &self.len())
            .finish_non_exhaustive()
    }
}

fn read(
    lock: &RwLock<HashMap<String, ToolSpec>>,
) -> std::sync::RwLockReadGuard<'_, HashMap<String, ToolSpec>> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use spectre_core::ToolHandler;

    struct StaticTool(Value);

    #[async_trait]
    impl ToolHandler for StaticTool {
        async fn call(&self, _args: Value) -> ToolResult<Value> {
            Ok(self.0.clone())
        }
    }

    fn spec(name: &str, result: Value) -> ToolSpec {
        ToolSpec::new(
            name,
            "test tool",
            json!({"type": "object"}),
            Arc::new(StaticTool(result)),
        )
    }

    #[test]
    fn qualified_names() {
        assert_eq!(
            qualified_tool_name("victorialogs", "vl-prod", "logs"),
            "victorialogs_vl-prod_logs"
        );
    }

    #[test]
    fn bridge_qualifies_declarations() {
        let server = Arc::new(InMemoryToolServer::new());
        let mut bridge = ToolBridge::new(server.clone(), "victorialogs", "vl-prod");

        bridge.register(spec("overview", json!(1))).unwrap();
        bridge.register(spec("patterns", json!(2))).unwrap();
        bridge.register(spec("logs", json!(3))).unwrap();

        assert_eq!(
            server.tool_names(),
            vec![
                "victorialogs_vl-prod_logs",
                "victorialogs_vl-prod_overview",
                "victorialogs_vl-prod_patterns",
            ]
        );
    }

    #[test]
    fn add_tool_upserts_by_name() {
        let server = InMemoryToolServer::new();
        server
            .add_tool(spec("victorialogs_vl-prod_logs", json!("old")))
            .unwrap();
        server
            .add_tool(spec("victorialogs_vl-prod_logs", json!("new")))
            .unwrap();
        assert_eq!(server.len(), 1);
    }

    #[tokio::test]
    async fn upsert_replaces_the_handler() {
        let server = InMemoryToolServer::new();
        server.add_tool(spec("t", json!("old"))).unwrap();
        server.add_tool(spec("t", json!("new"))).unwrap();

        let result = server.call("t", json!({})).await.unwrap();
        assert_eq!(result, json!("new"));
    }

    #[tokio::test]
    async fn call_unknown_tool_fails() {
        let server = InMemoryToolServer::new();
        let result = server.call("missing", json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn call_invokes_the_handler() {
        let server = InMemoryToolServer::new();
        server.add_tool(spec("t", json!({"hits": 42}))).unwrap();

        let result = server.call("t", json!({})).await.unwrap();
        assert_eq!(result, json!({"hits": 42}));
    }
}
