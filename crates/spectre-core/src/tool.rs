//! Tool model.
//!
//! Connectors expose their functionality as tools: named, described,
//! JSON-schema'd handlers callable over the outer tool-calling protocol.
//! This module defines the declaration ([`ToolSpec`]), the handler
//! capability ([`ToolHandler`]), and the registry capability connectors
//! receive in `register_tools` ([`ToolRegistry`]).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::connector::{Health, HealthCell};

// ToolError
// ---------------------------------------------------------------------------

/// Errors surfaced by tool handlers and tool registration.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The backing connector instance is degraded or stopped; the call can
    /// be retried once the instance recovers.
    #[error("service unavailable: instance {instance} cannot serve requests")]
    ServiceUnavailable {
        /// The instance that owns the tool.
        instance: String,
    },

    /// The argument payload failed to parse or validate.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The backend rejected or failed the request.
    #[error("backend error: {0}")]
    Backend(String),

    /// The declaration was rejected by the registry or outer server.
    #[error("registration failed: {0}")]
    Registration(String),
}

/// Convenience alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

// ToolHandler
// ---------------------------------------------------------------------------

/// An invocable tool body.
///
/// Handlers receive the raw JSON argument payload and return a
/// JSON-serializable result. Timeouts are the handler's own responsibility;
/// the registration path never wraps calls.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with the given arguments.
    async fn call(&self, args: Value) -> ToolResult<Value>;
}

impl fmt::Debug for dyn ToolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolHandler").finish_non_exhaustive()
    }
}

// ToolSpec
// ---------------------------------------------------------------------------

/// A tool declaration: name, description, input schema, and handler.
///
/// Connectors declare tools with their short names (`logs`, `search`); the
/// registration bridge qualifies them with the owning instance before they
/// reach the outer protocol server.
#[derive(Clone)]
pub struct ToolSpec {
    /// Tool name.
    pub name: String,
    /// Human-readable description for protocol clients.
    pub description: String,
    /// JSON Schema for the argument payload.
    pub input_schema: Value,
    /// The invocable body.
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolSpec {
    /// Create a new declaration.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler,
        }
    }
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

// ToolRegistry
// ---------------------------------------------------------------------------

/// The capability a connector receives for declaring its tools.
pub trait ToolRegistry: Send {
    /// Register one tool declaration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Registration`] if the declaration is rejected.
    fn register(&mut self, tool: ToolSpec) -> ToolResult<()>;
}

// HealthGatedTool
// ---------------------------------------------------------------------------

/// Wraps a handler so that calls fail with [`ToolError::ServiceUnavailable`]
/// unless the owning instance currently reads `Healthy`.
///
/// Every connector wraps its handlers in this gate: tools of a degraded
/// instance stay discoverable and callable, answering with a structured
/// unavailability error until the instance recovers.
pub struct HealthGatedTool {
    instance: String,
    health: HealthCell,
    inner: Arc<dyn ToolHandler>,
}

impl HealthGatedTool {
    /// Gate `inner` on `health`, attributing failures to `instance`.
    #[must_use]
    pub fn new(instance: impl Into<String>, health: HealthCell, inner: Arc<dyn ToolHandler>) -> Self {
        Self {
            instance: instance.into(),
            health,
            inner,
        }
    }

    /// Convenience: gate and wrap in an `Arc` in one step.
    #[must_use]
    pub fn wrap(
        instance: impl Into<String>,
        health: HealthCell,
        inner: Arc<dyn ToolHandler>,
    ) -> Arc<dyn ToolHandler> {
        Arc::new(Self::new(instance, health, inner))
    }
}

#[async_trait]
impl ToolHandler for HealthGatedTool {
    async fn call(&self, args: Value) -> ToolResult<Value> {
        if self.health.get() != Health::Healthy {
            return Err(ToolError::ServiceUnavailable {
                instance: self.instance.clone(),
            });
        }
        self.inner.call(args).await
    }
}

impl fmt::Debug for HealthGatedTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthGatedTool")
            .field("instance", &self.instance)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}
