//! Spectre Core - Foundation types and traits for the Spectre integration runtime.
//!
//! This crate provides:
//! - The `Connector` capability set every backend integration satisfies
//! - The tri-valued health model shared by connectors and their supervisor
//! - The tool model: declarations, handlers, and the registry capability
//!   connectors use to expose tools
//! - Error types for connector and tool operations

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod connector;
pub mod tool;

pub use connector::{
    Connector, ConnectorError, ConnectorMetadata, ConnectorResult, Health, HealthCell,
};
pub use tool::{
    HealthGatedTool, ToolError, ToolHandler, ToolRegistry, ToolResult, ToolSpec,
};
