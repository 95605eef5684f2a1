//! Spectre integration runtime daemon.
//!
//! Wires the compiled-in connectors, the lifecycle manager, and the tool
//! table together: parse flags, initialize logging, register factories, run
//! until interrupted, shut down in order.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use spectre_connectors::register_builtin_factories;
use spectre_runtime::{FactoryRegistry, InMemoryToolServer, IntegrationManager, ManagerOptions};
use spectre_secrets::{ChannelInformer, SecretInformer};

/// Spectre - observability connectors behind a tool-calling surface
#[derive(Parser)]
#[command(name = "spectre-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the connector configuration file
    #[arg(short, long, env = "SPECTRE_CONFIG")]
    config: PathBuf,

    /// Minimum accepted connector version (semver)
    #[arg(long, env = "SPECTRE_MIN_VERSION")]
    min_version: Option<String>,

    /// Seconds between health-check passes
    #[arg(long, default_value_t = 30)]
    health_interval_secs: u64,

    /// Per-instance budget for start/stop calls, in seconds
    #[arg(long, default_value_t = 10)]
    shutdown_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let factories = Arc::new(FactoryRegistry::new());
    // Development stand-in; a deployment wires a Kubernetes-backed informer
    // here so Secret-referencing connectors see real credentials.
    let informer: Arc<dyn SecretInformer> = Arc::new(ChannelInformer::new());
    register_builtin_factories(&factories, informer)
        .context("registering builtin connector factories")?;
    info!(types = ?factories.list_types(), "registered connector factories");

    let tool_server = Arc::new(InMemoryToolServer::new());
    let options = {
        let mut options = ManagerOptions::new(&args.config)
            .health_interval(Duration::from_secs(args.health_interval_secs))
            .shutdown_timeout(Duration::from_secs(args.shutdown_timeout_secs))
            .tool_server(tool_server.clone());
        if let Some(min) = &args.min_version {
            options = options.min_version(min);
        }
        options
    };

    let manager = IntegrationManager::new(factories, options)?;
    manager
        .clone()
        .start()
        .await
        .context("starting integration manager")?;
    info!(tools = ?tool_server.tool_names(), "tool surface ready");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    manager.stop().await.context("stopping integration manager")?;
    Ok(())
}
