//! The lifecycle manager.
//!
//! Composes the factory registry, instance registry, configuration loader,
//! file watcher, and tool bridge into one supervised unit. Responsibilities:
//!
//! - **Start**: load the config, construct and start every enabled instance
//!   in document order, gate versions against the optional minimum, register
//!   tools, then arm the file watcher and the health loop.
//! - **Reload**: full restart. Stop everything, clear the registry, re-run
//!   the start pass against the new document.
//! - **Health loop**: periodic probes; a degraded instance gets a `start`
//!   call as a recovery attempt.
//! - **Stop**: tear down in reverse.
//!
//! Failure isolation: a misconfigured or unreachable instance is skipped or
//! left degraded, never fatal. The only conditions that abort a start are a
//! loader failure, a version below the minimum (or unparseable), and a
//! watcher that cannot be armed.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use serde::Serialize;
use spectre_config::{ConfigWatcher, ReloadHandler, SpectreConfig, DEFAULT_DEBOUNCE};
use spectre_core::{ConnectorMetadata, Health};

use crate::bridge::{ToolBridge, ToolServer};
use crate::error::{RuntimeError, RuntimeResult};
use crate::factory::FactoryRegistry;
use crate::instances::InstanceRegistry;

/// Default interval between health-check passes.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Default per-instance budget for start/stop calls.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on a single health probe.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

// ManagerOptions
// ---------------------------------------------------------------------------

/// Construction options for [`IntegrationManager`].
#[derive(Clone)]
pub struct ManagerOptions {
    config_path: PathBuf,
    min_version: Option<String>,
    health_interval: Duration,
    shutdown_timeout: Duration,
    debounce: Duration,
    tool_server: Option<Arc<dyn ToolServer>>,
}

impl ManagerOptions {
    /// Options with defaults for the given config file path.
    #[must_use]
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            min_version: None,
            health_interval: DEFAULT_HEALTH_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            debounce: DEFAULT_DEBOUNCE,
            tool_server: None,
        }
    }

    /// Require every connector version to be at least `version` (semver).
    #[must_use]
    pub fn min_version(mut self, version: impl Into<String>) -> Self {
        self.min_version = Some(version.into());
        self
    }

    /// Override the health-check interval.
    #[must_use]
    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Override the per-instance start/stop budget.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Override the file-watcher debounce interval.
    #[must_use]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Register connector tools on this outer protocol server.
    #[must_use]
    pub fn tool_server(mut self, server: Arc<dyn ToolServer>) -> Self {
        self.tool_server = Some(server);
        self
    }
}

impl std::fmt::Debug for ManagerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerOptions")
            .field("config_path", &self.config_path)
            .field("min_version", &self.min_version)
            .field("health_interval", &self.health_interval)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("debounce", &self.debounce)
            .field("has_tool_server", &self.tool_server.is_some())
            .finish()
    }
}

// InstanceStatus
// ---------------------------------------------------------------------------

/// One row of the manager's outward status surface.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    /// The instance's metadata.
    #[serde(flatten)]
    pub metadata: ConnectorMetadata,
    /// Health at snapshot time.
    pub health: Health,
}

// IntegrationManager
// ---------------------------------------------------------------------------

/// Supervises the configured connector instances.
pub struct IntegrationManager {
    factories: Arc<FactoryRegistry>,
    instances: Arc<InstanceRegistry>,
    config_path: PathBuf,
    min_version: Option<semver::Version>,
    health_interval: Duration,
    shutdown_timeout: Duration,
    debounce: Duration,
    tool_server: Option<Arc<dyn ToolServer>>,
    /// Serializes lifecycle transitions. Reload holds the write half across
    /// the full restart; the health loop takes the read half only to
    /// snapshot the instance list.
    lifecycle: tokio::sync::RwLock<()>,
    watcher: tokio::sync::Mutex<Option<ConfigWatcher>>,
    health_task: std::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    running: AtomicBool,
}

impl IntegrationManager {
    /// Create a manager.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::EmptyConfigPath`] for an empty path.
    /// - [`RuntimeError::InvalidMinVersion`] for a malformed minimum
    ///   version.
    pub fn new(factories: Arc<FactoryRegistry>, options: ManagerOptions) -> RuntimeResult<Arc<Self>> {
        if options.config_path.as_os_str().is_empty() {
            return Err(RuntimeError::EmptyConfigPath);
        }
        let min_version = options
            .min_version
            .as_deref()
            .map(|raw| {
                semver::Version::parse(raw).map_err(|e| RuntimeError::InvalidMinVersion {
                    value: raw.to_owned(),
                    source: e,
                })
            })
            .transpose()?;

        Ok(Arc::new(Self {
            factories,
            instances: Arc::new(InstanceRegistry::new()),
            config_path: options.config_path,
            min_version,
            health_interval: options.health_interval,
            shutdown_timeout: options.shutdown_timeout,
            debounce: options.debounce,
            tool_server: options.tool_server,
            lifecycle: tokio::sync::RwLock::new(()),
            watcher: tokio::sync::Mutex::new(None),
            health_task: std::sync::Mutex::new(None),
            running: AtomicBool::new(false),
        }))
    }

    /// Load the configuration and bring every enabled instance up, then arm
    /// the file watcher and the health loop.
    ///
    /// # Errors
    ///
    /// Fatal conditions only: loader errors, a connector version below the
    /// minimum (or unparseable), or a watcher that fails to start. On any of
    /// them the instances already started are torn down before returning.
    pub async fn start(self: Arc<Self>) -> RuntimeResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyStarted);
        }
        match self.start_inner().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            },
        }
    }

    async fn start_inner(self: &Arc<Self>) -> RuntimeResult<()> {
        let config = spectre_config::load(&self.config_path)?;

        {
            let _guard = self.lifecycle.write().await;
            if let Err(e) = self.start_instances(&config).await {
                self.teardown_instances().await;
                return Err(e);
            }
        }

        let handler: Arc<dyn ReloadHandler> = Arc::clone(self) as Arc<dyn ReloadHandler>;
        let mut watcher = ConfigWatcher::new(&self.config_path, self.debounce, handler);
        if let Err(e) = watcher.start() {
            let _guard = self.lifecycle.write().await;
            self.teardown_instances().await;
            return Err(RuntimeError::WatcherStart(e));
        }
        *self.watcher.lock().await = Some(watcher);

        self.spawn_health_loop();
        info!(
            instances = self.instances.len(),
            config = %self.config_path.display(),
            "integration manager started"
        );
        Ok(())
    }

    /// Full-restart reload, serialized under the lifecycle write lock.
    ///
    /// # Errors
    ///
    /// Propagates version failures from the re-start pass. The manager keeps
    /// running with whatever subset was started before the failing entry.
    pub async fn reload(&self, config: SpectreConfig) -> RuntimeResult<()> {
        let _guard = self.lifecycle.write().await;
        info!("configuration changed, restarting all instances");
        self.teardown_instances().await;
        if let Err(e) = self.start_instances(&config).await {
            error!(error = %e, "reload aborted; continuing with the instances already started");
            return Err(e);
        }
        info!(instances = self.instances.len(), "reload complete");
        Ok(())
    }

    /// Stop the health loop, the file watcher, and every instance.
    ///
    /// Idempotent; teardown errors are logged, not propagated.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; the signature leaves room for
    /// surfacing teardown failures.
    pub async fn stop(&self) -> RuntimeResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some((cancel, handle)) = take_task(&self.health_task) {
            cancel.cancel();
            // A probe pass in flight finishes on its own; bound the wait.
            let _ = timeout(self.shutdown_timeout, handle).await;
        }

        if let Some(mut watcher) = self.watcher.lock().await.take() {
            if let Err(e) = watcher.stop().await {
                warn!(error = %e, "config watcher stop failed");
            }
        }

        let _guard = self.lifecycle.write().await;
        self.teardown_instances().await;
        info!("integration manager stopped");
        Ok(())
    }

    /// Read-only access to the instance registry for external inspectors.
    #[must_use]
    pub fn registry(&self) -> Arc<InstanceRegistry> {
        Arc::clone(&self.instances)
    }

    /// Snapshot of every instance's metadata and current health.
    pub async fn statuses(&self) -> Vec<InstanceStatus> {
        let mut out = Vec::new();
        for (_, connector) in self.instances.snapshot() {
            let health = timeout(HEALTH_PROBE_TIMEOUT, connector.health())
                .await
                .unwrap_or(Health::Degraded);
            out.push(InstanceStatus {
                metadata: connector.metadata(),
                health,
            });
        }
        out
    }

    // Internals
    // -----------------------------------------------------------------

    /// Run the per-instance start pass for one document, in document order.
    ///
    /// Per-instance failures (unknown type, factory rejection, duplicate
    /// name, start failure, tool-registration failure) are logged and
    /// skipped. Version failures abort the pass.
    async fn start_instances(&self, config: &SpectreConfig) -> RuntimeResult<()> {
        for instance in config.enabled_instances() {
            let Some(factory) = self.factories.lookup(&instance.connector_type) else {
                let err = RuntimeError::UnknownType(instance.connector_type.clone());
                warn!(instance = %instance.name, error = %err, "skipping instance");
                continue;
            };

            let connector = match factory(&instance.name, &instance.config) {
                Ok(connector) => connector,
                Err(e) => {
                    warn!(
                        instance = %instance.name,
                        error = %e,
                        "factory rejected instance config, skipping instance"
                    );
                    continue;
                },
            };

            let meta = connector.metadata();
            self.check_version(&instance.name, &meta.version)?;

            if let Err(e) = self.instances.register(&instance.name, Arc::clone(&connector)) {
                warn!(instance = %instance.name, error = %e, "skipping instance");
                continue;
            }

            match timeout(self.shutdown_timeout, connector.start()).await {
                Ok(Ok(())) => {
                    info!(
                        instance = %instance.name,
                        connector_type = %meta.connector_type,
                        version = %meta.version,
                        "instance started"
                    );
                },
                Ok(Err(e)) => {
                    warn!(
                        instance = %instance.name,
                        error = %e,
                        "instance failed to start; it remains registered as degraded"
                    );
                },
                Err(_) => {
                    warn!(
                        instance = %instance.name,
                        budget = ?self.shutdown_timeout,
                        "instance start timed out; it remains registered as degraded"
                    );
                },
            }

            if let Some(server) = &self.tool_server {
                let mut bridge =
                    ToolBridge::new(Arc::clone(server), &meta.connector_type, &instance.name);
                if let Err(e) = connector.register_tools(&mut bridge) {
                    warn!(instance = %instance.name, error = %e, "tool registration failed");
                }
            }
        }
        Ok(())
    }

    /// Gate a connector's declared version against the configured minimum.
    fn check_version(&self, instance: &str, version: &str) -> RuntimeResult<()> {
        let Some(minimum) = &self.min_version else {
            return Ok(());
        };
        let Ok(parsed) = semver::Version::parse(version) else {
            return Err(RuntimeError::InvalidVersion {
                instance: instance.to_owned(),
                version: version.to_owned(),
            });
        };
        if parsed < *minimum {
            return Err(RuntimeError::VersionMismatch {
                instance: instance.to_owned(),
                version: version.to_owned(),
                minimum: minimum.to_string(),
            });
        }
        Ok(())
    }

    /// Stop every registered instance with the per-instance budget, then
    /// clear the registry. Errors are logged, never propagated.
    async fn teardown_instances(&self) {
        for (name, connector) in self.instances.snapshot() {
            match timeout(self.shutdown_timeout, connector.stop()).await {
                Ok(Ok(())) => debug!(instance = %name, "instance stopped"),
                Ok(Err(e)) => warn!(instance = %name, error = %e, "instance stop failed"),
                Err(_) => warn!(
                    instance = %name,
                    budget = ?self.shutdown_timeout,
                    "instance stop timed out"
                ),
            }
        }
        self.instances.clear();
    }

    fn spawn_health_loop(self: &Arc<Self>) {
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = loop_cancel.cancelled() => break,
                    () = tokio::time::sleep(manager.health_interval) => {
                        manager.run_health_checks().await;
                    }
                }
            }
        });

        let mut guard = match self.health_task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some((cancel, handle));
    }

    /// One probe pass. Degraded instances (and probes that exceed their
    /// bound) get a `start` call as a recovery attempt; instances are never
    /// removed here.
    async fn run_health_checks(&self) {
        let snapshot = {
            let _guard = self.lifecycle.read().await;
            self.instances.snapshot()
        };

        for (name, connector) in snapshot {
            // A reload may have removed the instance since the snapshot.
            if self.instances.get(&name).is_none() {
                continue;
            }

            let health = match timeout(HEALTH_PROBE_TIMEOUT, connector.health()).await {
                Ok(health) => health,
                Err(_) => {
                    warn!(instance = %name, "health probe timed out");
                    Health::Degraded
                },
            };

            if health == Health::Degraded {
                info!(instance = %name, "instance degraded, attempting recovery");
                match timeout(self.shutdown_timeout, connector.start()).await {
                    Ok(Ok(())) => info!(instance = %name, "instance recovered"),
                    Ok(Err(e)) => warn!(instance = %name, error = %e, "recovery attempt failed"),
                    Err(_) => warn!(instance = %name, "recovery attempt timed out"),
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ReloadHandler for IntegrationManager {
    async fn on_reload(&self, config: SpectreConfig) -> anyhow::Result<()> {
        self.reload(config).await?;
        Ok(())
    }
}

impl std::fmt::Debug for IntegrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationManager")
            .field("config_path", &self.config_path)
            .field("min_version", &self.min_version)
            .field("instances", &self.instances.list())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

fn take_task(
    slot: &std::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
) -> Option<(CancellationToken, JoinHandle<()>)> {
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}
