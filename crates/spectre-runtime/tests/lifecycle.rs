//! End-to-end lifecycle scenarios against mock connectors, an in-memory
//! tool server, and real config files.
//!
//! Reloads are driven through `IntegrationManager::reload` directly so the
//! assertions do not depend on filesystem event latency; the full
//! watcher-driven path is covered by one `#[ignore]`d test at the bottom.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use spectre_config::SpectreConfig;
use spectre_core::{
    Connector, ConnectorError, ConnectorMetadata, ConnectorResult, Health, HealthCell,
    HealthGatedTool, ToolError, ToolHandler, ToolRegistry, ToolResult, ToolSpec,
};
use spectre_runtime::{
    FactoryRegistry, InMemoryToolServer, IntegrationManager, ManagerOptions, RuntimeError,
};

// Mock connector
// ---------------------------------------------------------------------------

struct MockConnector {
    meta: ConnectorMetadata,
    health: HealthCell,
    fail_start: Arc<AtomicBool>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    tools: Vec<&'static str>,
}

struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, args: Value) -> ToolResult<Value> {
        Ok(json!({"echo": args}))
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn metadata(&self) -> ConnectorMetadata {
        self.meta.clone()
    }

    async fn start(&self) -> ConnectorResult<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.health.get() == Health::Healthy {
            return Ok(());
        }
        if self.fail_start.load(Ordering::SeqCst) {
            self.health.set(Health::Degraded);
            return Err(ConnectorError::Connection("connection refused".into()));
        }
        self.health.set(Health::Healthy);
        Ok(())
    }

    async fn stop(&self) -> ConnectorResult<()> {
        if self.health.get() != Health::Stopped {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.health.set(Health::Stopped);
        Ok(())
    }

    async fn health(&self) -> Health {
        self.health.get()
    }

    fn register_tools(&self, registry: &mut dyn ToolRegistry) -> ConnectorResult<()> {
        for tool in &self.tools {
            registry
                .register(ToolSpec::new(
                    *tool,
                    "mock tool",
                    json!({"type": "object"}),
                    HealthGatedTool::wrap(
                        self.meta.name.clone(),
                        self.health.clone(),
                        Arc::new(EchoTool),
                    ),
                ))
                .map_err(|e| ConnectorError::ToolRegistration(e.to_string()))?;
        }
        Ok(())
    }
}

/// Everything the tests need to observe and steer the mock fleet.
#[derive(Default)]
struct MockFleet {
    fail_start: Arc<AtomicBool>,
    created: Mutex<Vec<Arc<MockConnector>>>,
}

impl MockFleet {
    fn connector(&self, name: &str) -> Arc<MockConnector> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.meta.name == name)
            .cloned()
            .expect("connector not created")
    }
}

fn register_mock_type(
    factories: &FactoryRegistry,
    fleet: &Arc<MockFleet>,
    type_name: &'static str,
    version: &'static str,
    tools: Vec<&'static str>,
) {
    let fleet = Arc::clone(fleet);
    factories
        .register(
            type_name,
            Arc::new(move |name: &str, _config: &serde_yaml::Value| {
                let connector = Arc::new(MockConnector {
                    meta: ConnectorMetadata {
                        name: name.to_owned(),
                        connector_type: type_name.into(),
                        version: version.into(),
                        description: format!("mock {type_name}"),
                    },
                    health: HealthCell::new(),
                    fail_start: Arc::clone(&fleet.fail_start),
                    start_calls: AtomicUsize::new(0),
                    stop_calls: AtomicUsize::new(0),
                    tools: tools.clone(),
                });
                fleet.created.lock().unwrap().push(Arc::clone(&connector));
                Ok(connector as Arc<dyn Connector>)
            }),
        )
        .unwrap();
}

// Fixtures
// ---------------------------------------------------------------------------

const ONE_INSTANCE: &str = concat!(
    "schema_version: v1\n",
    "instances:\n",
    "  - name: vl-prod\n",
    "    type: victorialogs\n",
    "    enabled: true\n",
    "    config:\n",
    "      url: \"http://vl:9428\"\n",
);

const TWO_INSTANCES: &str = concat!(
    "schema_version: v1\n",
    "instances:\n",
    "  - {name: vl-prod, type: victorialogs, enabled: true}\n",
    "  - {name: vl-staging, type: victorialogs, enabled: true}\n",
);

struct Harness {
    _dir: TempDir,
    config_path: PathBuf,
    fleet: Arc<MockFleet>,
    factories: Arc<FactoryRegistry>,
    server: Arc<InMemoryToolServer>,
    manager: Arc<IntegrationManager>,
}

fn harness(config: &str, min_version: Option<&str>) -> Harness {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("spectre.yaml");
    std::fs::write(&config_path, config).unwrap();

    let fleet = Arc::new(MockFleet::default());
    let factories = Arc::new(FactoryRegistry::new());
    register_mock_type(
        &factories,
        &fleet,
        "victorialogs",
        "1.2.0",
        vec!["overview", "patterns", "logs"],
    );

    let server = Arc::new(InMemoryToolServer::new());
    let mut options = ManagerOptions::new(&config_path)
        .health_interval(Duration::from_millis(50))
        .shutdown_timeout(Duration::from_secs(2))
        .debounce(Duration::from_millis(50))
        .tool_server(server.clone());
    if let Some(min) = min_version {
        options = options.min_version(min);
    }
    let manager = IntegrationManager::new(Arc::clone(&factories), options).unwrap();

    Harness {
        _dir: dir,
        config_path,
        fleet,
        factories,
        server,
        manager,
    }
}

async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within timeout");
}

// Scenario 1: happy start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_start_registers_instance_and_tools() {
    let h = harness(ONE_INSTANCE, Some("1.0.0"));
    h.manager.clone().start().await.unwrap();

    assert_eq!(h.manager.registry().list(), vec!["vl-prod"]);
    let connector = h.manager.registry().get("vl-prod").unwrap();
    assert_eq!(connector.health().await, Health::Healthy);

    assert_eq!(
        h.server.tool_names(),
        vec![
            "victorialogs_vl-prod_logs",
            "victorialogs_vl-prod_overview",
            "victorialogs_vl-prod_patterns",
        ]
    );

    let result = h
        .server
        .call("victorialogs_vl-prod_logs", json!({"query": "error"}))
        .await
        .unwrap();
    assert_eq!(result, json!({"echo": {"query": "error"}}));

    h.manager.stop().await.unwrap();
}

// Scenario 2: version rejection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn version_rejection_aborts_start_and_leaves_nothing_behind() {
    let h = harness(ONE_INSTANCE, Some("2.0.0"));
    let result = h.manager.clone().start().await;

    assert!(matches!(result, Err(RuntimeError::VersionMismatch { .. })));
    assert!(h.manager.registry().is_empty());
    assert!(h.server.is_empty());
}

// Scenario 3: degraded on start failure, recovered by the health loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_start_leaves_degraded_instance_with_callable_tools() {
    let h = harness(ONE_INSTANCE, Some("1.0.0"));
    h.fleet.fail_start.store(true, Ordering::SeqCst);
    h.manager.clone().start().await.unwrap();

    // Present, degraded, tools registered.
    let connector = h.manager.registry().get("vl-prod").unwrap();
    assert_eq!(connector.health().await, Health::Degraded);
    assert_eq!(h.server.len(), 3);

    // Tools answer with a structured unavailability error.
    let err = h
        .server
        .call("victorialogs_vl-prod_logs", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::ServiceUnavailable { instance } if instance == "vl-prod"));

    // Clear the fault; the health loop recovers the instance via start().
    h.fleet.fail_start.store(false, Ordering::SeqCst);
    let mock = h.fleet.connector("vl-prod");
    wait_until(|| mock.health.get() == Health::Healthy).await;

    assert!(
        h.server
            .call("victorialogs_vl-prod_logs", json!({}))
            .await
            .is_ok()
    );

    h.manager.stop().await.unwrap();
}

// Scenario 4: hot reload from one instance to two
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reload_restarts_old_instance_and_adds_new_one() {
    let h = harness(ONE_INSTANCE, Some("1.0.0"));
    h.manager.clone().start().await.unwrap();
    assert_eq!(h.server.len(), 3);

    let first = h.fleet.connector("vl-prod");

    let new_doc: SpectreConfig = serde_yaml::from_str(TWO_INSTANCES).unwrap();
    h.manager.reload(new_doc).await.unwrap();

    // The old connector object was stopped and a fresh one constructed.
    assert_eq!(first.stop_calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.health.get(), Health::Stopped);
    let second = h.fleet.connector("vl-prod");
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.health.get(), Health::Healthy);

    assert_eq!(
        h.manager.registry().list(),
        vec!["vl-prod", "vl-staging"]
    );
    // Tool count doubled: upsert replaced vl-prod's tools, vl-staging added
    // three more.
    assert_eq!(h.server.len(), 6);

    h.manager.stop().await.unwrap();
}

// Reload with a version mismatch keeps the partially restarted set
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reload_version_mismatch_keeps_partial_set() {
    let h = harness(ONE_INSTANCE, Some("1.0.0"));
    register_mock_type(&h.factories, &h.fleet, "ancient", "0.1.0", vec![]);
    h.manager.clone().start().await.unwrap();

    // The new document starts vl-prod first (document order), then hits the
    // version gate on the ancient connector.
    let new_doc: SpectreConfig = serde_yaml::from_str(concat!(
        "schema_version: v1\n",
        "instances:\n",
        "  - {name: vl-prod, type: victorialogs, enabled: true}\n",
        "  - {name: relic, type: ancient, enabled: true}\n",
    ))
    .unwrap();

    let result = h.manager.reload(new_doc).await;
    assert!(matches!(result, Err(RuntimeError::VersionMismatch { .. })));

    // The subset started before the mismatch stays registered and serving.
    assert_eq!(h.manager.registry().list(), vec!["vl-prod"]);
    assert!(
        h.server
            .call("victorialogs_vl-prod_logs", json!({}))
            .await
            .is_ok()
    );

    h.manager.stop().await.unwrap();
}

// Idempotence laws
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_twice_on_healthy_instance_is_a_no_op() {
    let h = harness(ONE_INSTANCE, None);
    h.manager.clone().start().await.unwrap();

    let mock = h.fleet.connector("vl-prod");
    assert_eq!(mock.start_calls.load(Ordering::SeqCst), 1);

    mock.start().await.unwrap();
    assert_eq!(mock.health.get(), Health::Healthy);

    h.manager.stop().await.unwrap();
}

#[tokio::test]
async fn stop_invokes_connector_stop_exactly_once() {
    let h = harness(ONE_INSTANCE, None);
    h.manager.clone().start().await.unwrap();

    let mock = h.fleet.connector("vl-prod");
    h.manager.stop().await.unwrap();
    assert_eq!(mock.stop_calls.load(Ordering::SeqCst), 1);
    assert!(h.manager.registry().is_empty());

    // A second manager stop is a no-op.
    h.manager.stop().await.unwrap();
    assert_eq!(mock.stop_calls.load(Ordering::SeqCst), 1);
}

// Scenario 4+5 through the real file watcher
// ---------------------------------------------------------------------------

/// Drives a reload through the filesystem watcher, then breaks the file and
/// checks the last-known-good configuration stays in effect. Marked
/// `#[ignore]` because inotify/FSEvents latency makes it flaky in CI. Run
/// manually with `--ignored`.
#[tokio::test]
#[ignore = "flaky on CI due to filesystem timing"]
async fn watcher_driven_reload_and_invalid_edit() {
    let h = harness(ONE_INSTANCE, Some("1.0.0"));
    h.manager.clone().start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    std::fs::write(&h.config_path, TWO_INSTANCES).unwrap();

    let registry = h.manager.registry();
    wait_until(|| registry.len() == 2).await;
    assert_eq!(h.server.len(), 6);

    // Malformed edit: watcher logs and keeps the previous document.
    std::fs::write(&h.config_path, "schema_version: v1\ninstances: [oops").unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(registry.len(), 2);

    h.manager.stop().await.unwrap();
}
