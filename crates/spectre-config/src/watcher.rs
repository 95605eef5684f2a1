//! Hot-reload watcher for the configuration file.
//!
//! Watches the config file for changes, debounces bursts (editor save
//! storms, atomic rename), re-runs the loader, and hands the validated new
//! document to a [`ReloadHandler`].
//!
//! # Architecture
//!
//! ```text
//! filesystem events (notify, parent directory)
//!   → filter to the config file's name
//!   → restart a single-shot debounce timer (default 500ms)
//!   → on expiry, re-run the loader
//!   → on success, invoke the reload handler
//!   → on loader failure, log; the previous document stays in effect
//! ```
//!
//! The initial load at [`ConfigWatcher::start`] is the one place where a
//! loader failure is fatal: a process should not come up watching a file it
//! cannot parse. Failures during reload are absorbed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::loader;
use crate::types::SpectreConfig;

/// Default debounce interval for file change events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Bounded wait for the watch loop to drain on stop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives validated documents after each debounced reload.
///
/// The handler runs on the watcher's worker task and must not block it for
/// long; callers that need to serialize heavy reload work do so behind their
/// own lock. A returned error is logged by the watcher, which then keeps
/// watching.
#[async_trait::async_trait]
pub trait ReloadHandler: Send + Sync {
    /// React to a newly validated configuration document.
    ///
    /// # Errors
    ///
    /// Any error is logged by the watcher; it never stops the watch loop.
    async fn on_reload(&self, config: SpectreConfig) -> anyhow::Result<()>;
}

/// Watches one configuration file and drives a [`ReloadHandler`].
///
/// The parent directory is watched rather than the file itself so that
/// atomic replacements (write-temp-and-rename) are observed as well as
/// in-place edits.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    handler: Arc<dyn ReloadHandler>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    /// Create a watcher for `path` with the given debounce interval.
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        debounce: Duration,
        handler: Arc<dyn ReloadHandler>,
    ) -> Self {
        Self {
            path: path.into(),
            debounce,
            handler,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Validate the file and begin watching.
    ///
    /// Performs an initial synchronous load as a fail-fast gate; the loaded
    /// document is discarded (the caller has already applied it) and the
    /// handler is only invoked for subsequent changes.
    ///
    /// # Errors
    ///
    /// Returns the loader error if the initial load fails (watching does not
    /// begin), or [`ConfigError::WatchInit`] if the filesystem watcher
    /// cannot be set up.
    pub fn start(&mut self) -> ConfigResult<()> {
        let _ = loader::load(&self.path)?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| ConfigError::WatchInit(e.to_string()))?;

        // Watch the containing directory: a rename-over replaces the inode,
        // which a file-level watch would silently lose.
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::WatchInit(e.to_string()))?;

        info!(path = %self.path.display(), "watching config file");

        let loop_ctx = WatchLoop {
            path: self.path.clone(),
            debounce: self.debounce,
            handler: Arc::clone(&self.handler),
            cancel: self.cancel.clone(),
        };
        self.task = Some(tokio::spawn(loop_ctx.run(watcher, raw_rx)));
        Ok(())
    }

    /// Stop watching, waiting up to [`DEFAULT_STOP_TIMEOUT`] for the worker
    /// to drain.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::StopTimeout`] if the worker does not finish in
    /// time; the worker is abandoned in that case.
    pub async fn stop(&mut self) -> ConfigResult<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match tokio::time::timeout(DEFAULT_STOP_TIMEOUT, task).await {
                Ok(_) => {},
                Err(_) => return Err(ConfigError::StopTimeout),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("path", &self.path)
            .field("debounce", &self.debounce)
            .field("running", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

/// State moved onto the watch worker task.
struct WatchLoop {
    path: PathBuf,
    debounce: Duration,
    handler: Arc<dyn ReloadHandler>,
    cancel: CancellationToken,
}

impl WatchLoop {
    /// Run until cancelled or the raw event channel closes.
    ///
    /// `_watcher` is held here so filesystem monitoring survives for the
    /// lifetime of the loop; dropping it stops event delivery.
    async fn run(
        self,
        _watcher: RecommendedWatcher,
        mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    ) {
        let mut deadline: Option<tokio::time::Instant> = None;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    debug!(path = %self.path.display(), "config watcher cancelled");
                    break;
                }

                () = async {
                    match deadline {
                        Some(d) => tokio::time::sleep_until(d).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    deadline = None;
                    reload_once(&self.path, self.handler.as_ref()).await;
                }

                event = raw_rx.recv() => {
                    match event {
                        Some(Ok(ev)) => {
                            if self.is_relevant(&ev) {
                                debug!(
                                    path = %self.path.display(),
                                    kind = ?ev.kind,
                                    "config change detected"
                                );
                                #[allow(clippy::arithmetic_side_effects)]
                                // Instant + debounce interval stays far below the Instant range.
                                let next = tokio::time::Instant::now() + self.debounce;
                                deadline = Some(next);
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "filesystem watcher error");
                        }
                        None => {
                            debug!("filesystem watcher channel closed, stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Whether a raw event concerns the watched file.
    fn is_relevant(&self, event: &Event) -> bool {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {},
            _ => return false,
        }
        let Some(file_name) = self.path.file_name() else {
            return false;
        };
        event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name))
    }
}

/// One debounced reload: re-run the loader and, on success, invoke the
/// handler. Both failure modes are absorbed: the previous document stays
/// in effect and watching continues.
async fn reload_once(path: &Path, handler: &dyn ReloadHandler) {
    match loader::load(path) {
        Ok(config) => {
            info!(
                path = %path.display(),
                instances = config.instances.len(),
                "config changed, triggering reload"
            );
            if let Err(e) = handler.on_reload(config).await {
                warn!(path = %path.display(), error = %e, "reload callback failed");
            }
        },
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "config reload failed; previous configuration remains in effect"
            );
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SCHEMA_VERSION;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const VALID: &str = "schema_version: v1\ninstances:\n  - {name: vl, type: victorialogs}\n";

    #[derive(Default)]
    struct RecordingHandler {
        docs: Mutex<Vec<SpectreConfig>>,
    }

    #[async_trait::async_trait]
    impl ReloadHandler for RecordingHandler {
        async fn on_reload(&self, config: SpectreConfig) -> anyhow::Result<()> {
            self.docs.lock().unwrap().push(config);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait::async_trait]
    impl ReloadHandler for FailingHandler {
        async fn on_reload(&self, _config: SpectreConfig) -> anyhow::Result<()> {
            anyhow::bail!("handler rejected the document")
        }
    }

    #[tokio::test]
    async fn start_fails_fast_on_missing_file() {
        let dir = TempDir::new().unwrap();
        let handler = Arc::new(RecordingHandler::default());
        let mut watcher = ConfigWatcher::new(
            dir.path().join("absent.yaml"),
            Duration::from_millis(50),
            handler,
        );
        assert!(matches!(
            watcher.start(),
            Err(ConfigError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn start_fails_fast_on_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "schema_version: v7\ninstances: []\n").unwrap();

        let handler = Arc::new(RecordingHandler::default());
        let mut watcher = ConfigWatcher::new(&path, Duration::from_millis(50), handler.clone());
        assert!(matches!(watcher.start(), Err(ConfigError::Schema { .. })));
        assert!(handler.docs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_does_not_invoke_handler_for_initial_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, VALID).unwrap();

        let handler = Arc::new(RecordingHandler::default());
        let mut watcher = ConfigWatcher::new(&path, Duration::from_millis(50), handler.clone());
        watcher.start().unwrap();
        assert!(handler.docs.lock().unwrap().is_empty());
        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let handler = Arc::new(RecordingHandler::default());
        let mut watcher = ConfigWatcher::new("config.yaml", DEFAULT_DEBOUNCE, handler);
        assert!(watcher.stop().await.is_ok());
    }

    #[tokio::test]
    async fn reload_once_delivers_valid_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, VALID).unwrap();

        let handler = RecordingHandler::default();
        reload_once(&path, &handler).await;

        let docs = handler.docs.lock().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].schema_version, SCHEMA_VERSION);
        assert_eq!(docs[0].instances[0].name, "vl");
    }

    #[tokio::test]
    async fn reload_once_absorbs_loader_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "not: [valid").unwrap();

        let handler = RecordingHandler::default();
        reload_once(&path, &handler).await;
        assert!(handler.docs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reload_once_absorbs_handler_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, VALID).unwrap();

        // Must not panic or propagate.
        reload_once(&path, &FailingHandler).await;
    }

    #[test]
    fn relevance_filter_matches_file_name_only() {
        let watch = WatchLoop {
            path: PathBuf::from("/etc/spectre/config.yaml"),
            debounce: DEFAULT_DEBOUNCE,
            handler: Arc::new(RecordingHandler::default()),
            cancel: CancellationToken::new(),
        };

        let modify = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/etc/spectre/config.yaml"));
        assert!(watch.is_relevant(&modify));

        let other_file = Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/etc/spectre/other.yaml"));
        assert!(!watch.is_relevant(&other_file));

        let access_only = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/etc/spectre/config.yaml"));
        assert!(!watch.is_relevant(&access_only));
    }

    /// End-to-end watcher test against the real filesystem. Marked
    /// `#[ignore]` because inotify/FSEvents latency makes it flaky in CI
    /// and sandboxed environments. Run manually with `--ignored`.
    #[tokio::test]
    #[ignore = "flaky on CI due to filesystem timing"]
    async fn watcher_detects_real_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, VALID).unwrap();

        let handler = Arc::new(RecordingHandler::default());
        let mut watcher = ConfigWatcher::new(&path, Duration::from_millis(100), handler.clone());
        watcher.start().unwrap();

        // Give the backend time to arm.
        tokio::time::sleep(Duration::from_secs(2)).await;
        std::fs::write(
            &path,
            "schema_version: v1\ninstances:\n  - {name: vl2, type: victorialogs}\n",
        )
        .unwrap();

        let deadline = std::time::Instant::now()
            .checked_add(Duration::from_secs(10))
            .unwrap();
        loop {
            if !handler.docs.lock().unwrap().is_empty() {
                break;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "no reload within the timeout"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let docs = handler.docs.lock().unwrap();
        assert_eq!(docs.len(), 1, "burst must collapse to one reload");
        assert_eq!(docs[0].instances[0].name, "vl2");
        drop(docs);

        watcher.stop().await.unwrap();
    }
}
