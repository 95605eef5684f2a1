//! The secret watcher.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use spectre_core::Health;

use crate::informer::{SecretError, SecretInformer, SecretRef, SecretResult, SecretUpdate};

/// Bounded wait for the consumer task on stop.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Maintains the current value of one Secret key, refreshed whenever the
/// Secret changes.
///
/// Owned by the connector it serves: each credentialed connector runs its own
/// watcher, so instances degrade independently when their Secrets go missing.
/// The request path reads the value through [`get_token`](Self::get_token),
/// which only takes a lock long enough to clone the string.
pub struct SecretWatcher {
    reference: SecretRef,
    informer: Arc<dyn SecretInformer>,
    value: Arc<RwLock<Option<String>>>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SecretWatcher {
    /// Create a watcher for `reference`, fed by the given informer.
    #[must_use]
    pub fn new(reference: SecretRef, informer: Arc<dyn SecretInformer>) -> Self {
        Self {
            reference,
            informer,
            value: Arc::new(RwLock::new(None)),
            task: Mutex::new(None),
        }
    }

    /// Subscribe to the Secret and begin tracking its value.
    ///
    /// Idempotent: a second call while running is a no-op. An absent Secret
    /// is not a failure; the watcher starts in a pending state and reports
    /// `Degraded` until the Secret (and key) appear.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Subscribe`] if the informer subscription
    /// itself fails.
    pub async fn start(&self) -> SecretResult<()> {
        {
            let guard = lock_task(&self.task);
            if guard.is_some() {
                return Ok(());
            }
        }

        let mut rx = self
            .informer
            .subscribe(&self.reference.namespace, &self.reference.name)
            .await?;

        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let reference = self.reference.clone();
        let value = Arc::clone(&self.value);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = loop_cancel.cancelled() => {
                        debug!(secret = %reference, "secret watcher cancelled");
                        break;
                    }
                    update = rx.recv() => {
                        match update {
                            Some(update) => apply_update(&reference, &value, &update),
                            None => {
                                warn!(secret = %reference, "secret informer stream closed");
                                set_value(&value, None);
                                break;
                            }
                        }
                    }
                }
            }
        });

        let mut guard = lock_task(&self.task);
        *guard = Some((cancel, handle));
        Ok(())
    }

    /// The latest observed value of the watched key. Non-blocking; `None`
    /// while the Secret or key is absent.
    #[must_use]
    pub fn get_token(&self) -> Option<String> {
        match self.value.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// `Healthy` iff the Secret exists and the key is present.
    #[must_use]
    pub fn health(&self) -> Health {
        if self.get_token().is_some() {
            Health::Healthy
        } else {
            Health::Degraded
        }
    }

    /// Unsubscribe and discard the held value.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Stop`] if the consumer task does not finish
    /// within its bounded timeout.
    pub async fn stop(&self) -> SecretResult<()> {
        let task = lock_task(&self.task).take();
        if let Some((cancel, handle)) = task {
            cancel.cancel();
            let join = tokio::time::timeout(STOP_TIMEOUT, handle).await;
            set_value(&self.value, None);
            match join {
                Ok(_) => {},
                Err(_) => {
                    return Err(SecretError::Stop(format!(
                        "consumer for {} still running after {STOP_TIMEOUT:?}",
                        self.reference
                    )));
                },
            }
        }
        Ok(())
    }

    /// The reference this watcher tracks.
    #[must_use]
    pub fn reference(&self) -> &SecretRef {
        &self.reference
    }
}

/// Debug deliberately reports only whether a value is held, never the
/// credential itself.
impl fmt::Debug for SecretWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretWatcher")
            .field("reference", &self.reference)
            .field("has_value", &self.get_token().is_some())
            .finish_non_exhaustive()
    }
}

fn lock_task(
    task: &Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
) -> std::sync::MutexGuard<'_, Option<(CancellationToken, JoinHandle<()>)>> {
    match task.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn set_value(value: &RwLock<Option<String>>, new: Option<String>) {
    match value.write() {
        Ok(mut guard) => *guard = new,
        Err(poisoned) => *poisoned.into_inner() = new,
    }
}

/// Fold one informer observation into the held value, logging transitions.
fn apply_update(reference: &SecretRef, value: &RwLock<Option<String>>, update: &SecretUpdate) {
    let next = if update.present {
        update.data.get(&reference.key).cloned()
    } else {
        None
    };

    let had_value = match value.read() {
        Ok(guard) => guard.is_some(),
        Err(poisoned) => poisoned.into_inner().is_some(),
    };

    match (&next, had_value, update.present) {
        (Some(_), false, _) => info!(secret = %reference, "credential available"),
        (None, true, false) => warn!(secret = %reference, "secret deleted, entering degraded state"),
        (None, true, true) => warn!(secret = %reference, "key missing from secret, entering degraded state"),
        (Some(_), true, _) => debug!(secret = %reference, "credential rotated"),
        (None, false, _) => debug!(secret = %reference, "secret still absent"),
    }

    set_value(value, next);
}
