//! The informer contract and an in-memory implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// SecretRef
// ---------------------------------------------------------------------------

/// Points at one key of one Kubernetes Secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    /// Secret object name.
    pub name: String,
    /// Key within the Secret's data mapping.
    pub key: String,
    /// Namespace the Secret lives in.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_owned()
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}[{}]", self.namespace, self.name, self.key)
    }
}

// SecretUpdate
// ---------------------------------------------------------------------------

/// One observation of a watched Secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretUpdate {
    /// The Secret's full decoded key/value data. Empty when absent.
    pub data: HashMap<String, String>,
    /// Whether the Secret currently exists. `false` signals a deletion.
    pub present: bool,
}

impl SecretUpdate {
    /// An update describing an absent Secret.
    #[must_use]
    pub fn absent() -> Self {
        Self {
            data: HashMap::new(),
            present: false,
        }
    }
}

// SecretError
// ---------------------------------------------------------------------------

/// Errors from the secret subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// Subscribing to the external Secret source failed.
    #[error("secret subscription failed: {0}")]
    Subscribe(String),

    /// The watcher's background task could not be joined on stop.
    #[error("secret watcher did not stop cleanly: {0}")]
    Stop(String),
}

/// Result type for secret operations.
pub type SecretResult<T> = Result<T, SecretError>;

// SecretInformer
// ---------------------------------------------------------------------------

/// Produces a stream of observations for one Secret.
///
/// Supplied by the host environment (a Kubernetes-backed implementation in
/// production, [`ChannelInformer`] in tests and local development).
///
/// # Delivery contract
///
/// If the Secret exists at subscription time, its current state is delivered
/// as the first message. Every later create, update, or delete of the Secret
/// produces a further [`SecretUpdate`]. Closing the channel signals that the
/// informer itself has failed; subscribers treat that as a degraded
/// condition, not an error.
#[async_trait]
pub trait SecretInformer: Send + Sync {
    /// Subscribe to the Secret `name` in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Subscribe`] only for infrastructure failures.
    /// An absent Secret is not an error; the stream simply starts empty.
    async fn subscribe(
        &self,
        namespace: &str,
        name: &str,
    ) -> SecretResult<mpsc::Receiver<SecretUpdate>>;
}

// ChannelInformer
// ---------------------------------------------------------------------------

/// In-memory informer for tests and local development.
///
/// Holds the current state of each Secret and fans updates out to
/// subscribers. Production deployments wire a Kubernetes-backed informer in
/// its place.
#[derive(Default)]
pub struct ChannelInformer {
    inner: Mutex<ChannelInformerState>,
}

#[derive(Default)]
struct ChannelInformerState {
    secrets: HashMap<(String, String), HashMap<String, String>>,
    subscribers: HashMap<(String, String), Vec<mpsc::Sender<SecretUpdate>>>,
}

impl ChannelInformer {
    /// Create an informer with no Secrets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a Secret and notify subscribers.
    pub async fn set_secret(
        &self,
        namespace: &str,
        name: &str,
        data: HashMap<String, String>,
    ) {
        let update = SecretUpdate {
            data: data.clone(),
            present: true,
        };
        let senders = {
            let mut state = lock(&self.inner);
            let key = (namespace.to_owned(), name.to_owned());
            state.secrets.insert(key.clone(), data);
            state
                .subscribers
                .get(&key)
                .cloned()
                .unwrap_or_default()
        };
        for tx in senders {
            let _ = tx.send(update.clone()).await;
        }
    }

    /// Delete a Secret and notify subscribers.
    pub async fn delete_secret(&self, namespace: &str, name: &str) {
        let senders = {
            let mut state = lock(&self.inner);
            let key = (namespace.to_owned(), name.to_owned());
            state.secrets.remove(&key);
            state
                .subscribers
                .get(&key)
                .cloned()
                .unwrap_or_default()
        };
        for tx in senders {
            let _ = tx.send(SecretUpdate::absent()).await;
        }
    }
}

fn lock(inner: &Mutex<ChannelInformerState>) -> std::sync::MutexGuard<'_, ChannelInformerState> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl SecretInformer for ChannelInformer {
    async fn subscribe(
        &self,
        namespace: &str,
        name: &str,
    ) -> SecretResult<mpsc::Receiver<SecretUpdate>> {
        let (tx, rx) = mpsc::channel(16);
        let initial = {
            let mut state = lock(&self.inner);
            let key = (namespace.to_owned(), name.to_owned());
            let initial = state.secrets.get(&key).cloned();
            state.subscribers.entry(key).or_default().push(tx.clone());
            initial
        };
        if let Some(data) = initial {
            let _ = tx.send(SecretUpdate { data, present: true }).await;
        }
        Ok(rx)
    }
}

impl fmt::Debug for ChannelInformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner);
        // Key names only; values never reach Debug output.
        f.debug_struct("ChannelInformer")
            .field("secret_count", &state.secrets.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[tokio::test]
    async fn subscribe_delivers_existing_state_first() {
        let informer = ChannelInformer::new();
        informer
            .set_secret("default", "creds", data(&[("api-token", "t1")]))
            .await;

        let mut rx = informer.subscribe("default", "creds").await.unwrap();
        let update = rx.recv().await.unwrap();
        assert!(update.present);
        assert_eq!(update.data.get("api-token").map(String::as_str), Some("t1"));
    }

    #[tokio::test]
    async fn subscribe_to_absent_secret_starts_empty() {
        let informer = ChannelInformer::new();
        let mut rx = informer.subscribe("default", "creds").await.unwrap();
        // Nothing buffered.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn updates_reach_subscribers() {
        let informer = ChannelInformer::new();
        let mut rx = informer.subscribe("default", "creds").await.unwrap();

        informer
            .set_secret("default", "creds", data(&[("api-token", "t1")]))
            .await;
        assert!(rx.recv().await.unwrap().present);

        informer.delete_secret("default", "creds").await;
        let gone = rx.recv().await.unwrap();
        assert!(!gone.present);
        assert!(gone.data.is_empty());
    }

    #[tokio::test]
    async fn updates_are_scoped_to_namespace_and_name() {
        let informer = ChannelInformer::new();
        let mut rx = informer.subscribe("default", "creds").await.unwrap();

        informer
            .set_secret("other", "creds", data(&[("api-token", "t1")]))
            .await;
        informer
            .set_secret("default", "unrelated", data(&[("api-token", "t1")]))
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn secret_ref_display() {
        let reference = SecretRef {
            name: "logzio-creds".into(),
            key: "api-token".into(),
            namespace: "default".into(),
        };
        assert_eq!(reference.to_string(), "default/logzio-creds[api-token]");
    }
}
