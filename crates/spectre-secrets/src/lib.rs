//! Hot-reloadable credentials from Kubernetes Secrets.
//!
//! Connectors that authenticate against their backend own a
//! [`SecretWatcher`]: it subscribes to an externally supplied
//! [`SecretInformer`], keeps the latest value of one Secret key in memory,
//! and exposes a non-blocking accessor plus a health flag. Credential
//! rotation reaches the next request without restarting the owning
//! connector; a missing Secret demotes the connector to degraded instead of
//! failing it.
//!
//! The Kubernetes client itself lives outside this crate; the host
//! environment supplies the informer.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod informer;
pub mod watcher;

pub use informer::{ChannelInformer, SecretError, SecretInformer, SecretRef, SecretResult, SecretUpdate};
pub use watcher::SecretWatcher;
