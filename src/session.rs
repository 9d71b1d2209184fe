//! Credential storage.
//!
//! A single persisted slot holding the current access credential and the
//! authenticated role. Consumers observe changes through a `watch` channel;
//! the push listener in particular ties channel lifecycles to it.

use std::path::PathBuf;

use prenota_api_types::{Credential, Role};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Persisted credential slot with change fan-out.
pub struct CredentialStore {
    path: Option<PathBuf>,
    tx: watch::Sender<Option<Credential>>,
}

impl CredentialStore {
    /// In-memory store; nothing survives the process.
    pub fn in_memory() -> Self {
        let (tx, _) = watch::channel(None);
        Self { path: None, tx }
    }

    /// Store backed by a JSON file. A readable slot file seeds the session;
    /// a missing or corrupt file starts the session logged out.
    pub async fn load(path: PathBuf) -> Self {
        let initial = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Credential>(&bytes) {
                Ok(credential) => {
                    debug!(path = %path.display(), "credential slot restored");
                    Some(credential)
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "credential slot unreadable, ignoring");
                    None
                }
            },
            Err(_) => None,
        };
        let (tx, _) = watch::channel(initial);
        Self { path: Some(path), tx }
    }

    /// The current credential, if any.
    pub fn current(&self) -> Option<Credential> {
        self.tx.borrow().clone()
    }

    pub fn role(&self) -> Option<Role> {
        self.tx.borrow().as_ref().map(|c| c.role)
    }

    /// Observe credential changes (login, rotation, logout).
    pub fn watch(&self) -> watch::Receiver<Option<Credential>> {
        self.tx.subscribe()
    }

    /// Install a credential and persist it.
    ///
    /// Persistence failures are logged, never fatal: the in-memory session
    /// stays authenticated.
    pub async fn set(&self, credential: Credential) {
        self.tx.send_replace(Some(credential.clone()));
        if let Some(path) = &self.path {
            match serde_json::to_vec_pretty(&credential) {
                Ok(bytes) => {
                    if let Err(error) = tokio::fs::write(path, bytes).await {
                        warn!(path = %path.display(), %error, "credential slot not persisted");
                    }
                }
                Err(error) => warn!(%error, "credential serialization failed"),
            }
        }
    }

    /// Drop the credential and remove the persisted slot.
    pub async fn clear(&self) {
        self.tx.send_replace(None);
        if let Some(path) = &self.path
            && let Err(error) = tokio::fs::remove_file(path).await
            && error.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), %error, "credential slot not removed");
        }
    }
}
