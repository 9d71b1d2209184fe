//! Error taxonomy for the synchronization core.

use thiserror::Error;

/// Errors surfaced by the cache core and its boundary layers.
///
/// `Clone` is required because a single fetch outcome fans out to every
/// deduplicated waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The query key was malformed and rejected at the boundary.
    #[error("invalid query key: {0}")]
    InvalidKey(String),
    /// Transport-level failure; the message is shown to the end user.
    #[error("network failure: {0}")]
    NetworkFailure(String),
    /// The credential could not be refreshed; the session must re-login.
    #[error("authorization expired")]
    AuthExpired,
    /// The server rejected an optimistic mutation; the cache was rolled back.
    #[error("mutation rejected: {0}")]
    MutationRejected(String),
    /// A protected operation was attempted without a stored credential.
    #[error("no credential available")]
    CredentialMissing,
    /// A cached payload could not be decoded into its typed form.
    #[error("payload decode failed: {0}")]
    Decode(String),
}

impl SyncError {
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkFailure(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::MutationRejected(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
