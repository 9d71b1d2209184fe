use thiserror::Error;

use crate::sync::SyncError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },
    #[error("authorization rejected")]
    Unauthorized,
    #[error("channel handshake failed: {0}")]
    Handshake(String),
    #[error("channel stream error: {0}")]
    Stream(String),
    #[error("invalid endpoint url: {0}")]
    Endpoint(String),
    #[error("payload decode failed: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error.to_string())
    }
}

impl From<TransportError> for SyncError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Unauthorized => SyncError::AuthExpired,
            TransportError::Decode(message) => SyncError::Decode(message),
            TransportError::Status { status, message } if (400..500).contains(&status) => {
                SyncError::MutationRejected(message)
            }
            other => SyncError::NetworkFailure(other.to_string()),
        }
    }
}
