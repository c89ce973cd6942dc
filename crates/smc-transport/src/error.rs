use crate::framing::FramingError;
use smc_crypto::CryptoError;

/// Transport error type
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation timed out")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("No bridge session established")]
    NotConnected,

    #[error("Invalid bridge descriptor: {0}")]
    InvalidBridge(String),

    #[error("Transport disconnected")]
    Disconnected,
}

impl From<CryptoError> for TransportError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::MalformedKey(msg) | CryptoError::MalformedKeyPair(msg) => {
                TransportError::InvalidBridge(msg)
            }
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for TransportError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TransportError::Timeout
    }
}

impl TransportError {
    /// Whether the underlying connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Io(_)
                | TransportError::Protocol(_)
                | TransportError::Framing(_)
                | TransportError::Disconnected
        )
    }
}
