//! Error types for the messenger core.
//!
//! Every crate below this one has its own error enum. `CoreError` is the
//! taxonomy the host boundary sees: crypto input problems are kept distinct,
//! everything that went wrong on the wire is flattened to a message.

use smc_crypto::CryptoError;
use smc_transport::TransportError;
use smc_updater::UpdateError;
use thiserror::Error;

// ============================================================================
// Core Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed key material, missing identity, or entropy failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Connectivity failure (no session, timeout, reset)
    #[error("network error: {0}")]
    Network(String),

    /// Peer or content violated the expected protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Signed content did not verify against a trusted key
    #[error("verification failed: {0}")]
    VerificationFailure(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Key store could not be read or written
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Errors caused by caller-supplied input rather than the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CoreError::Crypto(CryptoError::MalformedKey(_) | CryptoError::MalformedKeyPair(_))
        )
    }
}

impl From<TransportError> for CoreError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Protocol(msg) => CoreError::Protocol(msg),
            TransportError::Framing(e) => CoreError::Protocol(e.to_string()),
            TransportError::InvalidBridge(msg) => {
                CoreError::Crypto(CryptoError::MalformedKey(msg))
            }
            other => CoreError::Network(other.to_string()),
        }
    }
}

impl From<UpdateError> for CoreError {
    fn from(e: UpdateError) -> Self {
        match e {
            UpdateError::SignatureVerificationFailed(msg) => CoreError::VerificationFailure(msg),
            UpdateError::ManifestFromFuture
            | UpdateError::HashMismatch { .. }
            | UpdateError::SizeMismatch { .. } => CoreError::VerificationFailure(e.to_string()),
            UpdateError::ConfigError(msg) => CoreError::Config(msg),
            e if e.is_fetch_failure() => CoreError::Network(e.to_string()),
            other => CoreError::Protocol(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
