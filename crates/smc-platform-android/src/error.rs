//! Error types for the host boundary

use smc_core::CoreError;
use smc_crypto::CryptoError;
use thiserror::Error;

/// Errors the host sees as exceptions
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// Caller passed malformed key material
    #[error("{0}")]
    InvalidInput(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Core is not initialized")]
    NotInitialized,

    #[error("Initialization failed: {0}")]
    Init(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BoundaryError {
    /// Java exception class thrown for this error
    pub fn java_class(&self) -> &'static str {
        match self {
            BoundaryError::InvalidInput(_) => "java/lang/IllegalArgumentException",
            BoundaryError::NotInitialized => "java/lang/IllegalStateException",
            BoundaryError::Crypto(_) | BoundaryError::Init(_) | BoundaryError::Internal(_) => {
                "java/lang/RuntimeException"
            }
        }
    }
}

impl From<CryptoError> for BoundaryError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::MalformedKey(_) | CryptoError::MalformedKeyPair(_) => {
                BoundaryError::InvalidInput(e.to_string())
            }
            other => BoundaryError::Crypto(other.to_string()),
        }
    }
}

impl From<CoreError> for BoundaryError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Crypto(e) => e.into(),
            CoreError::Config(msg) => BoundaryError::Init(msg),
            other => BoundaryError::Internal(other.to_string()),
        }
    }
}
