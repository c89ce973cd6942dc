//! Error types for update checks.

use thiserror::Error;

/// Errors that can occur while checking for updates.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// No signature on the manifest verified against a pinned key
    #[error("manifest signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    /// Manifest timestamp is in the future
    #[error("manifest published_at is in the future")]
    ManifestFromFuture,

    /// Manifest is well-formed JSON but not a valid release description
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// Payload hash does not match expected value
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Payload size does not match expected value
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Gateway answered with a non-success status
    #[error("fetch failed with status {status}")]
    FetchFailed { status: u16 },

    /// Retrieval hit its deadline
    #[error("fetch timed out")]
    Timeout,

    /// Network error during retrieval
    #[error("network error: {0}")]
    NetworkError(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Version parsing error
    #[error("version parse error: {0}")]
    VersionParseError(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl UpdateError {
    /// Failures to reach the distribution channel, as opposed to failures
    /// of the content it returned.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            UpdateError::FetchFailed { .. } | UpdateError::Timeout | UpdateError::NetworkError(_)
        )
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpdateError::Timeout
        } else {
            UpdateError::NetworkError(err.to_string())
        }
    }
}

impl From<semver::Error> for UpdateError {
    fn from(err: semver::Error) -> Self {
        UpdateError::VersionParseError(err.to_string())
    }
}
