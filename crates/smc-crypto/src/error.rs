//! Error type for cryptographic operations.

use thiserror::Error;

/// Errors raised by key handling and signing.
///
/// A failed signature check is not an error: verification reports `false`.
/// Only malformed key material and entropy failures surface here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key encoding could not be decoded into a valid key
    #[error("malformed key: {0}")]
    MalformedKey(String),

    /// A `<public>:<secret>` pair was not well-formed or its halves disagree
    #[error("malformed key pair: {0}")]
    MalformedKeyPair(String),

    /// The operating system random source failed
    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    /// No process identity has been generated or loaded
    #[error("no identity loaded")]
    NoIdentity,

    /// AEAD or KDF failure inside the session key schedule
    #[error("session crypto failure: {0}")]
    Session(&'static str),
}
