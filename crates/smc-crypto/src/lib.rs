#![forbid(unsafe_code)]

pub mod error;
pub mod hash;
pub mod identity;
pub mod session_crypto;
pub mod utils;

#[cfg(test)]
mod proptests;

pub use error::CryptoError;
pub use identity::{
    parse_public_key, sign_message, verify_signature, verify_with_key, Identity, KeyPair,
};
