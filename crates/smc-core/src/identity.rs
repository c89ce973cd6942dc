//! Process identity.
//!
//! Signers take the read lock. Installing or resetting the identity takes
//! the write lock, so a reset never lands in the middle of a signature.

use std::sync::Arc;

use parking_lot::RwLock;
use smc_crypto::{CryptoError, Identity, KeyPair};
use tracing::{info, warn};

use crate::errors::CoreError;
use crate::keystore::KeyStore;

pub struct IdentityManager {
    store: Arc<dyn KeyStore>,
    current: RwLock<Option<Identity>>,
}

impl IdentityManager {
    /// Open the store and load a persisted identity if there is one.
    pub fn open(store: Arc<dyn KeyStore>) -> Result<Self, CoreError> {
        let current = store.load()?;
        match &current {
            Some(identity) => info!(fingerprint = %identity.fingerprint(), "Loaded identity"),
            None => info!("No identity stored yet"),
        }
        Ok(Self {
            store,
            current: RwLock::new(current),
        })
    }

    pub fn has_identity(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn public_key_hex(&self) -> Option<String> {
        self.current.read().as_ref().map(Identity::public_key_hex)
    }

    /// Generate a fresh key pair.
    ///
    /// The first pair generated while no identity is loaded becomes the
    /// process identity and is persisted. Later calls return independent
    /// pairs and leave the identity untouched.
    pub fn generate_key_pair(&self) -> Result<KeyPair, CoreError> {
        let pair = KeyPair::generate()?;

        let mut current = self.current.write();
        if current.is_none() {
            let identity = pair.to_identity();
            self.store.store(&identity)?;
            info!(fingerprint = %identity.fingerprint(), "Created identity");
            *current = Some(identity);
        }
        Ok(pair)
    }

    /// Run `f` with the process identity under the read lock.
    pub fn with_identity<T>(&self, f: impl FnOnce(&Identity) -> T) -> Result<T, CoreError> {
        let guard = self.current.read();
        let identity = guard.as_ref().ok_or(CryptoError::NoIdentity)?;
        Ok(f(identity))
    }

    pub fn sign(&self, message: &[u8]) -> Result<[u8; 64], CoreError> {
        self.with_identity(|identity| identity.sign(message))
    }

    /// Drop the identity from memory and storage.
    pub fn reset_identity(&self) -> Result<bool, CoreError> {
        let mut current = self.current.write();
        self.store.delete()?;
        let had = current.take().is_some();
        if had {
            warn!("Identity reset");
        }
        Ok(had)
    }
}
