//! Helpers for producing signed manifests in tests.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey};

use crate::error::UpdateError;
use crate::manifest::{ManifestSignature, SignedManifest, UpdateCandidate};

/// Deterministic publisher key derived from `seed_byte`.
pub fn test_signing_key(seed_byte: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed_byte; 32])
}

/// `ed25519:<hex>` config form of a key's public half.
pub fn publisher_key_string(key: &SigningKey) -> String {
    format!("ed25519:{}", hex::encode(key.verifying_key().to_bytes()))
}

pub fn sample_candidate(version: &str, published_at: DateTime<Utc>) -> UpdateCandidate {
    UpdateCandidate {
        version: version.to_string(),
        content_id: "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi".to_string(),
        payload_size: 1024,
        payload_sha256: "ab".repeat(32),
        release_notes: "Bug fixes".to_string(),
        published_at,
        min_version: None,
    }
}

/// Serialize `candidate` and sign it with every key in `keys`.
pub fn sign_manifest(
    candidate: &UpdateCandidate,
    keys: &[&SigningKey],
) -> Result<Vec<u8>, UpdateError> {
    sign_raw_manifest(serde_json::to_string(candidate)?, keys)
}

/// Sign an arbitrary manifest string.
pub fn sign_raw_manifest(manifest: String, keys: &[&SigningKey]) -> Result<Vec<u8>, UpdateError> {
    let signatures = keys
        .iter()
        .enumerate()
        .map(|(i, key)| ManifestSignature {
            key_id: format!("publisher-{i}"),
            signature: hex::encode(key.sign(manifest.as_bytes()).to_bytes()),
        })
        .collect();

    Ok(serde_json::to_vec(&SignedManifest {
        manifest,
        signatures,
    })?)
}
