//! Signed release manifests.
//!
//! The envelope carries the release description as a JSON string plus one or
//! more Ed25519 signatures over the exact bytes of that string. Nothing inside
//! the string is looked at until a signature verifies against a pinned key.

use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::UpdateError;

/// Maximum future timestamp tolerance (1 hour).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60 * 60;

/// Verifies manifest signatures against pinned publisher keys.
pub struct ManifestVerifier {
    /// Multiple keys allow publisher key rotation
    trusted_keys: Vec<VerifyingKey>,
}

impl ManifestVerifier {
    /// A verifier with no keys rejects every manifest.
    pub fn new(trusted_keys: Vec<VerifyingKey>) -> Self {
        Self { trusted_keys }
    }

    pub fn trusted_keys(&self) -> &[VerifyingKey] {
        &self.trusted_keys
    }

    /// Verify the envelope and parse the release it describes.
    ///
    /// Order: parse envelope, verify signature, parse candidate, reject
    /// timestamps more than an hour ahead of `now`.
    pub fn verify_and_parse(
        &self,
        data: &[u8],
        now: DateTime<Utc>,
    ) -> Result<UpdateCandidate, UpdateError> {
        let signed: SignedManifest = serde_json::from_slice(data)?;

        let Some(key_id) = self.find_valid_signature(&signed) else {
            tracing::warn!(
                signatures = signed.signatures.len(),
                trusted_keys = self.trusted_keys.len(),
                "No manifest signature matches a pinned key"
            );
            return Err(UpdateError::SignatureVerificationFailed(
                "no valid signature from a pinned key".into(),
            ));
        };
        tracing::debug!(key_id = %key_id, "Manifest signature verified");

        let candidate: UpdateCandidate = serde_json::from_str(&signed.manifest)?;
        candidate.validate()?;

        if candidate.published_at > now + Duration::seconds(MAX_FUTURE_TOLERANCE_SECS) {
            tracing::error!(
                published_at = %candidate.published_at,
                now = %now,
                tolerance_secs = MAX_FUTURE_TOLERANCE_SECS,
                "Manifest timestamp is in the future"
            );
            return Err(UpdateError::ManifestFromFuture);
        }

        Ok(candidate)
    }

    /// Key id of the first signature that verifies against any pinned key.
    fn find_valid_signature<'a>(&self, signed: &'a SignedManifest) -> Option<&'a str> {
        let manifest_bytes = signed.manifest.as_bytes();

        signed.signatures.iter().find_map(|sig| {
            let bytes = hex::decode(sig.signature.trim()).ok()?;
            let signature = Signature::from_slice(&bytes).ok()?;
            self.trusted_keys
                .iter()
                .any(|key| key.verify_strict(manifest_bytes, &signature).is_ok())
                .then_some(sig.key_id.as_str())
        })
    }
}

/// A manifest string with its signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedManifest {
    /// JSON string of [`UpdateCandidate`]
    pub manifest: String,
    pub signatures: Vec<ManifestSignature>,
}

/// A signature on the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSignature {
    /// Identifier for the signing key
    pub key_id: String,
    /// Ed25519 signature, hex encoded
    pub signature: String,
}

/// A release that passed signature verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCandidate {
    /// Version as written by the publisher
    pub version: String,
    /// Content id of the package on the distribution channel
    pub content_id: String,
    pub payload_size: u64,
    /// SHA-256 of the package (hex encoded)
    pub payload_sha256: String,
    #[serde(default)]
    pub release_notes: String,
    pub published_at: DateTime<Utc>,
    /// Oldest running version that may apply this release directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
}

impl UpdateCandidate {
    fn validate(&self) -> Result<(), UpdateError> {
        if self.content_id.trim().is_empty() {
            return Err(UpdateError::MalformedManifest("empty content_id".into()));
        }
        if self.payload_hash_bytes().is_none() {
            return Err(UpdateError::MalformedManifest(
                "payload_sha256 is not 32 hex-encoded bytes".into(),
            ));
        }
        Ok(())
    }

    pub fn payload_hash_bytes(&self) -> Option<[u8; 32]> {
        let bytes = hex::decode(self.payload_sha256.trim()).ok()?;
        bytes.try_into().ok()
    }

    /// Check a downloaded package against the signed size and hash.
    pub fn verify_payload(&self, payload: &[u8]) -> Result<(), UpdateError> {
        let actual_size = payload.len() as u64;
        if actual_size != self.payload_size {
            return Err(UpdateError::SizeMismatch {
                expected: self.payload_size,
                actual: actual_size,
            });
        }

        let expected = self.payload_hash_bytes().ok_or_else(|| {
            UpdateError::MalformedManifest("payload_sha256 is not valid hex".into())
        })?;
        let actual: [u8; 32] = Sha256::digest(payload).into();

        if !bool::from(actual[..].ct_eq(&expected[..])) {
            return Err(UpdateError::HashMismatch {
                expected: hex::encode(expected),
                actual: hex::encode(actual),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, UpdateError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_candidate, sign_manifest, test_signing_key};

    fn verifier() -> ManifestVerifier {
        ManifestVerifier::new(vec![test_signing_key(1).verifying_key()])
    }

    #[test]
    fn test_valid_manifest_parses() {
        let candidate = sample_candidate("2.0.0", Utc::now());
        let data = sign_manifest(&candidate, &[&test_signing_key(1)]).unwrap();
        let parsed = verifier().verify_and_parse(&data, Utc::now()).unwrap();
        assert_eq!(parsed, candidate);
    }

    #[test]
    fn test_second_signature_can_match() {
        let candidate = sample_candidate("2.0.0", Utc::now());
        let data = sign_manifest(&candidate, &[&test_signing_key(9), &test_signing_key(1)]).unwrap();
        assert!(verifier().verify_and_parse(&data, Utc::now()).is_ok());
    }

    #[test]
    fn test_untrusted_key_rejected() {
        let candidate = sample_candidate("2.0.0", Utc::now());
        let data = sign_manifest(&candidate, &[&test_signing_key(2)]).unwrap();
        assert!(matches!(
            verifier().verify_and_parse(&data, Utc::now()),
            Err(UpdateError::SignatureVerificationFailed(_))
        ));
    }

    #[test]
    fn test_no_pinned_keys_rejects_everything() {
        let candidate = sample_candidate("2.0.0", Utc::now());
        let data = sign_manifest(&candidate, &[&test_signing_key(1)]).unwrap();
        assert!(ManifestVerifier::new(vec![])
            .verify_and_parse(&data, Utc::now())
            .is_err());
    }

    #[test]
    fn test_tampered_manifest_rejected() {
        let candidate = sample_candidate("2.0.0", Utc::now());
        let data = sign_manifest(&candidate, &[&test_signing_key(1)]).unwrap();
        let mut signed: SignedManifest = serde_json::from_slice(&data).unwrap();
        signed.manifest = signed.manifest.replace("2.0.0", "99.0.0");
        let tampered = serde_json::to_vec(&signed).unwrap();

        assert!(matches!(
            verifier().verify_and_parse(&tampered, Utc::now()),
            Err(UpdateError::SignatureVerificationFailed(_))
        ));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let candidate = sample_candidate("2.0.0", Utc::now());
        let signed = SignedManifest {
            manifest: serde_json::to_string(&candidate).unwrap(),
            signatures: vec![ManifestSignature {
                key_id: "publisher".into(),
                signature: "not hex at all".into(),
            }],
        };
        let data = serde_json::to_vec(&signed).unwrap();
        assert!(verifier().verify_and_parse(&data, Utc::now()).is_err());
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let now = Utc::now();
        let candidate = sample_candidate("2.0.0", now + Duration::hours(2));
        let data = sign_manifest(&candidate, &[&test_signing_key(1)]).unwrap();
        assert!(matches!(
            verifier().verify_and_parse(&data, now),
            Err(UpdateError::ManifestFromFuture)
        ));

        let skewed = sample_candidate("2.0.0", now + Duration::minutes(30));
        let data = sign_manifest(&skewed, &[&test_signing_key(1)]).unwrap();
        assert!(verifier().verify_and_parse(&data, now).is_ok());
    }

    #[test]
    fn test_signed_but_malformed_candidate_rejected() {
        let key = test_signing_key(1);
        let manifest = r#"{"version":"2.0.0"}"#.to_string();
        let data = crate::testing::sign_raw_manifest(manifest, &[&key]).unwrap();
        assert!(matches!(
            verifier().verify_and_parse(&data, Utc::now()),
            Err(UpdateError::JsonError(_))
        ));
    }

    #[test]
    fn test_verify_payload() {
        let payload = b"package bytes";
        let mut candidate = sample_candidate("2.0.0", Utc::now());
        candidate.payload_size = payload.len() as u64;
        candidate.payload_sha256 = hex::encode(Sha256::digest(payload));

        assert!(candidate.verify_payload(payload).is_ok());
        assert!(matches!(
            candidate.verify_payload(b"package bytez"),
            Err(UpdateError::HashMismatch { .. })
        ));
        assert!(matches!(
            candidate.verify_payload(b"short"),
            Err(UpdateError::SizeMismatch { .. })
        ));
    }
}
