//! Property-based tests for smc-updater.
//!
//! # Properties Tested
//!
//! - Manifests verify only against the key that signed them
//! - Any change to the signed string breaks verification
//! - Short versions order the same as their padded form
//! - Payload checks accept exactly the signed bytes

#![cfg(test)]

use chrono::Utc;
use ed25519_dalek::SigningKey;
use proptest::prelude::*;
use semver::Version;
use sha2::{Digest, Sha256};

use crate::manifest::{ManifestVerifier, SignedManifest};
use crate::testing::{sample_candidate, sign_manifest};
use crate::version::parse_lenient;

// =============================================================================
// Generators
// =============================================================================

fn arb_signing_key() -> impl Strategy<Value = SigningKey> {
    prop::array::uniform32(any::<u8>()).prop_map(|bytes| SigningKey::from_bytes(&bytes))
}

fn arb_version() -> impl Strategy<Value = Version> {
    (0u64..100, 0u64..100, 0u64..100)
        .prop_map(|(major, minor, patch)| Version::new(major, minor, patch))
}

fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..4096)
}

// =============================================================================
// Manifest signatures
// =============================================================================

proptest! {
    #[test]
    fn prop_manifest_verifies_with_signing_key(
        key in arb_signing_key(),
        version in arb_version(),
    ) {
        let candidate = sample_candidate(&version.to_string(), Utc::now());
        let data = sign_manifest(&candidate, &[&key]).unwrap();

        let verifier = ManifestVerifier::new(vec![key.verifying_key()]);
        let parsed = verifier.verify_and_parse(&data, Utc::now()).unwrap();
        prop_assert_eq!(parsed, candidate);
    }

    #[test]
    fn prop_manifest_rejected_by_other_key(
        signer in arb_signing_key(),
        pinned in arb_signing_key(),
    ) {
        prop_assume!(signer.to_bytes() != pinned.to_bytes());

        let candidate = sample_candidate("2.0.0", Utc::now());
        let data = sign_manifest(&candidate, &[&signer]).unwrap();

        let verifier = ManifestVerifier::new(vec![pinned.verifying_key()]);
        prop_assert!(verifier.verify_and_parse(&data, Utc::now()).is_err());
    }

    #[test]
    fn prop_tampered_manifest_rejected(
        key in arb_signing_key(),
        index in any::<prop::sample::Index>(),
        replacement in b'a'..=b'z',
    ) {
        let candidate = sample_candidate("2.0.0", Utc::now());
        let data = sign_manifest(&candidate, &[&key]).unwrap();
        let mut signed: SignedManifest = serde_json::from_slice(&data).unwrap();

        let mut bytes = signed.manifest.into_bytes();
        let at = index.index(bytes.len());
        prop_assume!(bytes[at] != replacement);
        bytes[at] = replacement;
        signed.manifest = String::from_utf8(bytes).unwrap();

        let tampered = serde_json::to_vec(&signed).unwrap();
        let verifier = ManifestVerifier::new(vec![key.verifying_key()]);
        prop_assert!(verifier.verify_and_parse(&tampered, Utc::now()).is_err());
    }
}

// =============================================================================
// Versions and payloads
// =============================================================================

proptest! {
    #[test]
    fn prop_short_versions_order_like_padded(
        a in (0u64..50, 0u64..50),
        b in (0u64..50, 0u64..50),
    ) {
        let short_a = parse_lenient(&format!("{}.{}", a.0, a.1)).unwrap();
        let short_b = parse_lenient(&format!("{}.{}", b.0, b.1)).unwrap();
        prop_assert_eq!(short_a.cmp(&short_b), Version::new(a.0, a.1, 0).cmp(&Version::new(b.0, b.1, 0)));
    }

    #[test]
    fn prop_payload_check_accepts_only_signed_bytes(
        payload in arb_payload(),
        flip in any::<prop::sample::Index>(),
    ) {
        let mut candidate = sample_candidate("2.0.0", Utc::now());
        candidate.payload_size = payload.len() as u64;
        candidate.payload_sha256 = hex::encode(Sha256::digest(&payload));
        prop_assert!(candidate.verify_payload(&payload).is_ok());

        let mut corrupted = payload.clone();
        let at = flip.index(corrupted.len());
        corrupted[at] ^= 0x01;
        prop_assert!(candidate.verify_payload(&corrupted).is_err());
    }
}
