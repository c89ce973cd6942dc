//! Property-based tests for signing and verification.

#![cfg(test)]

use proptest::prelude::*;

use crate::identity::{sign_message, verify_signature, Identity, KeyPair};

// ============================================================================
// Generators
// ============================================================================

fn arb_seed() -> impl Strategy<Value = [u8; 32]> {
    prop::array::uniform32(any::<u8>())
}

fn arb_message() -> impl Strategy<Value = String> {
    prop::string::string_regex(".{0,256}").unwrap()
}

// ============================================================================
// Round trip
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_sign_verify_round_trip(seed in arb_seed(), message in arb_message()) {
        let identity = Identity::from_seed(&seed);
        let sig = sign_message(&message, &identity.secret_key_hex()).unwrap();
        prop_assert!(verify_signature(&message, &sig, &identity.public_key_hex()).unwrap());
    }

    #[test]
    fn prop_key_pair_encoding_round_trip(seed in arb_seed()) {
        let pair = Identity::from_seed(&seed).key_pair();
        let parsed = KeyPair::parse(&pair.encode()).unwrap();
        prop_assert_eq!(parsed.public_key(), pair.public_key());
        let (parsed_secret, pair_secret) = (parsed.secret_key_hex(), pair.secret_key_hex());
        prop_assert_eq!(parsed_secret.as_str(), pair_secret.as_str());
    }
}

// ============================================================================
// No false positives
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_foreign_key_rejected(
        seed_a in arb_seed(),
        seed_b in arb_seed(),
        message in arb_message(),
    ) {
        prop_assume!(seed_a != seed_b);
        let signer = Identity::from_seed(&seed_a);
        let other = Identity::from_seed(&seed_b);
        let sig = signer.sign_hex(message.as_bytes());
        prop_assert!(!verify_signature(&message, &sig, &other.public_key_hex()).unwrap());
    }

    #[test]
    fn prop_mutated_signature_rejected(
        seed in arb_seed(),
        message in arb_message(),
        index in 0usize..64,
        flip in 1u8..=255,
    ) {
        let identity = Identity::from_seed(&seed);
        let mut sig = identity.sign(message.as_bytes());
        sig[index] ^= flip;
        let sig_hex = hex::encode(sig);
        prop_assert!(!verify_signature(&message, &sig_hex, &identity.public_key_hex()).unwrap());
    }

    #[test]
    fn prop_mutated_message_rejected(
        seed in arb_seed(),
        message in arb_message(),
        suffix in "[a-z]{1,8}",
    ) {
        let identity = Identity::from_seed(&seed);
        let sig = identity.sign_hex(message.as_bytes());
        let tampered = format!("{message}{suffix}");
        prop_assert!(!verify_signature(&tampered, &sig, &identity.public_key_hex()).unwrap());
    }

    #[test]
    fn prop_arbitrary_signature_text_never_panics(
        seed in arb_seed(),
        garbage in ".{0,200}",
    ) {
        let identity = Identity::from_seed(&seed);
        let result = verify_signature("m", &garbage, &identity.public_key_hex());
        prop_assert_eq!(result, Ok(false));
    }
}
