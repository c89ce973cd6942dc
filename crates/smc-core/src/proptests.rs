//! Property-based tests for smc-core.

#![cfg(test)]

use chrono::Utc;
use proptest::prelude::*;
use smc_crypto::Identity;

use crate::dispatch::OutboundMessage;

fn envelope(identity: &Identity, chat_id: i64, body: &str) -> OutboundMessage {
    OutboundMessage {
        chat_id,
        seq: 0,
        body: body.to_string(),
        sender: identity.public_key_hex(),
        signature: identity.sign_hex(body.as_bytes()),
        sent_at: Utc::now(),
    }
}

proptest! {
    #[test]
    fn prop_envelope_survives_the_wire(
        seed in prop::array::uniform32(any::<u8>()),
        chat_id in any::<i64>(),
        body in ".{0,256}",
    ) {
        let identity = Identity::from_seed(&seed);
        let message = envelope(&identity, chat_id, &body);

        let decoded = OutboundMessage::from_bytes(&message.to_bytes().unwrap()).unwrap();
        prop_assert!(decoded.verify().unwrap());
        prop_assert_eq!(decoded, message);
    }

    #[test]
    fn prop_altered_body_fails_verification(
        seed in prop::array::uniform32(any::<u8>()),
        body in ".{1,128}",
        other in ".{1,128}",
    ) {
        prop_assume!(body != other);
        let identity = Identity::from_seed(&seed);
        let mut message = envelope(&identity, 1, &body);
        message.body = other;
        prop_assert!(!message.verify().unwrap());
    }
}
