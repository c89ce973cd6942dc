use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

/// HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Short fingerprint of a public key for log fields.
pub fn fingerprint(pubkey_bytes: &[u8]) -> String {
    hex::encode(&sha256(pubkey_bytes)[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hmac_parts_equal_concatenation() {
        let key = b"bridge-key";
        assert_eq!(
            hmac_sha256(key, &[b"hello ", b"world"]),
            hmac_sha256(key, &[b"hello world"])
        );
    }

    #[test]
    fn test_fingerprint_is_16_hex_chars() {
        assert_eq!(fingerprint(&[7u8; 32]).len(), 16);
    }
}
