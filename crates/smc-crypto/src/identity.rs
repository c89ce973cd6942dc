//! Ed25519 identity and message signatures.
//!
//! Keys and signatures cross the host boundary as lowercase hex. A key pair
//! travels as `"<hex public>:<hex secret>"` where the secret is the 32-byte
//! Ed25519 seed. Signatures are deterministic (RFC 8032) and verification is
//! strict, so small-order and non-canonical encodings are rejected.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;
use crate::hash::fingerprint;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SECRET_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// A signing identity. The seed is wiped when the value is dropped.
pub struct Identity {
    // SigningKey zeroizes itself on drop.
    sign_key: SigningKey,
}

impl Identity {
    /// Generate a fresh identity from the operating system random source.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut seed = Zeroizing::new([0u8; SECRET_KEY_LEN]);
        getrandom::getrandom(&mut *seed)
            .map_err(|e| CryptoError::Entropy(e.to_string()))?;
        Ok(Self::from_seed(&seed))
    }

    pub fn from_seed(seed: &[u8; SECRET_KEY_LEN]) -> Self {
        Self {
            sign_key: SigningKey::from_bytes(seed),
        }
    }

    /// Decode an identity from the hex form of its seed.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, CryptoError> {
        let seed = Zeroizing::new(decode_fixed::<SECRET_KEY_LEN>(
            secret_hex.trim(),
            "secret key",
        )?);
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.sign_key.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }

    /// Seed bytes. Callers own the copy and are expected to let it zeroize.
    pub fn seed(&self) -> Zeroizing<[u8; SECRET_KEY_LEN]> {
        Zeroizing::new(self.sign_key.to_bytes())
    }

    pub fn secret_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.sign_key.to_bytes()))
    }

    /// Short printable id derived from the public key, safe for logs.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public_key())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.sign_key.sign(message).to_bytes()
    }

    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.sign(message))
    }

    pub fn key_pair(&self) -> KeyPair {
        KeyPair {
            public: self.public_key(),
            secret: self.seed(),
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Public key and seed in their wire form.
pub struct KeyPair {
    public: [u8; PUBLIC_KEY_LEN],
    secret: Zeroizing<[u8; SECRET_KEY_LEN]>,
}

impl KeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Identity::generate()?.key_pair())
    }

    /// Parse `"<hex public>:<hex secret>"`.
    ///
    /// The public half must be the one derived from the secret half.
    pub fn parse(encoded: &str) -> Result<Self, CryptoError> {
        let (public_hex, secret_hex) = encoded
            .trim()
            .split_once(':')
            .ok_or_else(|| CryptoError::MalformedKeyPair("missing ':' separator".into()))?;

        let public = decode_fixed::<PUBLIC_KEY_LEN>(public_hex, "public key")
            .map_err(|e| CryptoError::MalformedKeyPair(e.to_string()))?;
        let secret = Zeroizing::new(
            decode_fixed::<SECRET_KEY_LEN>(secret_hex, "secret key")
                .map_err(|e| CryptoError::MalformedKeyPair(e.to_string()))?,
        );

        let derived = SigningKey::from_bytes(&secret).verifying_key().to_bytes();
        if derived != public {
            return Err(CryptoError::MalformedKeyPair(
                "public key does not match secret key".into(),
            ));
        }

        Ok(Self { public, secret })
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public)
    }

    pub fn secret_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.secret[..]))
    }

    pub fn to_identity(&self) -> Identity {
        Identity::from_seed(&self.secret)
    }

    /// Wire form `"<hex public>:<hex secret>"`.
    pub fn encode(&self) -> Zeroizing<String> {
        let mut out = String::with_capacity(2 * (PUBLIC_KEY_LEN + SECRET_KEY_LEN) + 1);
        out.push_str(&self.public_key_hex());
        out.push(':');
        let mut secret = hex::encode(&self.secret[..]);
        out.push_str(&secret);
        secret.zeroize();
        Zeroizing::new(out)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Sign the UTF-8 bytes of `message` with a hex-encoded seed.
pub fn sign_message(message: &str, secret_key_hex: &str) -> Result<String, CryptoError> {
    let identity = Identity::from_secret_hex(secret_key_hex)?;
    Ok(identity.sign_hex(message.as_bytes()))
}

/// Check a hex signature over the UTF-8 bytes of `message`.
///
/// Any malformed or mismatched signature yields `Ok(false)`. Only an
/// undecodable public key is an error.
pub fn verify_signature(
    message: &str,
    signature_hex: &str,
    public_key_hex: &str,
) -> Result<bool, CryptoError> {
    let verifying_key = parse_public_key(public_key_hex)?;

    let Ok(sig_bytes) = decode_fixed::<SIGNATURE_LEN>(signature_hex.trim(), "signature") else {
        return Ok(false);
    };
    let signature = Signature::from_bytes(&sig_bytes);

    Ok(verifying_key
        .verify_strict(message.as_bytes(), &signature)
        .is_ok())
}

/// Decode a hex public key and check that it is a valid curve point.
pub fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes = decode_fixed::<PUBLIC_KEY_LEN>(public_key_hex.trim(), "public key")?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| CryptoError::MalformedKey("public key is not a valid curve point".into()))
}

/// Verify raw signature bytes against an already decoded key.
pub fn verify_with_key(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    match Signature::from_slice(signature) {
        Ok(sig) => key.verify_strict(message, &sig).is_ok(),
        Err(_) => false,
    }
}

pub(crate) fn decode_fixed<const N: usize>(
    input: &str,
    what: &str,
) -> Result<[u8; N], CryptoError> {
    let bytes = hex::decode(input)
        .map_err(|e| CryptoError::MalformedKey(format!("{what}: invalid hex: {e}")))?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        CryptoError::MalformedKey(format!(
            "{what}: expected {N} bytes, got {}",
            v.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_encodes_as_pair() {
        let pair = KeyPair::generate().unwrap();
        let encoded = pair.encode();
        let (public, secret) = encoded.split_once(':').unwrap();
        assert_eq!(public.len(), 64);
        assert_eq!(secret.len(), 64);
        assert!(encoded.chars().all(|c| c == ':' || c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_parse_round_trips_encode() {
        let pair = KeyPair::generate().unwrap();
        let parsed = KeyPair::parse(&pair.encode()).unwrap();
        assert_eq!(parsed.public_key(), pair.public_key());
    }

    #[test]
    fn test_parse_rejects_mismatched_halves() {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        let mixed = format!("{}:{}", a.public_key_hex(), b.secret_key_hex().as_str());
        assert!(matches!(
            KeyPair::parse(&mixed),
            Err(CryptoError::MalformedKeyPair(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        assert!(matches!(
            KeyPair::parse("abcdef"),
            Err(CryptoError::MalformedKeyPair(_))
        ));
    }

    #[test]
    fn test_sign_and_verify() {
        let pair = KeyPair::generate().unwrap();
        let sig = sign_message("hello", &pair.secret_key_hex()).unwrap();
        assert_eq!(sig.len(), 128);
        assert!(verify_signature("hello", &sig, &pair.public_key_hex()).unwrap());
        assert!(!verify_signature("hellp", &sig, &pair.public_key_hex()).unwrap());
    }

    #[test]
    fn test_signatures_are_deterministic() {
        let pair = KeyPair::generate().unwrap();
        let a = sign_message("same text", &pair.secret_key_hex()).unwrap();
        let b = sign_message("same text", &pair.secret_key_hex()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rfc8032_test_vector_1() {
        // RFC 8032 section 7.1, TEST 1 (empty message)
        let seed = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
        let public = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";
        let expected = "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e06522490155\
                        5fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b";

        let identity = Identity::from_secret_hex(seed).unwrap();
        assert_eq!(identity.public_key_hex(), public);
        assert_eq!(sign_message("", seed).unwrap(), expected);
        assert!(verify_signature("", expected, public).unwrap());
    }

    #[test]
    fn test_malformed_secret_key_is_error() {
        assert!(matches!(
            sign_message("x", "not-hex"),
            Err(CryptoError::MalformedKey(_))
        ));
        assert!(matches!(
            sign_message("x", "abcd"),
            Err(CryptoError::MalformedKey(_))
        ));
    }

    #[test]
    fn test_malformed_public_key_is_error() {
        assert!(matches!(
            verify_signature("x", &"00".repeat(64), "zz"),
            Err(CryptoError::MalformedKey(_))
        ));
        assert!(matches!(
            verify_signature("x", &"00".repeat(64), &"11".repeat(31)),
            Err(CryptoError::MalformedKey(_))
        ));
    }

    #[test]
    fn test_malformed_signature_is_false() {
        let pair = KeyPair::generate().unwrap();
        let public = pair.public_key_hex();
        assert!(!verify_signature("x", "", &public).unwrap());
        assert!(!verify_signature("x", "nothex", &public).unwrap());
        assert!(!verify_signature("x", &"ab".repeat(63), &public).unwrap());
        assert!(!verify_signature("x", &"00".repeat(64), &public).unwrap());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let identity = Identity::generate().unwrap();
        let secret = identity.secret_key_hex();
        let rendered = format!("{identity:?} {:?}", identity.key_pair());
        assert!(!rendered.contains(secret.as_str()));
    }

    #[test]
    fn test_verify_with_key_rejects_short_signature() {
        let identity = Identity::generate().unwrap();
        let key = parse_public_key(&identity.public_key_hex()).unwrap();
        let sig = identity.sign(b"m");
        assert!(verify_with_key(&key, b"m", &sig));
        assert!(!verify_with_key(&key, b"m", &sig[..10]));
    }
}
