//! Key schedule and frame AEAD for the obfuscated bridge session.
//!
//! Both sides run X25519 twice: once against the peer's ephemeral key and
//! once against the bridge's long-term key. The two shared secrets feed
//! HKDF-SHA256 (salt = bridge public key), which yields a handshake
//! authentication key plus one ChaCha20-Poly1305 key per direction.
//! Frame nonces are implicit per-direction counters and never travel.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;
use crate::hash::hmac_sha256;
use crate::utils::constant_time_compare;

pub const X25519_KEY_LEN: usize = 32;
pub const CLIENT_MAC_LEN: usize = 16;
pub const SERVER_AUTH_LEN: usize = 32;
pub const AEAD_TAG_LEN: usize = 16;

const KDF_INFO: &[u8] = b"smc-obfs4 v1";
const SERVER_AUTH_LABEL: &[u8] = b"smc-obfs4 server";

/// Which end of the session a cipher pair belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Bridge,
}

/// An X25519 key pair. Used for the client ephemeral, the bridge ephemeral,
/// and the bridge's long-term identity.
pub struct KexKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KexKeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = Zeroizing::new([0u8; X25519_KEY_LEN]);
        getrandom::getrandom(&mut *bytes).map_err(|e| CryptoError::Entropy(e.to_string()))?;
        Ok(Self::from_secret_bytes(*bytes))
    }

    pub fn from_secret_bytes(bytes: [u8; X25519_KEY_LEN]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; X25519_KEY_LEN] {
        self.public.to_bytes()
    }

    fn dh(&self, peer: &[u8; X25519_KEY_LEN]) -> Zeroizing<[u8; 32]> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*peer));
        Zeroizing::new(shared.to_bytes())
    }
}

/// Keys derived from one handshake.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    auth: [u8; 32],
    c2s: [u8; 32],
    s2c: [u8; 32],
}

impl SessionKeys {
    fn derive(
        ephemeral_dh: &[u8; 32],
        static_dh: &[u8; 32],
        bridge_public: &[u8; X25519_KEY_LEN],
    ) -> Result<Self, CryptoError> {
        let mut ikm = Zeroizing::new([0u8; 64]);
        ikm[..32].copy_from_slice(ephemeral_dh);
        ikm[32..].copy_from_slice(static_dh);

        let hk = Hkdf::<Sha256>::new(Some(&bridge_public[..]), ikm.as_slice());
        let mut okm = Zeroizing::new([0u8; 96]);
        hk.expand(KDF_INFO, okm.as_mut_slice())
            .map_err(|_| CryptoError::Session("hkdf output length"))?;

        let mut keys = Self {
            auth: [0u8; 32],
            c2s: [0u8; 32],
            s2c: [0u8; 32],
        };
        keys.auth.copy_from_slice(&okm[..32]);
        keys.c2s.copy_from_slice(&okm[32..64]);
        keys.s2c.copy_from_slice(&okm[64..]);
        Ok(keys)
    }

    /// Client side: `x` is the client ephemeral, `server_ephemeral` is `Y`.
    pub fn for_client(
        client_ephemeral: &KexKeyPair,
        server_ephemeral: &[u8; X25519_KEY_LEN],
        bridge_public: &[u8; X25519_KEY_LEN],
    ) -> Result<Self, CryptoError> {
        let ee = client_ephemeral.dh(server_ephemeral);
        let es = client_ephemeral.dh(bridge_public);
        Self::derive(&ee, &es, bridge_public)
    }

    /// Bridge side: mirrors [`SessionKeys::for_client`].
    pub fn for_bridge(
        bridge_ephemeral: &KexKeyPair,
        bridge_identity: &KexKeyPair,
        client_ephemeral: &[u8; X25519_KEY_LEN],
    ) -> Result<Self, CryptoError> {
        let ee = bridge_ephemeral.dh(client_ephemeral);
        let es = bridge_identity.dh(client_ephemeral);
        Self::derive(&ee, &es, &bridge_identity.public_bytes())
    }

    /// `HMAC(K_auth, label || X || Y)` sent by the bridge.
    pub fn server_auth(
        &self,
        client_ephemeral: &[u8; X25519_KEY_LEN],
        server_ephemeral: &[u8; X25519_KEY_LEN],
    ) -> [u8; SERVER_AUTH_LEN] {
        hmac_sha256(
            &self.auth,
            &[SERVER_AUTH_LABEL, &client_ephemeral[..], &server_ephemeral[..]],
        )
    }

    pub fn verify_server_auth(
        &self,
        client_ephemeral: &[u8; X25519_KEY_LEN],
        server_ephemeral: &[u8; X25519_KEY_LEN],
        received: &[u8],
    ) -> bool {
        let expected = self.server_auth(client_ephemeral, server_ephemeral);
        constant_time_compare(&expected, received)
    }

    /// Split into (outbound, inbound) ciphers for `role`.
    pub fn into_ciphers(self, role: Role) -> (FrameCipher, FrameCipher) {
        let c2s = FrameCipher::new(&self.c2s);
        let s2c = FrameCipher::new(&self.s2c);
        match role {
            Role::Client => (c2s, s2c),
            Role::Bridge => (s2c, c2s),
        }
    }
}

/// MAC appended to the client hello so a bridge can tell that the client
/// knows its public key: `HMAC(B, X || pad)[..16]`.
pub fn client_hello_mac(
    bridge_public: &[u8; X25519_KEY_LEN],
    client_ephemeral: &[u8; X25519_KEY_LEN],
    padding: &[u8],
) -> [u8; CLIENT_MAC_LEN] {
    let full = hmac_sha256(bridge_public, &[&client_ephemeral[..], padding]);
    let mut mac = [0u8; CLIENT_MAC_LEN];
    mac.copy_from_slice(&full[..CLIENT_MAC_LEN]);
    mac
}

/// One direction of the framed session. The nonce is the frame counter,
/// big-endian in the low 8 bytes of the 96-bit nonce.
pub struct FrameCipher {
    aead: ChaCha20Poly1305,
    counter: u64,
}

impl FrameCipher {
    fn new(key: &[u8; 32]) -> Self {
        Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(key)),
            counter: 0,
        }
    }

    fn next_nonce(&mut self) -> Result<[u8; 12], CryptoError> {
        let counter = self.counter;
        self.counter = counter
            .checked_add(1)
            .ok_or(CryptoError::Session("frame counter exhausted"))?;
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&counter.to_be_bytes());
        Ok(nonce)
    }

    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = self.next_nonce()?;
        self.aead
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Session("encryption failed"))
    }

    /// Decrypt the next inbound frame. A failure leaves the counter advanced,
    /// so the session must be torn down afterwards.
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = self.next_nonce()?;
        self.aead
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| CryptoError::Session("decryption failed"))
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake() -> (SessionKeys, SessionKeys, [u8; 32], [u8; 32]) {
        let bridge_identity = KexKeyPair::generate().unwrap();
        let client_eph = KexKeyPair::generate().unwrap();
        let bridge_eph = KexKeyPair::generate().unwrap();

        let client = SessionKeys::for_client(
            &client_eph,
            &bridge_eph.public_bytes(),
            &bridge_identity.public_bytes(),
        )
        .unwrap();
        let bridge =
            SessionKeys::for_bridge(&bridge_eph, &bridge_identity, &client_eph.public_bytes())
                .unwrap();
        (
            client,
            bridge,
            client_eph.public_bytes(),
            bridge_eph.public_bytes(),
        )
    }

    #[test]
    fn test_both_sides_derive_same_keys() {
        let (client, bridge, x, y) = handshake();
        let auth = bridge.server_auth(&x, &y);
        assert!(client.verify_server_auth(&x, &y, &auth));
    }

    #[test]
    fn test_server_auth_rejects_swapped_ephemerals() {
        let (client, bridge, x, y) = handshake();
        let auth = bridge.server_auth(&y, &x);
        assert!(!client.verify_server_auth(&x, &y, &auth));
    }

    #[test]
    fn test_wrong_bridge_key_breaks_auth() {
        let real_bridge = KexKeyPair::generate().unwrap();
        let imposter = KexKeyPair::generate().unwrap();
        let client_eph = KexKeyPair::generate().unwrap();
        let bridge_eph = KexKeyPair::generate().unwrap();

        let client = SessionKeys::for_client(
            &client_eph,
            &bridge_eph.public_bytes(),
            &real_bridge.public_bytes(),
        )
        .unwrap();
        let bridge =
            SessionKeys::for_bridge(&bridge_eph, &imposter, &client_eph.public_bytes()).unwrap();

        let x = client_eph.public_bytes();
        let y = bridge_eph.public_bytes();
        assert!(!client.verify_server_auth(&x, &y, &bridge.server_auth(&x, &y)));
    }

    #[test]
    fn test_frames_flow_both_ways() {
        let (client, bridge, _, _) = handshake();
        let (mut c_out, mut c_in) = client.into_ciphers(Role::Client);
        let (mut b_out, mut b_in) = bridge.into_ciphers(Role::Bridge);

        for msg in [&b"first"[..], b"second", b""] {
            let ct = c_out.seal(msg).unwrap();
            assert_eq!(ct.len(), msg.len() + AEAD_TAG_LEN);
            assert_eq!(b_in.open(&ct).unwrap(), msg);
        }

        let ct = b_out.seal(b"reply").unwrap();
        assert_eq!(c_in.open(&ct).unwrap(), b"reply");
        assert_eq!(c_out.counter(), 3);
    }

    #[test]
    fn test_replayed_frame_fails() {
        let (client, bridge, _, _) = handshake();
        let (mut c_out, _) = client.into_ciphers(Role::Client);
        let (_, mut b_in) = bridge.into_ciphers(Role::Bridge);

        let ct = c_out.seal(b"once").unwrap();
        assert!(b_in.open(&ct).is_ok());
        assert!(b_in.open(&ct).is_err());
    }

    #[test]
    fn test_client_hello_mac_depends_on_padding() {
        let b = [1u8; 32];
        let x = [2u8; 32];
        assert_ne!(client_hello_mac(&b, &x, &[0]), client_hello_mac(&b, &x, &[1]));
        assert_eq!(client_hello_mac(&b, &x, b"p"), client_hello_mac(&b, &x, b"p"));
    }
}
