//! obfs4-style obfuscated handshake and framed session.
//!
//! Client hello: `X || pad_len (u16 BE) || pad || HMAC(B, X || pad)[..16]`.
//! Bridge reply: `Y || HMAC(K_auth, "smc-obfs4 server" || X || Y)`.
//! A bridge that does not recognise the hello MAC closes the connection
//! without answering, so probing it reveals nothing.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use rand::{Rng, RngCore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use smc_crypto::session_crypto::{
    client_hello_mac, FrameCipher, KexKeyPair, Role, SessionKeys, CLIENT_MAC_LEN,
    SERVER_AUTH_LEN, X25519_KEY_LEN,
};
use smc_crypto::utils::constant_time_compare;

use crate::bridge::BridgeDescriptor;
use crate::error::TransportError;
use crate::framing::{pad_payload, unpad_payload, LengthCodec};
use crate::traits::{BridgeSession, SessionConnector};

/// Upper bound on client hello padding
pub const MAX_HELLO_PADDING: usize = 255;

/// Default deadline for TCP connect plus handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

struct Writer {
    stream: OwnedWriteHalf,
    cipher: FrameCipher,
}

struct Reader {
    stream: OwnedReadHalf,
    cipher: FrameCipher,
    buf: BytesMut,
}

/// An authenticated, encrypted session over one TCP connection.
pub struct Obfs4Session {
    peer: String,
    writer: Mutex<Writer>,
    reader: Mutex<Reader>,
}

impl Obfs4Session {
    /// Run the client side of the handshake over a connected stream.
    pub async fn client_handshake(
        mut stream: TcpStream,
        bridge_public: &[u8; X25519_KEY_LEN],
    ) -> Result<Self, TransportError> {
        let ephemeral = KexKeyPair::generate()?;
        let x = ephemeral.public_bytes();

        let hello = {
            let mut rng = rand::thread_rng();
            let pad_len = rng.gen_range(0..=MAX_HELLO_PADDING);
            let mut pad = vec![0u8; pad_len];
            rng.fill_bytes(&mut pad);
            let mac = client_hello_mac(bridge_public, &x, &pad);

            let mut hello = Vec::with_capacity(X25519_KEY_LEN + 2 + pad_len + CLIENT_MAC_LEN);
            hello.extend_from_slice(&x);
            hello.put_u16(pad_len as u16);
            hello.extend_from_slice(&pad);
            hello.extend_from_slice(&mac);
            hello
        };
        stream.write_all(&hello).await?;

        let mut reply = [0u8; X25519_KEY_LEN + SERVER_AUTH_LEN];
        read_handshake(&mut stream, &mut reply).await?;

        let mut y = [0u8; X25519_KEY_LEN];
        y.copy_from_slice(&reply[..X25519_KEY_LEN]);

        let keys = SessionKeys::for_client(&ephemeral, &y, bridge_public)?;
        if !keys.verify_server_auth(&x, &y, &reply[X25519_KEY_LEN..]) {
            return Err(TransportError::Protocol(
                "bridge failed to authenticate".into(),
            ));
        }

        Self::from_parts(stream, keys, Role::Client)
    }

    /// Run the bridge side of the handshake for an accepted stream.
    pub async fn accept(
        mut stream: TcpStream,
        identity: &KexKeyPair,
    ) -> Result<Self, TransportError> {
        let mut head = [0u8; X25519_KEY_LEN + 2];
        read_handshake(&mut stream, &mut head).await?;

        let mut x = [0u8; X25519_KEY_LEN];
        x.copy_from_slice(&head[..X25519_KEY_LEN]);
        let pad_len = u16::from_be_bytes([head[X25519_KEY_LEN], head[X25519_KEY_LEN + 1]]) as usize;
        if pad_len > MAX_HELLO_PADDING {
            return Err(TransportError::Protocol(format!(
                "client hello padding too long: {pad_len}"
            )));
        }

        let mut rest = vec![0u8; pad_len + CLIENT_MAC_LEN];
        read_handshake(&mut stream, &mut rest).await?;
        let (pad, mac) = rest.split_at(pad_len);

        let expected = client_hello_mac(&identity.public_bytes(), &x, pad);
        if !constant_time_compare(&expected, mac) {
            return Err(TransportError::Protocol("client hello not recognised".into()));
        }

        let ephemeral = KexKeyPair::generate()?;
        let y = ephemeral.public_bytes();
        let keys = SessionKeys::for_bridge(&ephemeral, identity, &x)?;
        let auth = keys.server_auth(&x, &y);

        let mut reply = Vec::with_capacity(X25519_KEY_LEN + SERVER_AUTH_LEN);
        reply.extend_from_slice(&y);
        reply.extend_from_slice(&auth);
        stream.write_all(&reply).await?;

        Self::from_parts(stream, keys, Role::Bridge)
    }

    fn from_parts(stream: TcpStream, keys: SessionKeys, role: Role) -> Result<Self, TransportError> {
        let peer = stream.peer_addr()?.to_string();
        let (outbound, inbound) = keys.into_ciphers(role);
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            peer,
            writer: Mutex::new(Writer {
                stream: write_half,
                cipher: outbound,
            }),
            reader: Mutex::new(Reader {
                stream: read_half,
                cipher: inbound,
                buf: BytesMut::with_capacity(4096),
            }),
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

async fn read_handshake(stream: &mut TcpStream, buf: &mut [u8]) -> Result<(), TransportError> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::Protocol(
            "peer closed the connection during handshake".into(),
        )),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl BridgeSession for Obfs4Session {
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        let plaintext = pad_payload(payload, &mut rand::thread_rng())?;

        let mut writer = self.writer.lock().await;
        let ciphertext = writer.cipher.seal(&plaintext)?;
        let frame = LengthCodec::session().encode(&ciphertext)?;
        writer.stream.write_all(&frame).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Bytes, TransportError> {
        let codec = LengthCodec::session();
        let mut guard = self.reader.lock().await;
        let reader = &mut *guard;

        loop {
            if let Some(frame) = codec.decode_stream(&mut reader.buf)? {
                let plaintext = reader.cipher.open(&frame)?;
                let payload = unpad_payload(&plaintext)?;
                return Ok(Bytes::copy_from_slice(payload));
            }

            let n = reader.stream.read_buf(&mut reader.buf).await?;
            if n == 0 {
                return Err(TransportError::Disconnected);
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        debug!(peer = %self.peer, "Closing bridge session");
        self.writer.lock().await.stream.shutdown().await?;
        Ok(())
    }
}

/// Opens [`Obfs4Session`]s over TCP with a single deadline covering connect
/// and handshake.
pub struct Obfs4Connector {
    connect_timeout: Duration,
}

impl Obfs4Connector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for Obfs4Connector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl SessionConnector for Obfs4Connector {
    async fn connect(
        &self,
        bridge: &BridgeDescriptor,
    ) -> Result<Box<dyn BridgeSession>, TransportError> {
        let attempt = async {
            let stream = TcpStream::connect(bridge.addr()).await?;
            stream.set_nodelay(true)?;
            Obfs4Session::client_handshake(stream, bridge.public_key()).await
        };

        let session = tokio::time::timeout(self.connect_timeout, attempt).await??;
        debug!(peer = %session.peer(), "Bridge handshake complete");
        Ok(Box::new(session))
    }
}
