//! Bridge relay descriptors.

use std::fmt;

use crate::error::TransportError;

const URL_SCHEME: &str = "obfs4://";

/// Address and X25519 identity key of a bridge relay.
#[derive(Clone, PartialEq, Eq)]
pub struct BridgeDescriptor {
    addr: String,
    public_key: [u8; 32],
}

impl BridgeDescriptor {
    /// Build from `host:port` and the bridge key as 64 hex characters.
    pub fn new(addr: &str, public_key_hex: &str) -> Result<Self, TransportError> {
        let addr = addr.trim();
        validate_addr(addr)?;
        let public_key = parse_key(public_key_hex.trim())?;
        Ok(Self {
            addr: addr.to_string(),
            public_key,
        })
    }

    /// Parse `obfs4://<hex key>@host:port`.
    pub fn from_url(url: &str) -> Result<Self, TransportError> {
        let rest = url
            .trim()
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| TransportError::InvalidBridge(format!("expected {URL_SCHEME} prefix")))?;
        let (key, addr) = rest
            .split_once('@')
            .ok_or_else(|| TransportError::InvalidBridge("missing '@' in bridge url".into()))?;
        Self::new(addr.trim_end_matches('/'), key)
    }

    pub(crate) fn from_parts(addr: String, public_key: [u8; 32]) -> Self {
        Self { addr, public_key }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    pub fn to_url(&self) -> String {
        format!("{URL_SCHEME}{}@{}", hex::encode(self.public_key), self.addr)
    }
}

impl fmt::Debug for BridgeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeDescriptor")
            .field("addr", &self.addr)
            .field("public_key", &hex::encode(&self.public_key[..4]))
            .finish()
    }
}

impl fmt::Display for BridgeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr)
    }
}

fn validate_addr(addr: &str) -> Result<(), TransportError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| TransportError::InvalidBridge(format!("missing port in '{addr}'")))?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(TransportError::InvalidBridge(format!("missing host in '{addr}'")));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(TransportError::InvalidBridge(format!(
            "invalid port in '{addr}'"
        ))),
        Ok(_) => Ok(()),
    }
}

fn parse_key(key_hex: &str) -> Result<[u8; 32], TransportError> {
    let bytes = hex::decode(key_hex)
        .map_err(|e| TransportError::InvalidBridge(format!("bridge key is not hex: {e}")))?;
    let key: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
        TransportError::InvalidBridge(format!("bridge key must be 32 bytes, got {}", v.len()))
    })?;
    if key == [0u8; 32] {
        return Err(TransportError::InvalidBridge("bridge key is all zeros".into()));
    }
    Ok(key)
}
