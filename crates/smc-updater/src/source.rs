//! Where manifests come from.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::UpdateError;

/// Largest manifest accepted from a gateway.
const MAX_MANIFEST_BYTES: usize = 256 * 1024;

/// A channel that can produce the latest signed manifest.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_manifest(&self) -> Result<Bytes, UpdateError>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// How the manifest is addressed on IPFS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestPointer {
    /// Mutable IPNS name that the publisher re-points on each release
    Ipns(String),
    /// Fixed content id
    Ipfs(String),
}

impl ManifestPointer {
    pub fn url_on(&self, gateway: &str) -> String {
        let gateway = gateway.trim_end_matches('/');
        match self {
            ManifestPointer::Ipns(name) => format!("{gateway}/ipns/{name}"),
            ManifestPointer::Ipfs(cid) => format!("{gateway}/ipfs/{cid}"),
        }
    }
}

/// Fetches the manifest through public IPFS HTTP gateways, in order.
pub struct GatewaySource {
    client: reqwest::Client,
    gateways: Vec<String>,
    pointer: ManifestPointer,
}

impl GatewaySource {
    pub fn new(
        gateways: Vec<String>,
        pointer: ManifestPointer,
        timeout: Duration,
    ) -> Result<Self, UpdateError> {
        if gateways.is_empty() {
            return Err(UpdateError::ConfigError("no IPFS gateways configured".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("smc-updater/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpdateError::ConfigError(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            gateways,
            pointer,
        })
    }

    async fn fetch_from(&self, url: &str) -> Result<Bytes, UpdateError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(UpdateError::FetchFailed {
                status: response.status().as_u16(),
            });
        }
        if let Some(len) = response.content_length() {
            if len as usize > MAX_MANIFEST_BYTES {
                return Err(UpdateError::MalformedManifest(format!(
                    "manifest too large: {len} bytes"
                )));
            }
        }

        let body = response.bytes().await?;
        if body.len() > MAX_MANIFEST_BYTES {
            return Err(UpdateError::MalformedManifest(format!(
                "manifest too large: {} bytes",
                body.len()
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl ContentSource for GatewaySource {
    async fn fetch_manifest(&self) -> Result<Bytes, UpdateError> {
        let mut last_error = None;

        for gateway in &self.gateways {
            let url = self.pointer.url_on(gateway);
            debug!(%url, "Fetching manifest");
            match self.fetch_from(&url).await {
                Ok(body) => {
                    debug!(%url, bytes = body.len(), "Fetched manifest");
                    return Ok(body);
                }
                Err(e) => {
                    warn!(%gateway, error = %e, "Gateway failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| UpdateError::ConfigError("no IPFS gateways configured".into())))
    }

    fn describe(&self) -> String {
        format!("{:?} via {} gateway(s)", self.pointer, self.gateways.len())
    }
}

/// A source that always answers the same way.
pub struct StaticSource {
    response: Result<Bytes, String>,
}

impl StaticSource {
    pub fn manifest(bytes: impl Into<Bytes>) -> Self {
        Self {
            response: Ok(bytes.into()),
        }
    }

    /// A source whose fetches fail with a network error.
    pub fn unreachable(reason: &str) -> Self {
        Self {
            response: Err(reason.to_string()),
        }
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    async fn fetch_manifest(&self) -> Result<Bytes, UpdateError> {
        self.response
            .clone()
            .map_err(UpdateError::NetworkError)
    }

    fn describe(&self) -> String {
        "static".into()
    }
}
