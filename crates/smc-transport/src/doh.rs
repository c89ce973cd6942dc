//! DNS-over-HTTPS resolution using the JSON API (`application/dns-json`).
//!
//! Used by the blockage classifier to tell a tampered local resolver apart
//! from a network that is down or a name that does not exist.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::blockage::Resolver;
use crate::error::TransportError;

/// Public resolvers that answer JSON queries
pub const DEFAULT_DOH_ENDPOINTS: &[&str] = &[
    "https://cloudflare-dns.com/dns-query",
    "https://dns.google/resolve",
    "https://dns.quad9.net:5053/dns-query",
];

const RECORD_A: u16 = 1;
const RECORD_AAAA: u16 = 28;

/// DNS response code for a name that does not exist
const RCODE_NXDOMAIN: u32 = 3;

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohRecord>,
}

#[derive(Debug, Deserialize)]
struct DohRecord {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

impl DohResponse {
    fn addresses(&self, record_type: u16) -> Vec<IpAddr> {
        self.answer
            .iter()
            .filter(|r| r.record_type == record_type)
            .filter_map(|r| r.data.parse().ok())
            .collect()
    }
}

/// Resolves names through DoH endpoints, trying each in order.
pub struct DohResolver {
    client: reqwest::Client,
    endpoints: Vec<String>,
}

impl DohResolver {
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Result<Self, TransportError> {
        if endpoints.is_empty() {
            return Err(TransportError::Protocol("no DoH endpoints configured".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("smc-transport/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Protocol(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    async fn query(&self, endpoint: &str, host: &str, record_type: u16) -> io::Result<DohResponse> {
        let record_type = record_type.to_string();
        let response = self
            .client
            .get(endpoint)
            .query(&[("name", host), ("type", record_type.as_str())])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await
            .map_err(io::Error::other)?;

        if !response.status().is_success() {
            return Err(io::Error::other(format!(
                "DoH endpoint returned {}",
                response.status()
            )));
        }

        let body = response.bytes().await.map_err(io::Error::other)?;
        serde_json::from_slice(&body)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    async fn resolve_with(&self, endpoint: &str, host: &str) -> io::Result<Vec<IpAddr>> {
        for record_type in [RECORD_A, RECORD_AAAA] {
            let response = self.query(endpoint, host, record_type).await?;
            match response.status {
                0 => {
                    let addrs = response.addresses(record_type);
                    if !addrs.is_empty() {
                        return Ok(addrs);
                    }
                }
                RCODE_NXDOMAIN => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("{host} does not exist"),
                    ))
                }
                rcode => return Err(io::Error::other(format!("DNS error code {rcode}"))),
            }
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl Resolver for DohResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        let mut last_error = None;

        for endpoint in &self.endpoints {
            match self.resolve_with(endpoint, host).await {
                Ok(addrs) => {
                    debug!(%endpoint, host, answers = addrs.len(), "DoH lookup finished");
                    return Ok(addrs.into_iter().map(|ip| SocketAddr::new(ip, port)).collect());
                }
                // Every honest resolver gives the same answer for a missing name.
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(e),
                Err(e) => {
                    warn!(%endpoint, error = %e, "DoH endpoint failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| io::Error::other("no DoH endpoints configured")))
    }
}
