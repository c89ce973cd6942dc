//! Network blockage classification.
//!
//! A probe runs DNS, then TCP connect, then a protocol handshake, stopping at
//! the first stage that fails. The failing stage and the way it failed decide
//! the verdict. Every stage has its own deadline. When the system resolver
//! fails, the DNS stage asks a DNS-over-HTTPS resolver before blaming DNS:
//! only a name that DoH can resolve is reported as `dns_blocked`. A probe
//! therefore never takes longer than four stage timeouts.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::doh::{DohResolver, DEFAULT_DOH_ENDPOINTS};
use crate::error::TransportError;

/// Default per-stage deadline
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(4);

/// Port used when the target does not name one
pub const DEFAULT_PORT: u16 = 443;

/// How a target is blocked, if at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockageVerdict {
    Reachable,
    DnsBlocked,
    ConnectionReset,
    IpBlocked,
    Timeout,
    Unknown,
}

impl BlockageVerdict {
    /// Wire string handed to the host.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockageVerdict::Reachable => "ok",
            BlockageVerdict::DnsBlocked => "dns_blocked",
            BlockageVerdict::ConnectionReset => "tcp_rst",
            BlockageVerdict::IpBlocked => "ip_blocked",
            BlockageVerdict::Timeout => "timeout",
            BlockageVerdict::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BlockageVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage at which a probe stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeStage {
    Parse,
    Dns,
    Tcp,
    Handshake,
}

impl ProbeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStage::Parse => "parse",
            ProbeStage::Dns => "dns",
            ProbeStage::Tcp => "tcp",
            ProbeStage::Handshake => "handshake",
        }
    }
}

/// Outcome of one probe
#[derive(Clone, Debug)]
pub struct BlockageReport {
    pub target: String,
    pub verdict: BlockageVerdict,
    pub stage: ProbeStage,
    pub elapsed: Duration,
    pub detail: Option<String>,
}

/// Probe configuration
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    pub stage_timeout: Duration,
    pub default_port: u16,
    /// DoH endpoints for the DNS cross-check; empty disables it
    pub doh_endpoints: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            default_port: DEFAULT_PORT,
            doh_endpoints: DEFAULT_DOH_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

// ============================================================================
// Seams
// ============================================================================

/// Name resolution used by the DNS stage
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the operating system
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }
}

/// How a protocol handshake failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeFailure {
    /// The peer answered with a certificate that is not valid for the host
    CertificateMismatch(String),
    /// The connection was reset or cut during the handshake
    Reset(String),
    Other(String),
}

/// Protocol handshake run over the connected TCP stream
#[async_trait]
pub trait HandshakeProbe: Send + Sync {
    async fn handshake(&self, stream: TcpStream, host: &str) -> Result<(), HandshakeFailure>;
}

/// TLS ClientHello with SNI, verified against the bundled web PKI roots.
pub struct TlsProbe {
    connector: TlsConnector,
}

impl TlsProbe {
    pub fn new() -> Result<Self, TransportError> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::Protocol(format!("TLS config: {e}")))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }
}

#[async_trait]
impl HandshakeProbe for TlsProbe {
    async fn handshake(&self, stream: TcpStream, host: &str) -> Result<(), HandshakeFailure> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| HandshakeFailure::Other(format!("invalid server name: {e}")))?;

        match self.connector.connect(server_name, stream).await {
            Ok(_tls) => Ok(()),
            Err(e) => Err(classify_tls_error(&e)),
        }
    }
}

/// Map a TLS handshake error onto a failure class.
pub fn classify_tls_error(e: &io::Error) -> HandshakeFailure {
    if let Some(tls) = e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        return match tls {
            rustls::Error::InvalidCertificate(reason) => {
                HandshakeFailure::CertificateMismatch(format!("{reason:?}"))
            }
            other => HandshakeFailure::Other(other.to_string()),
        };
    }

    match e.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => HandshakeFailure::Reset(e.to_string()),
        _ => HandshakeFailure::Other(e.to_string()),
    }
}

fn classify_connect_error(e: &io::Error) -> BlockageVerdict {
    match e.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => BlockageVerdict::ConnectionReset,
        io::ErrorKind::TimedOut => BlockageVerdict::Timeout,
        _ => BlockageVerdict::Unknown,
    }
}

// ============================================================================
// Targets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Target {
    pub host: String,
    pub port: u16,
    pub ip: Option<IpAddr>,
}

/// Accepts `host`, `host:port`, `[v6]:port`, bare IP literals, and URLs of
/// the form `scheme://host[:port]/path`.
pub(crate) fn parse_target(input: &str, default_port: u16) -> Result<Target, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty target".into());
    }

    let rest = match input.split_once("://") {
        Some((_, rest)) => rest,
        None => input,
    };
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| format!("unterminated IPv6 literal in '{input}'"))?;
        let port = match after.strip_prefix(':') {
            Some(p) => Some(p),
            None if after.is_empty() => None,
            None => return Err(format!("unexpected text after IPv6 literal in '{input}'")),
        };
        (host, port)
    } else if authority.matches(':').count() > 1 {
        (authority, None)
    } else {
        match authority.split_once(':') {
            Some((h, p)) => (h, Some(p)),
            None => (authority, None),
        }
    };

    if host.is_empty() || host.chars().any(|c| c.is_whitespace()) {
        return Err(format!("invalid host in '{input}'"));
    }

    let port = match port {
        Some(p) => match p.parse::<u16>() {
            Ok(0) | Err(_) => return Err(format!("invalid port in '{input}'")),
            Ok(p) => p,
        },
        None => default_port,
    };

    let ip = host.parse::<IpAddr>().ok();
    if ip.is_none() && authority.matches(':').count() > 1 && !authority.starts_with('[') {
        return Err(format!("invalid address '{input}'"));
    }

    Ok(Target {
        host: host.to_string(),
        port,
        ip,
    })
}

// ============================================================================
// Classifier
// ============================================================================

/// Runs blockage probes. Results are never cached.
pub struct BlockageClassifier {
    config: ProbeConfig,
    resolver: Arc<dyn Resolver>,
    cross_check: Option<Arc<dyn Resolver>>,
    probe: Arc<dyn HandshakeProbe>,
}

impl BlockageClassifier {
    /// Classifier using the system resolver, DoH cross-checks against the
    /// configured endpoints, and the TLS handshake probe.
    pub fn new(config: ProbeConfig) -> Result<Self, TransportError> {
        let doh = if config.doh_endpoints.is_empty() {
            None
        } else {
            Some(DohResolver::new(config.doh_endpoints.clone(), config.stage_timeout)?)
        };

        let classifier = Self::with_parts(
            config,
            Arc::new(SystemResolver),
            Arc::new(TlsProbe::new()?),
        );
        Ok(match doh {
            Some(doh) => classifier.with_cross_check(Arc::new(doh)),
            None => classifier,
        })
    }

    pub fn with_parts(
        config: ProbeConfig,
        resolver: Arc<dyn Resolver>,
        probe: Arc<dyn HandshakeProbe>,
    ) -> Self {
        Self {
            config,
            resolver,
            cross_check: None,
            probe,
        }
    }

    /// Resolver consulted when the primary resolver gives no usable answer.
    pub fn with_cross_check(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.cross_check = Some(resolver);
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub async fn check(&self, target: &str) -> BlockageReport {
        let started = Instant::now();
        let (verdict, stage, detail) = self.run(target).await;
        let report = BlockageReport {
            target: target.to_string(),
            verdict,
            stage,
            elapsed: started.elapsed(),
            detail,
        };

        info!(
            target = %report.target,
            verdict = report.verdict.as_str(),
            stage = report.stage.as_str(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Blockage probe finished"
        );
        report
    }

    async fn run(&self, raw: &str) -> (BlockageVerdict, ProbeStage, Option<String>) {
        let stage_timeout = self.config.stage_timeout;

        let target = match parse_target(raw, self.config.default_port) {
            Ok(t) => t,
            Err(e) => return (BlockageVerdict::Unknown, ProbeStage::Parse, Some(e)),
        };

        // DNS
        let addr = match target.ip {
            Some(ip) => SocketAddr::new(ip, target.port),
            None => match self.resolve(&target).await {
                Ok(addr) => addr,
                Err((verdict, detail)) => return (verdict, ProbeStage::Dns, detail),
            },
        };
        debug!(host = %target.host, %addr, "Resolved probe target");

        // TCP
        let stream = match timeout(stage_timeout, TcpStream::connect(addr)).await {
            Err(_) => return (BlockageVerdict::Timeout, ProbeStage::Tcp, None),
            Ok(Err(e)) => return (classify_connect_error(&e), ProbeStage::Tcp, Some(e.to_string())),
            Ok(Ok(stream)) => stream,
        };

        // Handshake
        match timeout(stage_timeout, self.probe.handshake(stream, &target.host)).await {
            Err(_) => (BlockageVerdict::Timeout, ProbeStage::Handshake, None),
            Ok(Ok(())) => (BlockageVerdict::Reachable, ProbeStage::Handshake, None),
            Ok(Err(HandshakeFailure::CertificateMismatch(d))) => {
                (BlockageVerdict::IpBlocked, ProbeStage::Handshake, Some(d))
            }
            Ok(Err(HandshakeFailure::Reset(d))) => {
                (BlockageVerdict::ConnectionReset, ProbeStage::Handshake, Some(d))
            }
            Ok(Err(HandshakeFailure::Other(d))) => {
                (BlockageVerdict::Unknown, ProbeStage::Handshake, Some(d))
            }
        }
    }

    async fn resolve(&self, target: &Target) -> Result<SocketAddr, (BlockageVerdict, Option<String>)> {
        let stage_timeout = self.config.stage_timeout;

        let lookup = timeout(stage_timeout, self.resolver.resolve(&target.host, target.port));
        let failure = match lookup.await {
            Err(_) => return Err((BlockageVerdict::Timeout, None)),
            Ok(Ok(addrs)) => match first_routable(&addrs) {
                Some(addr) => return Ok(addr),
                // An unspecified answer is a sinkhole, no second opinion needed.
                None if !addrs.is_empty() => {
                    return Err((BlockageVerdict::DnsBlocked, Some("sinkhole answer".into())))
                }
                None => "empty answer".to_string(),
            },
            Ok(Err(e)) => e.to_string(),
        };

        let Some(cross_check) = &self.cross_check else {
            return Err((BlockageVerdict::DnsBlocked, Some(failure)));
        };

        let second = timeout(stage_timeout, cross_check.resolve(&target.host, target.port));
        match second.await {
            Err(_) => Err((
                BlockageVerdict::Timeout,
                Some(format!("system resolver: {failure}; DoH timed out")),
            )),
            Ok(Ok(addrs)) => match first_routable(&addrs) {
                Some(addr) => {
                    debug!(host = %target.host, doh_answer = %addr.ip(), "Local DNS disagrees with DoH");
                    Err((
                        BlockageVerdict::DnsBlocked,
                        Some(format!("system resolver: {failure}; DoH answered {}", addr.ip())),
                    ))
                }
                None => Err((
                    BlockageVerdict::Unknown,
                    Some(format!("system resolver: {failure}; DoH has no usable answer")),
                )),
            },
            Ok(Err(e)) => Err((
                BlockageVerdict::Unknown,
                Some(format!("system resolver: {failure}; DoH: {e}")),
            )),
        }
    }
}

fn first_routable(addrs: &[SocketAddr]) -> Option<SocketAddr> {
    addrs.iter().find(|a| !a.ip().is_unspecified()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    struct StaticResolver(io::Result<Vec<SocketAddr>>);

    #[async_trait]
    impl Resolver for StaticResolver {
        async fn resolve(&self, _host: &str, _port: u16) -> io::Result<Vec<SocketAddr>> {
            match &self.0 {
                Ok(addrs) => Ok(addrs.clone()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    struct SlowResolver;

    #[async_trait]
    impl Resolver for SlowResolver {
        async fn resolve(&self, _host: &str, _port: u16) -> io::Result<Vec<SocketAddr>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    struct FixedProbe(Result<(), HandshakeFailure>);

    #[async_trait]
    impl HandshakeProbe for FixedProbe {
        async fn handshake(&self, _stream: TcpStream, _host: &str) -> Result<(), HandshakeFailure> {
            self.0.clone()
        }
    }

    fn classifier(
        resolver: impl Resolver + 'static,
        probe: impl HandshakeProbe + 'static,
    ) -> BlockageClassifier {
        BlockageClassifier::with_parts(
            ProbeConfig {
                stage_timeout: Duration::from_millis(300),
                default_port: DEFAULT_PORT,
                doh_endpoints: Vec::new(),
            },
            Arc::new(resolver),
            Arc::new(probe),
        )
    }

    async fn open_port() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[test]
    fn test_wire_strings() {
        assert_eq!(BlockageVerdict::Reachable.as_str(), "ok");
        assert_eq!(BlockageVerdict::DnsBlocked.as_str(), "dns_blocked");
        assert_eq!(BlockageVerdict::ConnectionReset.as_str(), "tcp_rst");
        assert_eq!(BlockageVerdict::IpBlocked.as_str(), "ip_blocked");
        assert_eq!(BlockageVerdict::Timeout.as_str(), "timeout");
        assert_eq!(BlockageVerdict::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_parse_target_forms() {
        let t = parse_target("example.org", 443).unwrap();
        assert_eq!((t.host.as_str(), t.port, t.ip), ("example.org", 443, None));

        let t = parse_target("example.org:8443", 443).unwrap();
        assert_eq!(t.port, 8443);

        let t = parse_target("https://user@example.org:9000/path?q=1", 443).unwrap();
        assert_eq!((t.host.as_str(), t.port), ("example.org", 9000));

        let t = parse_target("http://example.org/", 443).unwrap();
        assert_eq!(t.port, 443);

        let t = parse_target("192.0.2.1", 443).unwrap();
        assert!(t.ip.is_some());

        let t = parse_target("[2001:db8::1]:853", 443).unwrap();
        assert_eq!((t.host.as_str(), t.port), ("2001:db8::1", 853));
        assert!(t.ip.is_some());

        let t = parse_target("2001:db8::1", 443).unwrap();
        assert_eq!(t.port, 443);
    }

    #[test]
    fn test_parse_target_rejects_garbage() {
        for bad in ["", "   ", "host:0", "host:http", "[::1", "https:///path", "a b:80", "zz::zz::q"] {
            assert!(parse_target(bad, 443).is_err(), "accepted {bad:?}");
        }
    }

    #[tokio::test]
    async fn test_malformed_target_is_unknown() {
        let c = classifier(SlowResolver, FixedProbe(Ok(())));
        let report = c.check("host:notaport").await;
        assert_eq!(report.verdict, BlockageVerdict::Unknown);
        assert_eq!(report.stage, ProbeStage::Parse);
    }

    #[tokio::test]
    async fn test_resolution_failure_without_cross_check_is_dns_blocked() {
        let c = classifier(nxdomain(), FixedProbe(Ok(())));
        let report = c.check("blocked.example").await;
        assert_eq!(report.verdict, BlockageVerdict::DnsBlocked);
        assert_eq!(report.stage, ProbeStage::Dns);
    }

    #[tokio::test]
    async fn test_sinkhole_and_empty_answers_are_dns_blocked() {
        let sinkhole: SocketAddr = "0.0.0.0:443".parse().unwrap();
        let c = classifier(StaticResolver(Ok(vec![sinkhole])), FixedProbe(Ok(())));
        assert_eq!(c.check("blocked.example").await.verdict, BlockageVerdict::DnsBlocked);

        let c = classifier(StaticResolver(Ok(Vec::new())), FixedProbe(Ok(())));
        assert_eq!(c.check("blocked.example").await.verdict, BlockageVerdict::DnsBlocked);
    }

    fn nxdomain() -> StaticResolver {
        StaticResolver(Err(io::Error::new(io::ErrorKind::NotFound, "nxdomain")))
    }

    #[tokio::test]
    async fn test_doh_answer_confirms_dns_block() {
        let doh: SocketAddr = "192.0.2.7:443".parse().unwrap();
        let c = classifier(nxdomain(), FixedProbe(Ok(())))
            .with_cross_check(Arc::new(StaticResolver(Ok(vec![doh]))));

        let report = c.check("blocked.example").await;
        assert_eq!(report.verdict, BlockageVerdict::DnsBlocked);
        assert_eq!(report.stage, ProbeStage::Dns);
        assert!(report.detail.unwrap().contains("192.0.2.7"));

        let c = classifier(StaticResolver(Ok(Vec::new())), FixedProbe(Ok(())))
            .with_cross_check(Arc::new(StaticResolver(Ok(vec![doh]))));
        assert_eq!(c.check("blocked.example").await.verdict, BlockageVerdict::DnsBlocked);
    }

    #[tokio::test]
    async fn test_both_resolvers_failing_is_unknown() {
        let offline = StaticResolver(Err(io::Error::new(io::ErrorKind::Other, "network unreachable")));
        let c = classifier(nxdomain(), FixedProbe(Ok(()))).with_cross_check(Arc::new(offline));
        let report = c.check("offline.example").await;
        assert_eq!(report.verdict, BlockageVerdict::Unknown);
        assert_eq!(report.stage, ProbeStage::Dns);

        let c = classifier(nxdomain(), FixedProbe(Ok(()))).with_cross_check(Arc::new(nxdomain()));
        assert_eq!(c.check("missing.example").await.verdict, BlockageVerdict::Unknown);

        let sinkhole: SocketAddr = "0.0.0.0:443".parse().unwrap();
        let c = classifier(nxdomain(), FixedProbe(Ok(())))
            .with_cross_check(Arc::new(StaticResolver(Ok(vec![sinkhole]))));
        assert_eq!(c.check("missing.example").await.verdict, BlockageVerdict::Unknown);
    }

    #[tokio::test]
    async fn test_slow_cross_check_times_out() {
        let c = classifier(nxdomain(), FixedProbe(Ok(()))).with_cross_check(Arc::new(SlowResolver));
        let report = c.check("blocked.example").await;
        assert_eq!(report.verdict, BlockageVerdict::Timeout);
        assert_eq!(report.stage, ProbeStage::Dns);
        assert!(report.elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_sinkhole_skips_cross_check() {
        let sinkhole: SocketAddr = "0.0.0.0:443".parse().unwrap();
        let c = classifier(StaticResolver(Ok(vec![sinkhole])), FixedProbe(Ok(())))
            .with_cross_check(Arc::new(SlowResolver));
        assert_eq!(c.check("blocked.example").await.verdict, BlockageVerdict::DnsBlocked);
    }

    #[tokio::test]
    async fn test_slow_resolver_times_out() {
        let c = classifier(SlowResolver, FixedProbe(Ok(())));
        let report = c.check("slow.example").await;
        assert_eq!(report.verdict, BlockageVerdict::Timeout);
        assert_eq!(report.stage, ProbeStage::Dns);
        assert!(report.elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_ip_literal_skips_dns() {
        let (_listener, addr) = open_port().await;
        let c = classifier(SlowResolver, FixedProbe(Ok(())));
        let report = c.check(&addr.to_string()).await;
        assert_eq!(report.verdict, BlockageVerdict::Reachable);
    }

    #[tokio::test]
    async fn test_resolved_host_reachable() {
        let (_listener, addr) = open_port().await;
        let c = classifier(StaticResolver(Ok(vec![addr])), FixedProbe(Ok(())));
        let report = c.check("messenger.example").await;
        assert_eq!(report.verdict, BlockageVerdict::Reachable);
        assert_eq!(report.stage, ProbeStage::Handshake);
    }

    #[tokio::test]
    async fn test_refused_connection_is_tcp_rst() {
        let (listener, addr) = open_port().await;
        drop(listener);
        let c = classifier(SlowResolver, FixedProbe(Ok(())));
        let report = c.check(&addr.to_string()).await;
        assert_eq!(report.verdict, BlockageVerdict::ConnectionReset);
        assert_eq!(report.stage, ProbeStage::Tcp);
    }

    #[tokio::test]
    async fn test_handshake_failures_map_to_verdicts() {
        let (_listener, addr) = open_port().await;
        let target = addr.to_string();

        let cases = [
            (HandshakeFailure::CertificateMismatch("NotValidForName".into()), BlockageVerdict::IpBlocked),
            (HandshakeFailure::Reset("reset".into()), BlockageVerdict::ConnectionReset),
            (HandshakeFailure::Other("alert".into()), BlockageVerdict::Unknown),
        ];
        for (failure, expected) in cases {
            let c = classifier(SlowResolver, FixedProbe(Err(failure)));
            assert_eq!(c.check(&target).await.verdict, expected);
        }
    }

    #[tokio::test]
    async fn test_tls_probe_against_hangup_is_tcp_rst() {
        let (listener, addr) = open_port().await;
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let c = BlockageClassifier::with_parts(
            ProbeConfig {
                stage_timeout: Duration::from_secs(2),
                default_port: DEFAULT_PORT,
                doh_endpoints: Vec::new(),
            },
            Arc::new(SlowResolver),
            Arc::new(TlsProbe::new().unwrap()),
        );
        let report = c.check(&addr.to_string()).await;
        assert_eq!(report.verdict, BlockageVerdict::ConnectionReset);
        assert_eq!(report.stage, ProbeStage::Handshake);
    }

    #[tokio::test]
    async fn test_non_routable_address_within_deadline() {
        let c = classifier(SlowResolver, FixedProbe(Ok(())));
        let report = c.check("10.255.255.1:443").await;
        assert!(
            matches!(report.verdict, BlockageVerdict::Timeout | BlockageVerdict::Unknown),
            "got {:?}",
            report.verdict
        );
        assert!(report.elapsed < Duration::from_millis(300 * 3 + 500));
    }

    #[test]
    fn test_classify_tls_errors() {
        let cert = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::InvalidCertificate(rustls::CertificateError::NotValidForName),
        );
        assert!(matches!(
            classify_tls_error(&cert),
            HandshakeFailure::CertificateMismatch(_)
        ));

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(matches!(classify_tls_error(&reset), HandshakeFailure::Reset(_)));

        let alert = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::AlertReceived(rustls::AlertDescription::HandshakeFailure),
        );
        assert!(matches!(classify_tls_error(&alert), HandshakeFailure::Other(_)));
    }
}
