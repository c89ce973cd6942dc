//! Testing utilities for transport users.
//!
//! [`LoopbackBridge`] runs the bridge side of the real handshake on
//! localhost. [`MockConnector`] and [`RecordingSink`] stand in for the
//! network entirely.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::debug;

use smc_crypto::session_crypto::KexKeyPair;

use crate::bridge::BridgeDescriptor;
use crate::error::TransportError;
use crate::obfs4::Obfs4Session;
use crate::traits::{BridgeSession, FrameSink, SessionConnector};

/// A syntactically valid bridge key for descriptors that never hit the wire.
pub const TEST_BRIDGE_KEY: &str =
    "8f40c5adb68f25624ae5b214ea767a6ec94d829d3d7b5e1ad1ba6f3e2138285f";

// ============================================================================
// Mock sessions
// ============================================================================

/// In-memory session that records what it is asked to send.
#[derive(Default)]
pub struct MockSession {
    sent: Mutex<Vec<Bytes>>,
    closed: AtomicBool,
    broken: AtomicBool,
    latency: Duration,
}

impl MockSession {
    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make every later send fail as if the peer reset the connection
    pub fn break_pipe(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BridgeSession for Arc<MockSession> {
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Disconnected);
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        self.sent.lock().push(Bytes::copy_from_slice(payload));
        Ok(())
    }

    async fn recv(&self) -> Result<Bytes, TransportError> {
        Err(TransportError::Disconnected)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out [`MockSession`]s
#[derive(Default)]
pub struct MockConnector {
    sessions: Mutex<Vec<Arc<MockSession>>>,
    fail_next: AtomicBool,
    latency: Duration,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure simulated send latency for sessions opened from now on
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next connect attempt fail
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().iter().filter(|s| !s.is_closed()).count()
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(
        &self,
        _bridge: &BridgeDescriptor,
    ) -> Result<Box<dyn BridgeSession>, TransportError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )));
        }
        let session = Arc::new(MockSession {
            latency: self.latency,
            ..MockSession::default()
        });
        self.sessions.lock().push(session.clone());
        Ok(Box::new(session))
    }
}

// ============================================================================
// Recording sink
// ============================================================================

/// Frame sink that records hand-offs in order
pub struct RecordingSink {
    frames: Mutex<Vec<Bytes>>,
    connected: AtomicBool,
    max_jitter: Duration,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            max_jitter: Duration::ZERO,
        }
    }

    /// Delay each hand-off by a random amount up to `max`
    pub fn with_jitter(mut self, max: Duration) -> Self {
        self.max_jitter = max;
        self
    }

    pub fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().clone()
    }

    /// Simulate disconnect
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send_frame(&self, payload: Bytes) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if !self.max_jitter.is_zero() {
            let micros = self.max_jitter.as_micros() as u64;
            let delay = rand::thread_rng().gen_range(0..=micros);
            sleep(Duration::from_micros(delay)).await;
        }
        self.frames.lock().push(payload);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Loopback bridge
// ============================================================================

/// Bridge relay on 127.0.0.1 that accepts the obfuscated handshake and
/// records every payload it receives.
pub struct LoopbackBridge {
    addr: SocketAddr,
    public_key: [u8; 32],
    received: Arc<Mutex<Vec<Bytes>>>,
    accepted: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl LoopbackBridge {
    pub async fn start() -> Result<Self, TransportError> {
        let identity = Arc::new(KexKeyPair::generate()?);
        let public_key = identity.public_bytes();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let received = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        let task = {
            let received = received.clone();
            let accepted = accepted.clone();
            let active = active.clone();
            tokio::spawn(async move {
                while let Ok((stream, peer)) = listener.accept().await {
                    let identity = identity.clone();
                    let received = received.clone();
                    let accepted = accepted.clone();
                    let active = active.clone();
                    tokio::spawn(async move {
                        let session = match Obfs4Session::accept(stream, &identity).await {
                            Ok(session) => session,
                            Err(e) => {
                                debug!(%peer, error = %e, "Loopback bridge rejected client");
                                return;
                            }
                        };
                        accepted.fetch_add(1, Ordering::SeqCst);
                        active.fetch_add(1, Ordering::SeqCst);
                        while let Ok(payload) = session.recv().await {
                            received.lock().push(payload);
                        }
                        active.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            })
        };

        Ok(Self {
            addr,
            public_key,
            received,
            accepted,
            active,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    pub fn descriptor(&self) -> BridgeDescriptor {
        BridgeDescriptor::from_parts(self.addr.to_string(), self.public_key)
    }

    pub fn received(&self) -> Vec<Bytes> {
        self.received.lock().clone()
    }

    /// Handshakes completed so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Sessions currently open on the bridge side
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Poll until `n` payloads have arrived or `timeout` passes.
    pub async fn wait_for_frames(&self, n: usize, timeout: Duration) -> Vec<Bytes> {
        wait_until(timeout, || self.received.lock().len() >= n).await;
        self.received()
    }

    /// Poll until `n` handshakes have completed or `timeout` passes.
    pub async fn wait_for_accepted(&self, n: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.accepted() >= n).await
    }

    /// Poll until exactly `n` sessions are open or `timeout` passes.
    pub async fn wait_for_active(&self, n: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.active() == n).await
    }
}

impl Drop for LoopbackBridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(5)).await;
    }
}
