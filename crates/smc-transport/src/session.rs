//! Bridge session state machine.
//!
//! `Idle -> Connecting -> Established`, and `Connecting -> Failed -> Idle`
//! when the attempt fails. Connect and disconnect are serialized by one
//! async mutex. Sends hold a read lock on the session slot, so teardown
//! waits for in-flight sends instead of racing them. Every send runs under
//! `send_timeout`, which bounds how long teardown can wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, info, warn};

use crate::bridge::BridgeDescriptor;
use crate::error::TransportError;
use crate::framing::{FramingError, MAX_PAYLOAD_LEN};
use crate::obfs4::Obfs4Connector;
use crate::traits::{BridgeSession, FrameSink, SessionConnector};

/// Default deadline for handing one payload to the bridge
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Session state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Established,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Established => "established",
            SessionState::Failed => "failed",
        }
    }
}

/// Snapshot of the transport for status reporting
#[derive(Clone, Debug)]
pub struct TransportStatus {
    pub state: SessionState,
    pub bridge: Option<String>,
    /// When the current state was entered
    pub since: DateTime<Utc>,
    /// Payload bytes sent on the current session
    pub bytes_sent: u64,
}

struct StateInfo {
    state: SessionState,
    bridge: Option<BridgeDescriptor>,
    since: DateTime<Utc>,
}

struct ActiveSession {
    generation: u64,
    session: Box<dyn BridgeSession>,
}

/// Owns the single bridge session of a core instance.
pub struct TransportManager {
    connector: Arc<dyn SessionConnector>,
    transitions: AsyncMutex<()>,
    info: Mutex<StateInfo>,
    session: RwLock<Option<ActiveSession>>,
    generation: AtomicU64,
    bytes_sent: AtomicU64,
    send_timeout: Duration,
}

impl TransportManager {
    pub fn new(connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            connector,
            transitions: AsyncMutex::new(()),
            info: Mutex::new(StateInfo {
                state: SessionState::Idle,
                bridge: None,
                since: Utc::now(),
            }),
            session: RwLock::new(None),
            generation: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Manager backed by the obfs4-style TCP connector.
    pub fn obfs4(connect_timeout: Duration) -> Self {
        Self::new(Arc::new(Obfs4Connector::new(connect_timeout)))
    }

    /// Transition to new state, returning the previous one
    fn transition(&self, new_state: SessionState) -> SessionState {
        let mut info = self.info.lock();
        let old_state = info.state;
        if new_state == SessionState::Idle {
            info.bridge = None;
        }
        info.state = new_state;
        info.since = Utc::now();
        debug!(from = old_state.as_str(), to = new_state.as_str(), "Transport state change");
        old_state
    }

    pub fn state(&self) -> SessionState {
        self.info.lock().state
    }

    pub fn status(&self) -> TransportStatus {
        let info = self.info.lock();
        TransportStatus {
            state: info.state,
            bridge: info.bridge.as_ref().map(|b| b.addr().to_string()),
            since: info.since,
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }

    /// Establish a session to `bridge`, replacing any existing one.
    pub async fn connect(&self, bridge: BridgeDescriptor) -> Result<(), TransportError> {
        let _guard = self.transitions.lock().await;

        if self.teardown_locked().await {
            info!("Replaced existing bridge session");
        }

        self.transition(SessionState::Connecting);
        self.info.lock().bridge = Some(bridge.clone());
        info!(bridge = %bridge, "Connecting to bridge");

        match self.connector.connect(&bridge).await {
            Ok(session) => {
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                *self.session.write().await = Some(ActiveSession {
                    generation,
                    session,
                });
                self.bytes_sent.store(0, Ordering::Relaxed);
                self.transition(SessionState::Established);
                info!(bridge = %bridge, generation, "Bridge session established");
                Ok(())
            }
            Err(e) => {
                warn!(bridge = %bridge, error = %e, "Bridge connection failed");
                self.transition(SessionState::Failed);
                self.transition(SessionState::Idle);
                Err(e)
            }
        }
    }

    /// Close the current session, if any. Returns whether one was closed.
    pub async fn disconnect(&self) -> bool {
        let _guard = self.transitions.lock().await;
        self.teardown_locked().await
    }

    /// Caller must hold `transitions`.
    async fn teardown_locked(&self) -> bool {
        let previous = self.session.write().await.take();
        match previous {
            Some(active) => {
                if let Err(e) = active.session.close().await {
                    debug!(error = %e, "Error while closing bridge session");
                }
                self.transition(SessionState::Idle);
                true
            }
            None => false,
        }
    }

    /// Send one payload over the established session.
    ///
    /// Oversized payloads are refused before the session is touched. A send
    /// that misses `send_timeout` tears the session down, since a partial
    /// frame may already be on the wire.
    pub async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FramingError::TooLarge(payload.len(), MAX_PAYLOAD_LEN).into());
        }

        let (generation, result) = {
            let guard = self.session.read().await;
            let active = guard.as_ref().ok_or(TransportError::NotConnected)?;
            let result = tokio::time::timeout(self.send_timeout, active.session.send(payload))
                .await
                .unwrap_or(Err(TransportError::Timeout));
            (active.generation, result)
        };

        match result {
            Ok(()) => {
                self.bytes_sent
                    .fetch_add(payload.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                if e.is_fatal() || matches!(e, TransportError::Timeout) {
                    warn!(error = %e, "Bridge session broken, tearing down");
                    self.teardown_generation(generation).await;
                }
                Err(e)
            }
        }
    }

    async fn teardown_generation(&self, generation: u64) {
        let _guard = self.transitions.lock().await;
        let current = self.session.read().await.as_ref().map(|a| a.generation);
        if current == Some(generation) {
            self.teardown_locked().await;
        }
    }
}

#[async_trait]
impl FrameSink for TransportManager {
    async fn send_frame(&self, payload: Bytes) -> Result<(), TransportError> {
        self.send(&payload).await
    }

    fn is_connected(&self) -> bool {
        self.state() == SessionState::Established
    }
}
