//! Outbound message dispatch.
//!
//! A message is signed with the process identity, wrapped in an envelope
//! carrying a per-conversation sequence number, and handed to the transport
//! as one frame. Each conversation has its own async lock held from signing
//! until the frame is handed off, so one chat's messages leave in the order
//! they were submitted while different chats proceed in parallel.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use smc_crypto::{parse_public_key, verify_with_key};
use smc_transport::FrameSink;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::CoreError;
use crate::identity::IdentityManager;

// ============================================================================
// Envelope
// ============================================================================

/// Wire envelope handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub seq: u64,
    pub body: String,
    /// Sender public key (hex)
    pub sender: String,
    /// Ed25519 signature over `body` (hex)
    pub signature: String,
    pub sent_at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::Protocol(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(data).map_err(|e| CoreError::Protocol(e.to_string()))
    }

    /// Check the signature against the sender key carried in the envelope.
    pub fn verify(&self) -> Result<bool, CoreError> {
        let key = parse_public_key(&self.sender)?;
        let Ok(signature) = hex::decode(&self.signature) else {
            return Ok(false);
        };
        Ok(verify_with_key(&key, self.body.as_bytes(), &signature))
    }
}

/// What was handed off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub chat_id: i64,
    pub seq: u64,
    pub frame_len: usize,
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct MessageDispatcher {
    identity: Arc<IdentityManager>,
    sink: Arc<dyn FrameSink>,
    /// Next sequence number per conversation
    chats: DashMap<i64, Arc<Mutex<u64>>>,
}

impl MessageDispatcher {
    pub fn new(identity: Arc<IdentityManager>, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            identity,
            sink,
            chats: DashMap::new(),
        }
    }

    fn chat_lock(&self, chat_id: i64) -> Arc<Mutex<u64>> {
        // Clone out of the map so the shard lock is not held across await.
        self.chats
            .entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(0)))
            .clone()
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
    ) -> Result<DispatchReceipt, CoreError> {
        let lock = self.chat_lock(chat_id);
        let mut next_seq = lock.lock().await;

        let message = self.identity.with_identity(|identity| OutboundMessage {
            chat_id,
            seq: *next_seq,
            body: text.to_string(),
            sender: identity.public_key_hex(),
            signature: identity.sign_hex(text.as_bytes()),
            sent_at: Utc::now(),
        })?;

        if !self.sink.is_connected() {
            debug!(chat_id, "No transport session for outbound message");
            return Err(smc_transport::TransportError::NotConnected.into());
        }
        let frame = Bytes::from(message.to_bytes()?);
        let frame_len = frame.len();

        if let Err(e) = self.sink.send_frame(frame).await {
            warn!(chat_id, seq = message.seq, error = %e, "Failed to hand off message");
            return Err(e.into());
        }

        // Only a delivered message consumes its sequence number.
        *next_seq += 1;
        debug!(chat_id, seq = message.seq, bytes = frame_len, "Message handed to transport");

        Ok(DispatchReceipt {
            chat_id,
            seq: message.seq,
            frame_len,
        })
    }

    /// Number of conversations seen so far.
    pub fn conversation_count(&self) -> usize {
        self.chats.len()
    }
}
