//! Seams between the session state machine, its connector, and its users.

use async_trait::async_trait;
use bytes::Bytes;

use crate::bridge::BridgeDescriptor;
use crate::error::TransportError;

/// An established session to a bridge.
#[async_trait]
pub trait BridgeSession: Send + Sync {
    /// Send one payload as one frame.
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Receive the next payload.
    async fn recv(&self) -> Result<Bytes, TransportError>;

    /// Close the session.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens sessions to bridges.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(
        &self,
        bridge: &BridgeDescriptor,
    ) -> Result<Box<dyn BridgeSession>, TransportError>;
}

/// Where outbound message frames are handed off.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_frame(&self, payload: Bytes) -> Result<(), TransportError>;

    /// Check if a live session exists
    fn is_connected(&self) -> bool;
}
