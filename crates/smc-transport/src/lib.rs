//! Censorship-resistant transport for the secure messenger core.
//!
//! Two concerns live here: an obfs4-style handshake and framed session to a
//! bridge relay (with the session state machine that owns it), and the
//! blockage classifier that tells the caller how a target is being blocked.

pub mod blockage;
pub mod bridge;
pub mod doh;
pub mod error;
pub mod framing;
pub mod obfs4;
pub mod session;
pub mod testing;
pub mod traits;

pub use blockage::{BlockageClassifier, BlockageReport, BlockageVerdict, ProbeConfig, ProbeStage};
pub use bridge::BridgeDescriptor;
pub use doh::{DohResolver, DEFAULT_DOH_ENDPOINTS};
pub use error::TransportError;
pub use framing::{FramingError, LengthCodec, MAX_PAYLOAD_LEN};
pub use obfs4::{Obfs4Connector, Obfs4Session};
pub use session::{SessionState, TransportManager, TransportStatus, DEFAULT_SEND_TIMEOUT};
pub use traits::{BridgeSession, FrameSink, SessionConnector};
