//! The interception engine: per-side protocol stacks, the security state
//! machine, channel pipelines with their stealers, the session recorder and
//! the orchestrator tying the two sides together.
//!
//! Everything here is sans-IO: bytes go in through
//! [`RdpMitm::bytes_from_front`] / [`RdpMitm::bytes_from_back`] and the
//! engine answers with [`MitmAction`]s for the transport driver to perform.

#[macro_use]
extern crate tracing;

pub mod artifact;
pub mod channels;
pub mod layer;
pub mod mitm;
pub mod recorder;
pub mod secure;
pub mod stacks;

pub use mitm::{MitmAction, MitmConfig, RdpMitm};
pub use recorder::{PlayerMessagePdu, PlayerMessageType, Recorder, RecordingSink};
pub use stacks::MitmEvent;

use rdpspy_pdu::crypto::CryptoError;
use rdpspy_pdu::PduError;
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

/// A session-fatal error; the orchestrator tears both sides down when one
/// bubbles up. Stealer and recorder failures are contained and never become
/// a `SessionError`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("PDU error: {0}")]
    Pdu(#[from] PduError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    #[error("unsupported feature: {0}")]
    Unsupported(&'static str),
    #[error("unknown segmentation header: 0x{0:02x}")]
    UnknownHeader(u8),
}

/// The two TCP endpoints of a session.
///
/// `Front` faces the victim (the proxy acts as the RDP server there);
/// `Back` faces the real server (the proxy acts as the RDP client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Front,
    Back,
}

impl Side {
    pub fn peer(self) -> Side {
        match self {
            Side::Front => Side::Back,
            Side::Back => Side::Front,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Front => "front",
            Side::Back => "back",
        }
    }
}

impl core::fmt::Display for Side {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
