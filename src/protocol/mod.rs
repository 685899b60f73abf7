//! Protocol definitions and constants
//!
//! Every bridge connection opens with a handshake:
//!
//! ```text
//! +------+------+------+------+------+---------------------------+
//! |      MAGIC "NRPA" (4B)    | TYPE | CORRELATION ID (16B)      |
//! +------+------+------+------+------+---------------------------+
//!                                      only present when TYPE = 1
//! ```
//!
//! The relay then drives the control channel with fixed 17-byte commands:
//!
//! ```text
//! +------+-------------------------------------------+
//! | CMD  |              PAYLOAD (16B)                |
//! +------+-------------------------------------------+
//!  0x00 heartbeat (zero payload)
//!  0x01 request connect (payload = correlation id)
//! ```

mod command;
mod handshake;

pub use command::Command;
pub use handshake::{ConnectionType, Handshake};

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid magic bytes: {0:02x?}")]
    InvalidMagic([u8; 4]),

    #[error("Invalid connection type: {0}")]
    InvalidConnectionType(u8),

    #[error("Unknown command: {0:#04x}")]
    UnknownCommand(u8),

    #[error("Truncated {0}")]
    Truncated(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Magic bytes opening every handshake ("NRPA")
pub const MAGIC: [u8; 4] = [0x4E, 0x52, 0x50, 0x41];

/// Length of a correlation id on the wire
pub const CORRELATION_ID_LEN: usize = 16;

/// Length of a control command frame: command byte + 16-byte payload
pub const COMMAND_FRAME_LEN: usize = 1 + CORRELATION_ID_LEN;

/// Copy buffer size used by the forwarding engine
pub const FORWARD_BUFFER_SIZE: usize = 8192;

/// Time allowed for a bridge connection to complete its handshake
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Time a public connection waits for its data channel
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between heartbeats on the control channel
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Delay before the tunnel client re-establishes its control channel
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Delay before an accept loop retries after an accept error
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// 128-bit id linking one public connection to the data channel serving it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Mint a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from wire bytes
    pub fn from_bytes(bytes: [u8; CORRELATION_ID_LEN]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get wire bytes
    pub fn as_bytes(&self) -> &[u8; CORRELATION_ID_LEN] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_unique() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        assert_ne!(a, b);
        assert_eq!(CorrelationId::from_bytes(*a.as_bytes()), a);
    }
}
