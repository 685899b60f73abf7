//! # Reverse Tunnel
//!
//! Exposes a TCP service running behind NAT or a firewall through a public
//! relay. The tunnel client dials out to the relay, holds a persistent control
//! channel, and opens a fresh data channel every time a public user connects.
//!
//! ## Architecture
//!
//! ```text
//!  public user            relay (server)                tunnel client          target
//!  ───────────     ┌──────────────────────────┐     ┌────────────────────┐    ──────
//!                  │ bridge port  <───────────┼─────┤ control channel    │
//!  connect ──────> │ public port              │     │  (heartbeat, 0x01) │
//!                  │   mint id, send 0x01 ────┼────>│                    │
//!                  │ bridge port  <───────────┼─────┤ data channel (id)  │
//!     <══ plain ══>│   match id, forward      │<═══>│   forward  <═ plain ═> service
//!                  └──────────────────────────┘     └────────────────────┘
//! ```
//!
//! Every bridge connection (control and data) is wrapped in a
//! [`transport::CipherStream`], a keyed XOR keystream derived from the shared
//! password. It is obfuscation, not a security boundary.

pub mod client;
pub mod config;
pub mod crypto;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod tunnel;

pub use client::TunnelClient;
pub use config::Config;
pub use server::RelayServer;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection closed")]
    ConnectionClosed,
}
