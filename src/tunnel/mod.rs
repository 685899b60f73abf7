//! Tunnel layer - moving bytes between the public side and the bridge
//!
//! Provides the forwarding engine shared by the relay (public connection <->
//! data channel) and the tunnel client (target connection <-> data channel).

mod forward;

pub use forward::{forward, ForwardStats};
