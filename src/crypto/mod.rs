//! Key derivation and keystream primitives
//!
//! This module provides:
//! - SHA-256 derivation of the shared key from the tunnel password
//! - The position-dependent XOR keystream applied to bridge connections
//!
//! The keystream is obfuscation only: there is no authentication and no
//! integrity check. A single dropped or corrupted byte desynchronizes the
//! rest of the connection.

mod keys;
mod keystream;

pub use keys::SharedKey;
pub use keystream::Keystream;

/// Length of the shared key in bytes (SHA-256 output)
pub const KEY_LEN: usize = 32;
