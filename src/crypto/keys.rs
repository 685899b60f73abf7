//! Shared key management

use super::KEY_LEN;
use ring::digest::{digest, SHA256};
use std::fmt;

/// Symmetric key shared by relay and tunnel client, derived from the password
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey([u8; KEY_LEN]);

impl SharedKey {
    /// Derive the key as SHA-256 over the UTF-8 bytes of the password
    pub fn from_password(password: &str) -> Self {
        let hash = digest(&SHA256, password.as_bytes());
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(hash.as_ref());
        Self(key)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedKey([REDACTED])")
    }
}

// Zeroize key material on drop
impl Drop for SharedKey {
    fn drop(&mut self) {
        for byte in &mut self.0 {
            unsafe {
                std::ptr::write_volatile(byte, 0);
            }
        }
        std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // SHA-256("abc")
        let key = SharedKey::from_password("abc");
        assert_eq!(key.as_bytes()[..4], [0xba, 0x78, 0x16, 0xbf]);
        assert_eq!(key.as_bytes()[28..], [0xf2, 0x00, 0x15, 0xad]);
    }

    #[test]
    fn test_different_passwords() {
        assert_ne!(SharedKey::from_password("pw"), SharedKey::from_password("pw2"));
        assert_eq!(SharedKey::from_password("pw"), SharedKey::from_password("pw"));
    }

    #[test]
    fn test_debug_redacted() {
        let key = SharedKey::from_password("secret");
        assert_eq!(format!("{:?}", key), "SharedKey([REDACTED])");
    }
}
