//! Position-dependent XOR keystream
//!
//! The byte at absolute stream offset `i` is combined with
//! `key[i % KEY_LEN]`. Encryption and decryption are the same operation,
//! so a sender and receiver stay in sync as long as both have processed
//! exactly the same number of bytes.

use super::{SharedKey, KEY_LEN};
use std::sync::Arc;

/// One direction of keystream state for a single connection
#[derive(Debug, Clone)]
pub struct Keystream {
    key: Arc<SharedKey>,
    /// Total bytes processed in this direction (wrapping)
    offset: u64,
}

impl Keystream {
    /// Create a keystream positioned at offset 0
    pub fn new(key: Arc<SharedKey>) -> Self {
        Self { key, offset: 0 }
    }

    /// Bytes processed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// XOR `data` in place against the keystream and advance by `data.len()`
    pub fn apply(&mut self, data: &mut [u8]) {
        self.xor(data);
        self.advance(data.len());
    }

    /// XOR `data` in place starting at the current offset, without advancing
    pub fn xor(&self, data: &mut [u8]) {
        let key = self.key.as_bytes();
        // 2^64 is a multiple of KEY_LEN, so the position survives wrapping.
        let mut pos = (self.offset % KEY_LEN as u64) as usize;

        for byte in data.iter_mut() {
            *byte ^= key[pos];
            pos += 1;
            if pos == KEY_LEN {
                pos = 0;
            }
        }
    }

    /// Advance the offset by `n` bytes
    pub fn advance(&mut self, n: usize) {
        self.offset = self.offset.wrapping_add(n as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keystream(password: &str) -> Keystream {
        Keystream::new(Arc::new(SharedKey::from_password(password)))
    }

    #[test]
    fn test_chunking_independent() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 251) as u8).collect();

        let mut whole = data.clone();
        keystream("pw").apply(&mut whole);

        let mut chunked = data.clone();
        let mut ks = keystream("pw");
        for chunk in chunked.chunks_mut(13) {
            ks.apply(chunk);
        }

        assert_eq!(whole, chunked);
        assert_eq!(ks.offset(), 1000);
    }

    #[test]
    fn test_encrypt_decrypt() {
        let original = b"The quick brown fox jumps over the lazy dog, twice over.".to_vec();

        let mut buf = original.clone();
        let mut sender = keystream("pw");
        let mut receiver = keystream("pw");
        sender.apply(&mut buf[..20]);
        sender.apply(&mut buf[20..]);
        assert_ne!(buf, original);
        receiver.apply(&mut buf[..7]);
        receiver.apply(&mut buf[7..]);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_desync_corrupts_rest_of_stream() {
        let original: Vec<u8> = (0..200u8).collect();
        let mut ciphertext = original.clone();
        keystream("pw").apply(&mut ciphertext);

        // Drop one byte in transit. SHA-256("pw") has no two equal adjacent
        // bytes, so every later byte decrypts wrongly.
        let received = &ciphertext[1..];
        let mut plaintext = received.to_vec();
        keystream("pw").apply(&mut plaintext);

        for (i, byte) in plaintext.iter().enumerate() {
            assert_ne!(*byte, original[i + 1], "byte {} decrypted despite desync", i);
        }
    }

    #[test]
    fn test_wraparound_keeps_position() {
        let mut near_end = keystream("pw");
        near_end.offset = u64::MAX - 3;
        let mut start = keystream("pw");
        start.offset = (u64::MAX - 3) % KEY_LEN as u64;

        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        near_end.apply(&mut a);
        start.apply(&mut b);

        assert_eq!(a, b);
        assert_eq!(near_end.offset(), 60);
    }
}
