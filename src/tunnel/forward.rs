//! Full-duplex forwarding between a plaintext connection and a cipher stream

use crate::protocol::FORWARD_BUFFER_SIZE;
use crate::transport::CipherStream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Byte counts for one finished forward
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    /// Plaintext side -> cipher side
    pub outbound: u64,
    /// Cipher side -> plaintext side
    pub inbound: u64,
}

/// Forward bytes both ways until each direction reaches EOF or fails
///
/// Each direction half-closes its destination when its source ends, so the
/// opposite direction keeps draining. Returns once both directions are done;
/// both connections are closed when their halves drop. Transfer errors are
/// treated as ordinary termination.
pub async fn forward<P, C>(plain: P, cipher: CipherStream<C>) -> ForwardStats
where
    P: AsyncRead + AsyncWrite,
    C: AsyncRead + AsyncWrite,
{
    let (plain_read, plain_write) = tokio::io::split(plain);
    let (cipher_read, cipher_write) = cipher.split();

    let (outbound, inbound) = tokio::join!(
        pipe(plain_read, cipher_write, "plain->cipher"),
        pipe(cipher_read, plain_write, "cipher->plain"),
    );

    ForwardStats { outbound, inbound }
}

/// Copy `src` into `dst` with a fixed reusable buffer, then half-close `dst`
async fn pipe<R, W>(mut src: R, mut dst: W, direction: &'static str) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; FORWARD_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match src.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                trace!("{} read ended: {}", direction, e);
                break;
            }
        };
        if let Err(e) = dst.write_all(&buf[..n]).await {
            trace!("{} write ended: {}", direction, e);
            break;
        }
        total += n as u64;
    }

    dst.shutdown().await.ok();
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SharedKey;
    use std::sync::Arc;

    fn key() -> Arc<SharedKey> {
        Arc::new(SharedKey::from_password("pw"))
    }

    #[tokio::test]
    async fn test_forward_both_directions_with_half_close() {
        // user <-> [plain | forward | cipher] <-> peer
        let (user, plain) = tokio::io::duplex(1024);
        let (cipher_side, peer) = tokio::io::duplex(1024);

        let task = tokio::spawn(forward(plain, CipherStream::new(cipher_side, key())));

        let mut peer = CipherStream::new(peer, key());
        let (mut user_read, mut user_write) = tokio::io::split(user);

        user_write.write_all(b"request").await.unwrap();
        user_write.shutdown().await.unwrap();

        // Peer sees the request then EOF, but can still answer
        let mut request = Vec::new();
        peer.read_to_end(&mut request).await.unwrap();
        assert_eq!(request, b"request");

        peer.write_all(b"response body").await.unwrap();
        peer.shutdown().await.unwrap();

        let mut response = Vec::new();
        user_read.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"response body");

        let stats = task.await.unwrap();
        assert_eq!(stats, ForwardStats { outbound: 7, inbound: 13 });
    }

    #[tokio::test]
    async fn test_forward_ends_when_peer_drops() {
        let (user, plain) = tokio::io::duplex(64);
        let (cipher_side, peer) = tokio::io::duplex(64);

        let task = tokio::spawn(forward(plain, CipherStream::new(cipher_side, key())));

        drop(peer);
        drop(user);

        let stats = task.await.unwrap();
        assert_eq!(stats, ForwardStats::default());
    }
}
