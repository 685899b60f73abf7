//! Keystream-obfuscated byte stream
//!
//! [`CipherStream`] wraps any `AsyncRead + AsyncWrite` transport and applies
//! an independent [`Keystream`] per direction. Writes encrypt a private copy
//! of the caller's buffer, so plaintext buffers can be reused. Reads decrypt
//! in place. A keystream only advances by the number of bytes the inner
//! transport actually accepted or produced, which keeps both peers aligned
//! under partial reads and writes.

use crate::crypto::{Keystream, SharedKey};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, ReadHalf, WriteHalf};

/// Upper bound on bytes encrypted per `poll_write` call
const MAX_WRITE_CHUNK: usize = 64 * 1024;

/// A connection with keystream obfuscation in both directions
#[derive(Debug)]
pub struct CipherStream<S> {
    inner: S,
    send: Keystream,
    recv: Keystream,
    scratch: Vec<u8>,
}

impl<S> CipherStream<S> {
    /// Wrap a transport; both offsets start at 0
    pub fn new(inner: S, key: Arc<SharedKey>) -> Self {
        Self {
            inner,
            send: Keystream::new(Arc::clone(&key)),
            recv: Keystream::new(key),
            scratch: Vec::new(),
        }
    }

    /// Bytes sent so far
    pub fn bytes_sent(&self) -> u64 {
        self.send.offset()
    }

    /// Bytes received so far
    pub fn bytes_received(&self) -> u64 {
        self.recv.offset()
    }
}

impl<S: AsyncRead + AsyncWrite> CipherStream<S> {
    /// Split into independently owned halves, each carrying its own keystream
    pub fn split(self) -> (CipherReadHalf<ReadHalf<S>>, CipherWriteHalf<WriteHalf<S>>) {
        let (read, write) = tokio::io::split(self.inner);
        (
            CipherReadHalf {
                inner: read,
                recv: self.recv,
            },
            CipherWriteHalf {
                inner: write,
                send: self.send,
                scratch: self.scratch,
            },
        )
    }
}

/// Receiving half of a [`CipherStream`]
#[derive(Debug)]
pub struct CipherReadHalf<R> {
    inner: R,
    recv: Keystream,
}

/// Sending half of a [`CipherStream`]
#[derive(Debug)]
pub struct CipherWriteHalf<W> {
    inner: W,
    send: Keystream,
    scratch: Vec<u8>,
}

fn poll_read_decrypt<R: AsyncRead + Unpin>(
    inner: &mut R,
    recv: &mut Keystream,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
) -> Poll<io::Result<()>> {
    let filled_before = buf.filled().len();
    ready!(Pin::new(inner).poll_read(cx, buf))?;
    recv.apply(&mut buf.filled_mut()[filled_before..]);
    Poll::Ready(Ok(()))
}

fn poll_write_encrypt<W: AsyncWrite + Unpin>(
    inner: &mut W,
    send: &mut Keystream,
    scratch: &mut Vec<u8>,
    cx: &mut Context<'_>,
    buf: &[u8],
) -> Poll<io::Result<usize>> {
    if buf.is_empty() {
        return Pin::new(inner).poll_write(cx, buf);
    }

    // Re-encrypt from the current offset on every call: a Pending or short
    // write leaves the unsent tail to be offered again by the caller.
    let chunk = &buf[..buf.len().min(MAX_WRITE_CHUNK)];
    scratch.clear();
    scratch.extend_from_slice(chunk);
    send.xor(scratch);

    let written = ready!(Pin::new(inner).poll_write(cx, scratch))?;
    send.advance(written);
    Poll::Ready(Ok(written))
}

impl<S: AsyncRead + Unpin> AsyncRead for CipherStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        poll_read_decrypt(&mut this.inner, &mut this.recv, cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CipherStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        poll_write_encrypt(&mut this.inner, &mut this.send, &mut this.scratch, cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CipherReadHalf<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        poll_read_decrypt(&mut this.inner, &mut this.recv, cx, buf)
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for CipherWriteHalf<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        poll_write_encrypt(&mut this.inner, &mut this.send, &mut this.scratch, cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn key(password: &str) -> Arc<SharedKey> {
        Arc::new(SharedKey::from_password(password))
    }

    #[tokio::test]
    async fn test_roundtrip_over_duplex() {
        // Small duplex capacity forces partial writes and reads
        let (a, b) = tokio::io::duplex(7);
        let mut sender = CipherStream::new(a, key("pw"));
        let mut receiver = CipherStream::new(b, key("pw"));

        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
        let expected = payload.clone();

        let writer = tokio::spawn(async move {
            for chunk in payload.chunks(333) {
                sender.write_all(chunk).await.unwrap();
            }
            sender.shutdown().await.unwrap();
            sender.bytes_sent()
        });

        let mut received = Vec::new();
        receiver.read_to_end(&mut received).await.unwrap();

        assert_eq!(received, expected);
        assert_eq!(writer.await.unwrap(), 5000);
        assert_eq!(receiver.bytes_received(), 5000);
    }

    #[tokio::test]
    async fn test_send_does_not_mutate_caller_buffer() {
        let (a, mut b) = tokio::io::duplex(1024);
        let mut sender = CipherStream::new(a, key("pw"));

        let plaintext = b"reuse me".to_vec();
        sender.write_all(&plaintext).await.unwrap();
        sender.write_all(&plaintext).await.unwrap();
        assert_eq!(plaintext, b"reuse me");

        let mut wire = [0u8; 16];
        b.read_exact(&mut wire).await.unwrap();
        // Same plaintext at different offsets must not produce the same bytes
        assert_ne!(&wire[..8], plaintext.as_slice());
        assert_ne!(wire[..8], wire[8..]);
    }

    #[tokio::test]
    async fn test_wrong_password_garbles() {
        let (a, b) = tokio::io::duplex(1024);
        let mut sender = CipherStream::new(a, key("pw"));
        let mut receiver = CipherStream::new(b, key("other"));

        sender.write_all(b"hello world").await.unwrap();
        let mut buf = [0u8; 11];
        receiver.read_exact(&mut buf).await.unwrap();
        assert_ne!(&buf, b"hello world");
    }

    #[tokio::test]
    async fn test_split_halves_keep_offsets() {
        let (a, b) = tokio::io::duplex(1024);
        let mut left = CipherStream::new(a, key("pw"));
        let mut right = CipherStream::new(b, key("pw"));

        // Advance the receive offset before splitting
        left.write_all(b"abc").await.unwrap();
        let mut buf = [0u8; 3];
        right.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");
        let (mut right_read, mut right_write) = right.split();

        right_write.write_all(b"pong").await.unwrap();
        left.write_all(b"defgh").await.unwrap();

        let mut buf = [0u8; 4];
        left.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        let mut buf = [0u8; 5];
        right_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"defgh");
    }
}
