//! Transport layer
//!
//! Provides:
//! - [`CipherStream`], the keystream-obfuscated wrapper used on every bridge connection
//! - [`connect`], a TCP dial with timeout and `TCP_NODELAY`

mod cipher;

pub use cipher::{CipherReadHalf, CipherStream, CipherWriteHalf};

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};

/// Transport layer errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    Closed,

    #[error("Timeout")]
    Timeout,
}

/// Dial a TCP endpoint
pub async fn connect<A>(addr: A, timeout: Duration) -> Result<TcpStream, TransportError>
where
    A: ToSocketAddrs + std::fmt::Display,
{
    let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;

    // Small control frames must not wait on Nagle
    stream.set_nodelay(true).ok();

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect() {
        // Start a simple echo server
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(&buf[..n]).await.unwrap();
        });

        let mut stream = connect(addr, Duration::from_secs(5)).await.unwrap();
        assert!(stream.nodelay().unwrap());

        stream.write_all(b"Hello, TCP!").await.unwrap();
        let mut buf = [0u8; 11];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"Hello, TCP!");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(addr, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }
}
