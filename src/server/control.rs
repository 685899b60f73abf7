//! The relay's handle on a registered control channel

use crate::protocol::Command;
use crate::transport::TransportError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tracing::{debug, trace};

/// Write side of a control channel plus its liveness flag
///
/// All commands go through one writer lock so heartbeat and request frames
/// never interleave. Once closed, the channel refuses every further write
/// and releases its writer.
#[derive(Debug)]
pub struct ControlChannel<W> {
    peer: SocketAddr,
    writer: Mutex<Option<W>>,
    closed: watch::Sender<bool>,
}

impl<W> ControlChannel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W, peer: SocketAddr) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            peer,
            writer: Mutex::new(Some(writer)),
            closed,
        }
    }

    /// Remote address of the tunnel client
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_connected(&self) -> bool {
        !*self.closed.borrow()
    }

    /// Resolves once the channel has been closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        loop {
            let is_closed = *rx.borrow_and_update();
            if is_closed || rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Mark the channel closed and drop the writer if it is idle
    ///
    /// A writer busy in [`send`](Self::send) drops it on its way out.
    /// Returns `false` if the channel was already closed.
    pub fn close(&self) -> bool {
        let was_closed = self.closed.send_replace(true);
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        !was_closed
    }

    /// Send one command frame
    pub async fn send(&self, command: Command) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }

        let frame = command.encode();
        let mut guard = self.writer.lock().await;
        if !self.is_connected() {
            guard.take();
            return Err(TransportError::Closed);
        }
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;

        let result = tokio::select! {
            res = async {
                writer.write_all(&frame).await?;
                writer.flush().await
            } => res.map_err(TransportError::Io),
            _ = self.closed() => Err(TransportError::Closed),
        };

        if result.is_err() {
            guard.take();
            self.closed.send_replace(true);
        }
        result
    }

    /// Send heartbeats every `interval` until the channel closes or a send fails
    pub async fn run_heartbeat(self: Arc<Self>, interval: Duration) {
        while self.is_connected() {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.closed() => break,
            }

            if let Err(e) = self.send(Command::Heartbeat).await {
                debug!("Heartbeat to {} failed: {}", self.peer, e);
                break;
            }
            trace!("Heartbeat sent to {}", self.peer);
        }
    }
}
