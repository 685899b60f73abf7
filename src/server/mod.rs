//! Relay server
//!
//! Listens on two ports:
//! - the **bridge** port, where the tunnel client registers its control
//!   channel and later opens one data channel per public connection
//! - the **public** port, where users connect
//!
//! At most one control channel is registered at a time; a new Control
//! handshake always replaces (and force-closes) the current one.

mod control;
mod pending;

pub use control::ControlChannel;
pub use pending::{PendingRequest, PendingRequests, WaitError};

use crate::config::ServerConfig;
use crate::crypto::SharedKey;
use crate::protocol::{Command, CorrelationId, Handshake};
use crate::transport::{CipherReadHalf, CipherStream, CipherWriteHalf};
use crate::tunnel::forward;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncReadExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, trace, warn};

type ControlWriter = CipherWriteHalf<WriteHalf<TcpStream>>;
type ControlReader = CipherReadHalf<ReadHalf<TcpStream>>;
type DataChannel = CipherStream<TcpStream>;
type ControlSlot = Option<Arc<ControlChannel<ControlWriter>>>;

/// The public relay
pub struct RelayServer {
    config: ServerConfig,
    key: Arc<SharedKey>,
    /// The single control channel slot
    control: Mutex<ControlSlot>,
    /// Public connections waiting for their data channel
    pending: Arc<PendingRequests<DataChannel>>,
    /// Optional admission cap on public connections
    limiter: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Create a relay from validated configuration
    pub fn new(config: ServerConfig) -> crate::Result<Arc<Self>> {
        config.validate()?;

        let key = Arc::new(SharedKey::from_password(&config.password));
        let limiter = config.max_connections.map(|n| Arc::new(Semaphore::new(n)));

        Ok(Arc::new(Self {
            config,
            key,
            control: Mutex::new(None),
            pending: PendingRequests::new(),
            limiter,
        }))
    }

    /// Bind both listeners from the configuration and serve forever
    pub async fn run(self: Arc<Self>) -> crate::Result<()> {
        let bridge = TcpListener::bind(self.config.bridge_addr()).await?;
        let public = TcpListener::bind(self.config.public_addr()).await?;

        info!("Bridge port: {}", bridge.local_addr()?);
        info!("Public port: {}", public.local_addr()?);

        self.serve(bridge, public).await
    }

    /// Serve on already-bound listeners
    pub async fn serve(self: Arc<Self>, bridge: TcpListener, public: TcpListener) -> crate::Result<()> {
        info!("Relay ready, waiting for connections");

        tokio::join!(
            Arc::clone(&self).accept_bridge(bridge),
            Arc::clone(&self).accept_public(public),
        );

        error!("Relay accept loops stopped unexpectedly");
        Ok(())
    }

    /// Whether a live control channel is registered
    pub fn has_control(&self) -> bool {
        self.active_control().is_some()
    }

    /// Number of public connections waiting for a data channel
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn control_slot(&self) -> MutexGuard<'_, ControlSlot> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the registered control channel, if it is still connected
    fn active_control(&self) -> ControlSlot {
        self.control_slot()
            .as_ref()
            .filter(|channel| channel.is_connected())
            .cloned()
    }

    async fn accept_bridge(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    trace!("Bridge connection from {}", peer);
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_bridge(stream, peer).await;
                    });
                }
                Err(e) => {
                    error!("Bridge accept error: {}", e);
                    tokio::time::sleep(self.config.accept_retry()).await;
                }
            }
        }
    }

    async fn accept_public(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    trace!("Public connection from {}", peer);
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_public(stream, peer).await;
                    });
                }
                Err(e) => {
                    error!("Public accept error: {}", e);
                    tokio::time::sleep(self.config.accept_retry()).await;
                }
            }
        }
    }

    /// Read the handshake and dispatch by connection type
    async fn handle_bridge(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        stream.set_nodelay(true).ok();
        let mut stream = CipherStream::new(stream, Arc::clone(&self.key));

        let handshake = match tokio::time::timeout(
            self.config.handshake_timeout(),
            Handshake::read_from(&mut stream),
        )
        .await
        {
            Ok(Ok(handshake)) => handshake,
            Ok(Err(e)) => {
                warn!("Handshake failed from {}: {}", peer, e);
                return;
            }
            Err(_) => {
                warn!("Handshake timed out from {}", peer);
                return;
            }
        };

        match handshake {
            Handshake::Control => self.register_control(stream, peer).await,
            Handshake::Data(id) => {
                if self.pending.resolve(&id, stream).is_err() {
                    warn!("Rejected data channel from {} with unknown id {}", peer, id);
                } else {
                    debug!("Data channel {} matched from {}", id, peer);
                }
            }
        }
    }

    /// Install a new control channel, replacing any existing one
    async fn register_control(self: Arc<Self>, stream: DataChannel, peer: SocketAddr) {
        let (reader, writer) = stream.split();
        let channel = Arc::new(ControlChannel::new(writer, peer));

        let previous = self.control_slot().replace(Arc::clone(&channel));
        if let Some(previous) = previous {
            info!("Replacing control channel from {}", previous.peer());
            previous.close();
        }
        info!("Control channel registered from {}", peer);

        tokio::spawn(Arc::clone(&channel).run_heartbeat(self.config.heartbeat_interval()));

        self.monitor_control(&channel, reader).await;
        self.clear_control(&channel);
    }

    /// Watch the control channel until the peer closes it, it fails, or it is replaced
    async fn monitor_control(&self, channel: &ControlChannel<ControlWriter>, mut reader: ControlReader) {
        let mut buf = [0u8; 1024];
        loop {
            tokio::select! {
                _ = channel.closed() => {
                    debug!("Control channel from {} closed locally", channel.peer());
                    break;
                }
                result = reader.read(&mut buf) => match result {
                    Ok(0) => {
                        info!("Control channel from {} disconnected", channel.peer());
                        break;
                    }
                    Ok(n) => {
                        warn!("Ignoring {} unexpected bytes on control channel from {}", n, channel.peer());
                    }
                    Err(e) => {
                        error!("Control channel from {} failed: {}", channel.peer(), e);
                        break;
                    }
                },
            }
        }
    }

    /// Clear the slot if `channel` still occupies it, then close it
    fn clear_control(&self, channel: &Arc<ControlChannel<ControlWriter>>) {
        {
            let mut slot = self.control_slot();
            if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, channel)) {
                slot.take();
                info!("Control channel from {} cleared", channel.peer());
            }
        }
        channel.close();
    }

    /// Ask the tunnel client for a data channel and forward the public connection over it
    async fn handle_public(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let _permit = match &self.limiter {
            Some(limiter) => match Arc::clone(limiter).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!("Connection limit reached, rejecting {}", peer);
                    return;
                }
            },
            None => None,
        };

        let Some(control) = self.active_control() else {
            debug!("No active control channel, rejecting {}", peer);
            return;
        };
        stream.set_nodelay(true).ok();

        let mut request = self.pending.register(CorrelationId::generate());
        let id = request.id();
        debug!("Public connection {} from {}", id, peer);

        if let Err(e) = control.send(Command::RequestConnect(id)).await {
            warn!("Failed to request data channel {}: {}", id, e);
            return;
        }

        let outcome = request.wait(self.config.request_timeout()).await;
        drop(request);

        match outcome {
            Ok(data) => {
                let stats = forward(stream, data).await;
                debug!(
                    "Connection {} finished: {} bytes up, {} bytes down",
                    id, stats.outbound, stats.inbound
                );
            }
            Err(WaitError::TimedOut) => {
                warn!("No data channel for {} within {:?}", id, self.config.request_timeout());
            }
            Err(WaitError::Abandoned) => {
                warn!("Request {} abandoned", id);
            }
        }
    }
}
