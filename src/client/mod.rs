//! Tunnel client
//!
//! Runs next to the service being exposed. Keeps a control channel to the
//! relay open forever (reconnecting after a fixed delay on any failure) and,
//! for every RequestConnect command, opens a data channel to the relay and
//! bridges it to the local target.

use crate::config::ClientConfig;
use crate::crypto::SharedKey;
use crate::protocol::{Command, CorrelationId, Handshake, COMMAND_FRAME_LEN};
use crate::transport::{self, CipherStream};
use crate::tunnel::forward;
use crate::Error;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, trace, warn};

/// The tunnel client
pub struct TunnelClient {
    config: ClientConfig,
    key: Arc<SharedKey>,
}

impl TunnelClient {
    /// Create a client from validated configuration
    pub fn new(config: ClientConfig) -> crate::Result<Arc<Self>> {
        config.validate()?;

        let key = Arc::new(SharedKey::from_password(&config.password));
        Ok(Arc::new(Self { config, key }))
    }

    /// Hold the control channel forever, reconnecting after every failure
    pub async fn run(self: Arc<Self>) {
        info!("Target: {}", self.config.target_addr());
        info!("Relay: {}", self.config.server_addr());

        loop {
            match self.run_session().await {
                Ok(()) | Err(Error::ConnectionClosed) => info!("Relay closed the control channel"),
                Err(e) => error!("Control channel error: {}", e),
            }

            info!("Reconnecting in {} seconds...", self.config.reconnect_delay_secs);
            tokio::time::sleep(self.config.reconnect_delay()).await;
        }
    }

    /// One control channel session: connect, register, then dispatch commands
    /// until the relay goes away
    pub async fn run_session(self: &Arc<Self>) -> crate::Result<()> {
        info!("Connecting to relay...");
        let stream =
            transport::connect(self.config.server_addr(), self.config.connect_timeout()).await?;
        let mut control = CipherStream::new(stream, Arc::clone(&self.key));

        Handshake::Control.write_to(&mut control).await?;
        info!("Control channel established");

        let mut frame = [0u8; COMMAND_FRAME_LEN];
        loop {
            if let Err(e) = control.read_exact(&mut frame).await {
                return Err(match e.kind() {
                    io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
                    _ => Error::Io(e),
                });
            }

            match Command::decode(&frame) {
                Ok(Command::Heartbeat) => trace!("Heartbeat received"),
                Ok(Command::RequestConnect(id)) => {
                    debug!("Relay requested data channel {}", id);
                    let client = Arc::clone(self);
                    tokio::spawn(async move {
                        if let Err(e) = client.serve_request(id).await {
                            debug!("Data channel {} abandoned: {}", id, e);
                        }
                    });
                }
                Err(e) => warn!("Ignoring control frame: {}", e),
            }
        }
    }

    /// Open the data channel for `id` and forward it to the target
    ///
    /// Anything opened before a failure is dropped (and so closed); the relay's
    /// own timeout tells the public user.
    async fn serve_request(&self, id: CorrelationId) -> crate::Result<()> {
        let bridge =
            transport::connect(self.config.server_addr(), self.config.connect_timeout()).await?;
        let mut bridge = CipherStream::new(bridge, Arc::clone(&self.key));
        Handshake::Data(id).write_to(&mut bridge).await?;

        let target =
            transport::connect(self.config.target_addr(), self.config.connect_timeout()).await?;

        let stats = forward(target, bridge).await;
        debug!(
            "Data channel {} finished: {} bytes to relay, {} bytes to target",
            id, stats.outbound, stats.inbound
        );
        Ok(())
    }
}
