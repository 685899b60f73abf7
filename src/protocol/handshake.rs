//! Bridge connection handshake
//!
//! Sent once by the tunnel client on every bridge connection, read by the
//! relay before it decides what the connection is for.

use super::{CorrelationId, ProtocolError, CORRELATION_ID_LEN, MAGIC};
use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Role declared by a bridge connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionType {
    /// Persistent control channel
    Control = 0x00,
    /// Data channel serving one public connection
    Data = 0x01,
}

impl TryFrom<u8> for ConnectionType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ConnectionType::Control),
            0x01 => Ok(ConnectionType::Data),
            other => Err(ProtocolError::InvalidConnectionType(other)),
        }
    }
}

/// A decoded handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Control,
    Data(CorrelationId),
}

impl Handshake {
    /// Connection type carried by this handshake
    pub fn connection_type(&self) -> ConnectionType {
        match self {
            Handshake::Control => ConnectionType::Control,
            Handshake::Data(_) => ConnectionType::Data,
        }
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(MAGIC.len() + 1 + CORRELATION_ID_LEN);
        buf.put_slice(&MAGIC);
        buf.put_u8(self.connection_type() as u8);
        if let Handshake::Data(id) = self {
            buf.put_slice(id.as_bytes());
        }
        buf
    }

    /// Send the handshake as a single write
    pub async fn write_to<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.encode()).await?;
        writer.flush().await
    }

    /// Read and validate a handshake
    ///
    /// Magic is checked before anything else is read, so a bad prefix is
    /// rejected regardless of what follows it.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut magic = [0u8; 4];
        read_field(reader, &mut magic, "magic").await?;
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let mut kind = [0u8; 1];
        read_field(reader, &mut kind, "connection type").await?;

        match ConnectionType::try_from(kind[0])? {
            ConnectionType::Control => Ok(Handshake::Control),
            ConnectionType::Data => {
                let mut id = [0u8; CORRELATION_ID_LEN];
                read_field(reader, &mut id, "correlation id").await?;
                Ok(Handshake::Data(CorrelationId::from_bytes(id)))
            }
        }
    }
}

async fn read_field<R>(reader: &mut R, buf: &mut [u8], field: &'static str) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ProtocolError::Truncated(field)),
        Err(e) => Err(ProtocolError::Io(e)),
    }
}
