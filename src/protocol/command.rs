//! Control channel commands (relay -> tunnel client)

use super::{CorrelationId, ProtocolError, COMMAND_FRAME_LEN, CORRELATION_ID_LEN};
use bytes::{BufMut, BytesMut};

/// Command byte values
const CMD_HEARTBEAT: u8 = 0x00;
const CMD_REQUEST_CONNECT: u8 = 0x01;

/// A control channel command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Keep-alive, carries no information
    Heartbeat,
    /// Open a data channel tagged with this id
    RequestConnect(CorrelationId),
}

impl Command {
    /// Encode to a fixed-size frame
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(COMMAND_FRAME_LEN);
        match self {
            Command::Heartbeat => {
                buf.put_u8(CMD_HEARTBEAT);
                buf.put_bytes(0, CORRELATION_ID_LEN);
            }
            Command::RequestConnect(id) => {
                buf.put_u8(CMD_REQUEST_CONNECT);
                buf.put_slice(id.as_bytes());
            }
        }
        buf
    }

    /// Decode a fixed-size frame
    pub fn decode(frame: &[u8; COMMAND_FRAME_LEN]) -> Result<Self, ProtocolError> {
        match frame[0] {
            CMD_HEARTBEAT => Ok(Command::Heartbeat),
            CMD_REQUEST_CONNECT => {
                let mut id = [0u8; CORRELATION_ID_LEN];
                id.copy_from_slice(&frame[1..]);
                Ok(Command::RequestConnect(CorrelationId::from_bytes(id)))
            }
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_frame() {
        let encoded = Command::Heartbeat.encode();
        assert_eq!(&encoded[..], &[0u8; COMMAND_FRAME_LEN]);
    }

    #[test]
    fn test_request_connect_frame() {
        let id = CorrelationId::generate();
        let encoded = Command::RequestConnect(id).encode();
        assert_eq!(encoded.len(), COMMAND_FRAME_LEN);
        assert_eq!(encoded[0], 0x01);

        let mut frame = [0u8; COMMAND_FRAME_LEN];
        frame.copy_from_slice(&encoded);
        assert_eq!(Command::decode(&frame).unwrap(), Command::RequestConnect(id));
    }

    #[test]
    fn test_unknown_command() {
        let mut frame = [0u8; COMMAND_FRAME_LEN];
        frame[0] = 0x42;
        assert!(matches!(Command::decode(&frame), Err(ProtocolError::UnknownCommand(0x42))));
    }
}
