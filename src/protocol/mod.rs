/*!
Wire protocol: framing and message kinds.

Each packet on the wire is `tag (1 byte) ‖ length (u16, big-endian) ‖
payload (length bytes)`. Packet boundaries are recovered purely from the
length field, so a single stream read may yield zero, one or several
packets.

# Examples
```
use chessd::protocol::{Message, Packet, Register};

let register = Register { username: "alice".to_owned() };
let bytes = register.encode().unwrap();

let mut buffer = bytes.clone();
let packet = Packet::drain(&mut buffer).unwrap();
assert_eq!(Register::decode(&packet.payload).unwrap(), register);
```
*/

use crate::errors::*;

use std::convert::TryFrom;
use std::io;

mod messages;
mod serializable;

pub use messages::*;
pub use serializable::*;

/// Bytes of the `tag ‖ length` packet header.
pub const HEADER_LEN: usize = 3;

/// Largest payload a single packet can carry.
pub const MAX_PAYLOAD_LEN: usize = u16::max_value() as usize;

/// All message kinds the server speaks. Tag values are fixed and must
/// stay stable across the life of a deployment.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum MessageType {
    // Register
    Register = 0x10,
    RegisterSuccess = 0x11,
    RegisterFailure = 0x12,

    // Login
    Login = 0x20,
    LoginSuccess = 0x21,
    LoginFailure = 0x22,

    // Player list
    RequestPlayerList = 0x30,
    PlayerList = 0x31,

    // Game
    GameStart = 0x40,
    Move = 0x41,
    MoveError = 0x42,
    GameStatusUpdate = 0x43,
    GameEnd = 0x44,

    // Auto match
    AutoMatchRequest = 0x55,
    AutoMatchFound = 0x56,
    AutoMatchAccepted = 0x57,
    AutoMatchDeclined = 0x58,
    MatchDeclinedNotification = 0x59,
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(tag: u8) -> ChessdResult<Self> {
        Ok(match tag {
            0x10 => Self::Register,
            0x11 => Self::RegisterSuccess,
            0x12 => Self::RegisterFailure,
            0x20 => Self::Login,
            0x21 => Self::LoginSuccess,
            0x22 => Self::LoginFailure,
            0x30 => Self::RequestPlayerList,
            0x31 => Self::PlayerList,
            0x40 => Self::GameStart,
            0x41 => Self::Move,
            0x42 => Self::MoveError,
            0x43 => Self::GameStatusUpdate,
            0x44 => Self::GameEnd,
            0x55 => Self::AutoMatchRequest,
            0x56 => Self::AutoMatchFound,
            0x57 => Self::AutoMatchAccepted,
            0x58 => Self::AutoMatchDeclined,
            0x59 => Self::MatchDeclinedNotification,
            _ => return Err(Error::UnknownTag(tag)),
        })
    }
}

/// A single decoded frame. Transient; never stored.
#[derive(Debug, PartialEq, Clone)]
pub struct Packet {
    /// Raw message tag. May name a kind this build does not know.
    pub kind: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    /// The message kind this frame claims to carry.
    #[inline]
    pub fn message_type(&self) -> ChessdResult<MessageType> {
        MessageType::try_from(self.kind)
    }

    /// Frame a payload for the wire.
    pub fn encode(kind: MessageType, payload: &[u8]) -> ChessdResult<Vec<u8>> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge(payload.len()));
        }

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.push(kind as u8);
        bytes.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        bytes.extend_from_slice(payload);
        Ok(bytes)
    }

    /// Detach one complete frame from the front of a rolling receive
    /// buffer. Returns `None` while the buffer holds only a partial
    /// frame; the partial bytes stay buffered.
    pub fn drain(buffer: &mut Vec<u8>) -> Option<Packet> {
        if buffer.len() < HEADER_LEN {
            return None;
        }

        let length = u16::from_be_bytes([buffer[1], buffer[2]]) as usize;
        if buffer.len() < HEADER_LEN + length {
            return None;
        }

        let kind = buffer[0];
        let payload = buffer[HEADER_LEN..HEADER_LEN + length].to_vec();
        buffer.drain(..HEADER_LEN + length);

        Some(Packet { kind, payload })
    }
}

/// A typed wire message: a payload layout bound to a fixed tag.
pub trait Message: Readable + Writable {
    const KIND: MessageType;

    /// Parse a message of this kind out of a packet payload.
    ///
    /// Fails with [`Error::MalformedPacket`] when an embedded length
    /// prefix overruns the payload.
    fn decode(payload: &[u8]) -> ChessdResult<Self> {
        let mut cursor = io::Cursor::new(payload);
        Self::read_from(&mut cursor).map_err(|err| match err {
            Error::Io(ref io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
                Error::MalformedPacket
            }
            other => other,
        })
    }

    /// Serialize this message into a complete framed packet.
    fn encode(&self) -> ChessdResult<Vec<u8>> {
        let mut payload = Vec::new();
        self.write_to(&mut payload)?;
        Packet::encode(Self::KIND, &payload)
    }
}
