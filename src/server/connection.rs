//! A single accepted client connection.

use crate::errors::*;
use crate::protocol::{MessageType, Packet};

use std::io::prelude::*;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Mutex;

#[allow(unused_imports)]
use log::{debug, error, info, warn};

/// Opaque identifier of a connection, stable for its lifetime.
pub type ConnectionId = u64;

/// State the server keeps per accepted socket: the stream, the rolling
/// receive buffer and the username bound by login.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    /// Canonical handle; readers clone it, `close` shuts it down.
    stream: TcpStream,
    /// Send-side exclusion guard: one writer at a time per connection.
    writer: Mutex<TcpStream>,
    /// Bytes received but not yet framed into complete packets.
    buffer: Mutex<Vec<u8>>,
    username: Mutex<Option<String>>,
}

impl Connection {
    pub fn open(id: ConnectionId, stream: TcpStream, peer: SocketAddr) -> ChessdResult<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            id,
            peer,
            stream,
            writer: Mutex::new(writer),
            buffer: Mutex::new(Vec::new()),
            username: Mutex::new(None),
        })
    }

    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[inline]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// A separate read handle for this connection's receive task.
    pub fn reader(&self) -> ChessdResult<TcpStream> {
        Ok(self.stream.try_clone()?)
    }

    /// Frame and send one packet. Safe to call from any task; writes to
    /// the same connection are serialized by the writer guard, and
    /// partial writes are retried until the packet is fully out.
    pub fn send(&self, kind: MessageType, payload: &[u8]) -> ChessdResult<()> {
        let bytes = Packet::encode(kind, payload)?;
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Append freshly read bytes and detach every complete frame.
    pub fn buffer_bytes(&self, bytes: &[u8]) -> Vec<Packet> {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.extend_from_slice(bytes);

        let mut packets = Vec::new();
        while let Some(packet) = Packet::drain(&mut buffer) {
            packets.push(packet);
        }
        packets
    }

    pub fn username(&self) -> Option<String> {
        self.username.lock().unwrap().clone()
    }

    /// Bind a username to this connection. The caller is responsible
    /// for the single-login check.
    pub fn bind_username(&self, username: &str) {
        *self.username.lock().unwrap() = Some(username.to_owned());
    }

    /// Shut the socket down in both directions, unblocking any pending
    /// read in the receive task.
    pub fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("")
            .field(&self.id)
            .field(&self.peer)
            .field(&self.username())
            .finish()
    }
}
