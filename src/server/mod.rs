/*!
TCP transport: accept loop, per-connection receive tasks and
concurrent-safe sends.

The server owns the connection table. Each accepted socket gets a
dedicated receive thread that reassembles framed packets out of a
rolling buffer and hands them, in arrival order, to the registered
[`PacketHandler`]. Replies and fan-out go through [`Outbound`], the
narrow sending interface other components depend on.
*/

use crate::errors::*;
use crate::protocol::{Message, MessageType, Packet};

use std::collections::HashMap;
use std::io::prelude::*;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[allow(unused_imports)]
use log::{debug, error, info, warn};

use socket2::{Domain, Socket, Type};

pub mod connection;

pub use connection::{Connection, ConnectionId};

/// Staging buffer size for a single socket read.
const READ_CHUNK: usize = 4096;

/// Receive timeout; the receive task re-checks the shutdown flag at
/// this interval.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer of decoded packets and disconnect events. Handlers run on
/// the receive thread of the originating connection.
pub trait PacketHandler: Send + Sync {
    /// Process one packet. An `Err` is treated as a protocol violation
    /// and tears the connection down.
    fn handle_packet(&self, conn: ConnectionId, packet: &Packet) -> ChessdResult<()>;

    /// The connection is gone; its table entry is still readable so
    /// username lookups keep working during cleanup.
    fn handle_disconnect(&self, conn: ConnectionId);
}

/// The sending surface the rest of the server depends on. Components
/// that fan out updates hold this instead of the whole network server.
pub trait Outbound: Send + Sync {
    fn send_packet(&self, conn: ConnectionId, kind: MessageType, payload: &[u8]) -> ChessdResult<()>;
    fn send_to_username(&self, username: &str, kind: MessageType, payload: &[u8]) -> ChessdResult<()>;
    fn conn_for_username(&self, username: &str) -> Option<ConnectionId>;
    fn username_for(&self, conn: ConnectionId) -> Option<String>;
    fn is_logged_in(&self, username: &str) -> bool;
    fn bind_username(&self, conn: ConnectionId, username: &str);
}

/// Serialize a message and send it to a connection.
pub fn send_message<M: Message>(out: &dyn Outbound, conn: ConnectionId, message: &M) -> ChessdResult<()> {
    let mut payload = Vec::new();
    message.write_to(&mut payload)?;
    out.send_packet(conn, M::KIND, &payload)
}

/// Serialize a message and send it to whichever connection the
/// username is bound to.
pub fn send_message_to<M: Message>(
    out: &dyn Outbound,
    username: &str,
    message: &M,
) -> ChessdResult<()> {
    let mut payload = Vec::new();
    message.write_to(&mut payload)?;
    out.send_to_username(username, M::KIND, &payload)
}

/// Listening socket plus the table of live connections.
pub struct NetworkServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    clients: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    client_threads: Mutex<Vec<thread::JoinHandle<()>>>,
    next_id: AtomicU64,
    shutdown: AtomicBool,
}

impl NetworkServer {
    /// Bind the listening socket. Port 0 picks an ephemeral port;
    /// [`NetworkServer::local_addr`] reports the bound address.
    pub fn bind(addr: SocketAddr, backlog: i32) -> ChessdResult<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog)?;
        let listener: TcpListener = socket.into();
        let local_addr = listener.local_addr()?;

        info!("listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            clients: Mutex::new(HashMap::new()),
            client_threads: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until shutdown, spawning one receive thread
    /// per client. Blocks; run a clone of the `Arc` from a dedicated
    /// thread when the caller needs to keep going. All receive threads
    /// are joined before this returns.
    pub fn run(self: Arc<Self>, handler: Arc<dyn PacketHandler>) {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(err) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    error!("accept failed: {}", err);
                    continue;
                }
            };

            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match self.admit(stream, peer) {
                Ok(connection) => {
                    info!("connection {} accepted from {}", connection.id(), peer);

                    let server = Arc::clone(&self);
                    let handler = Arc::clone(&handler);
                    let spawned = thread::Builder::new()
                        .name(format!("client-{}", connection.id()))
                        .spawn(move || server.serve_client(connection, handler));

                    match spawned {
                        Ok(handle) => self.client_threads.lock().unwrap().push(handle),
                        Err(err) => error!("failed to spawn receive thread: {}", err),
                    }
                }
                Err(err) => error!("failed to set up connection from {}: {:?}", peer, err),
            }
        }

        let threads = std::mem::replace(&mut *self.client_threads.lock().unwrap(), Vec::new());
        for handle in threads {
            let _ = handle.join();
        }
    }

    /// Stop accepting, close every client socket and unblock all
    /// receive threads. `run` returns once they have drained.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        // Wake the blocking accept with a throwaway connection.
        let mut wake_addr = self.local_addr;
        if wake_addr.ip().is_unspecified() {
            wake_addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        let _ = TcpStream::connect_timeout(&wake_addr, Duration::from_secs(1));

        for connection in self.clients.lock().unwrap().values() {
            connection.close();
        }
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) -> ChessdResult<Arc<Connection>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(Connection::open(id, stream, peer)?);
        self.clients
            .lock()
            .unwrap()
            .insert(id, Arc::clone(&connection));
        Ok(connection)
    }

    fn serve_client(self: Arc<Self>, connection: Arc<Connection>, handler: Arc<dyn PacketHandler>) {
        let id = connection.id();

        match self.receive_loop(&connection, handler.as_ref()) {
            Ok(()) => debug!("connection {} receive task stopping", id),
            Err(Error::PeerClosed) => info!("connection {} closed by peer", id),
            Err(err) => {
                if !self.shutdown.load(Ordering::SeqCst) {
                    warn!("connection {} dropped: {:?}", id, err);
                }
            }
        }

        // The manager still resolves usernames during cleanup, so run
        // the hook before the table entry disappears.
        handler.handle_disconnect(id);

        connection.close();
        self.clients.lock().unwrap().remove(&id);
    }

    fn receive_loop(&self, connection: &Connection, handler: &dyn PacketHandler) -> ChessdResult<()> {
        let mut stream = connection.reader()?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut staging = [0u8; READ_CHUNK];

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(());
            }

            let received = match stream.read(&mut staging) {
                Ok(0) => return Err(Error::PeerClosed),
                Ok(n) => n,
                Err(ref err)
                    if err.kind() == std::io::ErrorKind::WouldBlock
                        || err.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(err) => return Err(Error::from(err)),
            };

            for packet in connection.buffer_bytes(&staging[..received]) {
                handler.handle_packet(connection.id(), &packet)?;
            }
        }
    }

    fn client(&self, conn: ConnectionId) -> Option<Arc<Connection>> {
        self.clients.lock().unwrap().get(&conn).cloned()
    }

    // Linear scan; fine for the expected participant counts.
    fn client_by_username(&self, username: &str) -> Option<Arc<Connection>> {
        self.clients
            .lock()
            .unwrap()
            .values()
            .find(|connection| connection.username().as_deref() == Some(username))
            .cloned()
    }
}

impl Outbound for NetworkServer {
    fn send_packet(&self, conn: ConnectionId, kind: MessageType, payload: &[u8]) -> ChessdResult<()> {
        match self.client(conn) {
            Some(connection) => connection.send(kind, payload),
            None => Err(Error::from(InvalidValue {
                expected: format!("open connection {}", conn),
            })),
        }
    }

    fn send_to_username(&self, username: &str, kind: MessageType, payload: &[u8]) -> ChessdResult<()> {
        match self.client_by_username(username) {
            Some(connection) => connection.send(kind, payload),
            None => Err(Error::from(InvalidValue {
                expected: format!("a connection bound to {:?}", username),
            })),
        }
    }

    fn conn_for_username(&self, username: &str) -> Option<ConnectionId> {
        self.client_by_username(username).map(|c| c.id())
    }

    fn username_for(&self, conn: ConnectionId) -> Option<String> {
        self.client(conn).and_then(|c| c.username())
    }

    fn is_logged_in(&self, username: &str) -> bool {
        self.client_by_username(username).is_some()
    }

    fn bind_username(&self, conn: ConnectionId, username: &str) {
        if let Some(connection) = self.client(conn) {
            connection.bind_username(username);
        }
    }
}
