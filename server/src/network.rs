//! Transport layer between the UDP socket and the server core.
//!
//! The core only sees [`TransportEvent`]s coming in and calls the fire-and-forget
//! [`Transport`] methods going out. [`UdpTransport`] implements that contract
//! on a tokio socket with three background tasks (receiver, sender, idle
//! checker); [`MemoryTransport`] records outgoing traffic for tests and tools.
//!
//! Datagram framing is one leading byte:
//! - `0x01` unconnected ping, answered with `0x1c` + u16 BE length + pong string
//! - `0x09` open connection, answered with `0x10`
//! - `0x84` data frame carrying one game batch
//! - `0x15` disconnect notification (single byte)
//!
//! Anything else is handed to the core as a raw datagram.

use crate::error::{ServerError, ServerResult};
use crate::status::AnnounceData;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

pub const UNCONNECTED_PING: u8 = 0x01;
pub const UNCONNECTED_PONG: u8 = 0x1c;
pub const OPEN_CONNECTION: u8 = 0x09;
pub const CONNECTION_ACCEPTED: u8 = 0x10;
pub const DISCONNECT_NOTIFICATION: u8 = 0x15;
pub const DATA_FRAME: u8 = 0x84;

pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_DATAGRAM: usize = 65_536;

/// Opaque identifier the transport assigns to each connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(pub u64);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Messages sent from network tasks to the server loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected {
        handle: ConnectionHandle,
        addr: SocketAddr,
    },
    Disconnected {
        handle: ConnectionHandle,
    },
    /// Payload of a data frame, i.e. one encoded batch.
    Packet {
        handle: ConnectionHandle,
        bytes: Vec<u8>,
    },
    /// Unframed datagram, e.g. a query request.
    Raw {
        bytes: Vec<u8>,
        addr: SocketAddr,
    },
}

/// Messages sent from the server loop to the network sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Frame {
        handle: ConnectionHandle,
        bytes: Vec<u8>,
    },
    Batch {
        handle: ConnectionHandle,
        bytes: Vec<u8>,
    },
    Unconnected {
        addr: SocketAddr,
        bytes: Vec<u8>,
    },
    Close {
        handle: ConnectionHandle,
    },
}

/// Outbound half of a transport as seen by the core.
///
/// Every method only enqueues; delivery failures are logged by the transport
/// and never reported back.
pub trait Transport {
    /// Starts background work. `status` carries the cached announce data.
    fn start(&mut self, _status: watch::Receiver<AnnounceData>) -> ServerResult<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    /// Sends bytes to a connection as-is.
    fn send(&self, handle: ConnectionHandle, bytes: Vec<u8>);

    /// Sends an encoded batch to a connection.
    fn send_batch(&self, handle: ConnectionHandle, batch: Vec<u8>);

    /// Replies to an address that has no connection.
    fn send_to(&self, addr: SocketAddr, bytes: Vec<u8>);

    /// Requests that a connection be closed. The transport reports the
    /// closure back as a `Disconnected` event.
    fn close(&self, handle: ConnectionHandle);
}

/// Transport that records everything it is asked to send.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<Outgoing>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, outgoing: Outgoing) {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(outgoing);
    }

    pub fn sent(&self) -> Vec<Outgoing> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Drains the recorded traffic.
    pub fn take(&self) -> Vec<Outgoing> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    pub fn batches_for(&self, handle: ConnectionHandle) -> Vec<Vec<u8>> {
        self.sent()
            .into_iter()
            .filter_map(|outgoing| match outgoing {
                Outgoing::Batch { handle: h, bytes } if h == handle => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn closed(&self) -> Vec<ConnectionHandle> {
        self.sent()
            .into_iter()
            .filter_map(|outgoing| match outgoing {
                Outgoing::Close { handle } => Some(handle),
                _ => None,
            })
            .collect()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, handle: ConnectionHandle, bytes: Vec<u8>) {
        self.record(Outgoing::Frame { handle, bytes });
    }

    fn send_batch(&self, handle: ConnectionHandle, batch: Vec<u8>) {
        self.record(Outgoing::Batch {
            handle,
            bytes: batch,
        });
    }

    fn send_to(&self, addr: SocketAddr, bytes: Vec<u8>) {
        self.record(Outgoing::Unconnected { addr, bytes });
    }

    fn close(&self, handle: ConnectionHandle) {
        self.record(Outgoing::Close { handle });
    }
}

/// A connected remote address
#[derive(Debug)]
pub struct Peer {
    pub handle: ConnectionHandle,
    pub addr: SocketAddr,
    /// Last time we received any datagram from this peer
    pub last_seen: Instant,
}

impl Peer {
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Address bookkeeping for the UDP transport.
///
/// Handles are never reused; a peer that reconnects after being removed
/// gets a fresh one.
#[derive(Debug)]
pub struct PeerTable {
    peers: HashMap<ConnectionHandle, Peer>,
    by_addr: HashMap<SocketAddr, ConnectionHandle>,
    next_handle: u64,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Returns the handle for `addr`, creating a peer if needed. The flag is
    /// true when the peer is new.
    pub fn open(&mut self, addr: SocketAddr) -> (ConnectionHandle, bool) {
        if let Some(handle) = self.touch_addr(addr) {
            return (handle, false);
        }

        let handle = ConnectionHandle(self.next_handle);
        self.next_handle += 1;
        self.peers.insert(
            handle,
            Peer {
                handle,
                addr,
                last_seen: Instant::now(),
            },
        );
        self.by_addr.insert(addr, handle);
        (handle, true)
    }

    pub fn find(&self, addr: SocketAddr) -> Option<ConnectionHandle> {
        self.by_addr.get(&addr).copied()
    }

    pub fn addr_of(&self, handle: ConnectionHandle) -> Option<SocketAddr> {
        self.peers.get(&handle).map(|peer| peer.addr)
    }

    /// Marks the peer at `addr` as active.
    pub fn touch_addr(&mut self, addr: SocketAddr) -> Option<ConnectionHandle> {
        let handle = self.find(addr)?;
        if let Some(peer) = self.peers.get_mut(&handle) {
            peer.last_seen = Instant::now();
        }
        Some(handle)
    }

    pub fn remove(&mut self, handle: ConnectionHandle) -> Option<Peer> {
        let peer = self.peers.remove(&handle)?;
        self.by_addr.remove(&peer.addr);
        Some(peer)
    }

    pub fn remove_addr(&mut self, addr: SocketAddr) -> Option<Peer> {
        let handle = self.find(addr)?;
        self.remove(handle)
    }

    /// Removes and returns peers idle for longer than `timeout`.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<ConnectionHandle> {
        let timed_out: Vec<ConnectionHandle> = self
            .peers
            .values()
            .filter(|peer| peer.is_timed_out(timeout))
            .map(|peer| peer.handle)
            .collect();

        for handle in &timed_out {
            self.remove(*handle);
        }
        timed_out
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// UDP transport driven by tokio tasks.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    peers: Arc<RwLock<PeerTable>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    outgoing_tx: Option<mpsc::UnboundedSender<Outgoing>>,
    outgoing_rx: Option<mpsc::UnboundedReceiver<Outgoing>>,
    idle_timeout: Duration,
    /// Receiver and idle checker; aborted on stop.
    tasks: Vec<JoinHandle<()>>,
}

impl UdpTransport {
    /// Binds the socket. Events start flowing once [`Transport::start`] runs.
    pub async fn bind(
        addr: &str,
    ) -> std::io::Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Listening on {}", socket.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                socket,
                peers: Arc::new(RwLock::new(PeerTable::new())),
                event_tx,
                outgoing_tx: Some(outgoing_tx),
                outgoing_rx: Some(outgoing_rx),
                idle_timeout: IDLE_TIMEOUT,
                tasks: Vec::new(),
            },
            event_rx,
        ))
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn queue(&self, outgoing: Outgoing) {
        match &self.outgoing_tx {
            Some(tx) => {
                if let Err(e) = tx.send(outgoing) {
                    error!("Failed to queue datagram: {}", e);
                }
            }
            None => debug!("Transport stopped, dropping {:?}", outgoing),
        }
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_receiver(&mut self, status: watch::Receiver<AnnounceData>) {
        let socket = Arc::clone(&self.socket);
        let peers = Arc::clone(&self.peers);
        let event_tx = self.event_tx.clone();

        self.tasks.push(tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let datagram = &buffer[..len];
                        if !handle_datagram(&socket, &peers, &event_tx, &status, datagram, addr)
                            .await
                        {
                            error!("Server loop is gone, stopping receiver");
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }));
    }

    /// Spawns task that processes the outgoing datagram queue
    ///
    /// The task is not aborted on stop; it drains what is queued and exits
    /// once the queue's sender is dropped.
    fn spawn_sender(&mut self, mut outgoing_rx: mpsc::UnboundedReceiver<Outgoing>) {
        let socket = Arc::clone(&self.socket);
        let peers = Arc::clone(&self.peers);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            while let Some(outgoing) = outgoing_rx.recv().await {
                match outgoing {
                    Outgoing::Frame { handle, bytes } => {
                        let addr = peers.read().await.addr_of(handle);
                        match addr {
                            Some(addr) => send_datagram(&socket, &bytes, addr).await,
                            None => debug!("Dropping frame for closed connection {}", handle),
                        }
                    }
                    Outgoing::Batch { handle, bytes } => {
                        let addr = peers.read().await.addr_of(handle);
                        match addr {
                            Some(addr) => {
                                let mut framed = Vec::with_capacity(bytes.len() + 1);
                                framed.push(DATA_FRAME);
                                framed.extend_from_slice(&bytes);
                                send_datagram(&socket, &framed, addr).await;
                            }
                            None => debug!("Dropping batch for closed connection {}", handle),
                        }
                    }
                    Outgoing::Unconnected { addr, bytes } => {
                        send_datagram(&socket, &bytes, addr).await;
                    }
                    Outgoing::Close { handle } => {
                        let peer = peers.write().await.remove(handle);
                        if let Some(peer) = peer {
                            send_datagram(&socket, &[DISCONNECT_NOTIFICATION], peer.addr).await;
                            if event_tx.send(TransportEvent::Disconnected { handle }).is_err() {
                                debug!("Server loop is gone, not reporting close of {}", handle);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors idle peers
    fn spawn_timeout_checker(&mut self) {
        let peers = Arc::clone(&self.peers);
        let event_tx = self.event_tx.clone();
        let idle_timeout = self.idle_timeout;

        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut peers = peers.write().await;
                    peers.check_timeouts(idle_timeout)
                };

                for handle in timed_out {
                    info!("Connection {} timed out", handle);
                    if let Err(e) = event_tx.send(TransportEvent::Disconnected { handle }) {
                        error!("Failed to send timeout event: {}", e);
                        return;
                    }
                }
            }
        }));
    }
}

impl Transport for UdpTransport {
    fn start(&mut self, status: watch::Receiver<AnnounceData>) -> ServerResult<()> {
        let outgoing_rx = self.outgoing_rx.take().ok_or(ServerError::AlreadyStarted)?;
        self.spawn_receiver(status);
        self.spawn_sender(outgoing_rx);
        self.spawn_timeout_checker();
        Ok(())
    }

    fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.outgoing_tx = None;
    }

    fn send(&self, handle: ConnectionHandle, bytes: Vec<u8>) {
        self.queue(Outgoing::Frame { handle, bytes });
    }

    fn send_batch(&self, handle: ConnectionHandle, batch: Vec<u8>) {
        self.queue(Outgoing::Batch {
            handle,
            bytes: batch,
        });
    }

    fn send_to(&self, addr: SocketAddr, bytes: Vec<u8>) {
        self.queue(Outgoing::Unconnected { addr, bytes });
    }

    fn close(&self, handle: ConnectionHandle) {
        self.queue(Outgoing::Close { handle });
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

async fn send_datagram(socket: &UdpSocket, bytes: &[u8], addr: SocketAddr) {
    if let Err(e) = socket.send_to(bytes, addr).await {
        warn!("Failed to send datagram to {}: {}", addr, e);
    }
}

/// Encodes the unconnected pong reply.
pub fn encode_pong(pong: &str) -> Vec<u8> {
    let bytes = pong.as_bytes();
    let len = bytes.len().min(u16::MAX as usize);
    let mut out = Vec::with_capacity(len + 3);
    out.push(UNCONNECTED_PONG);
    out.extend_from_slice(&(len as u16).to_be_bytes());
    out.extend_from_slice(&bytes[..len]);
    out
}

/// Classifies one datagram. Returns false once the event channel is closed.
async fn handle_datagram(
    socket: &UdpSocket,
    peers: &RwLock<PeerTable>,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
    status: &watch::Receiver<AnnounceData>,
    datagram: &[u8],
    addr: SocketAddr,
) -> bool {
    let event = match datagram.first() {
        None => return true,
        Some(&UNCONNECTED_PING) if datagram.len() == 1 => {
            let pong = encode_pong(&status.borrow().pong_string());
            send_datagram(socket, &pong, addr).await;
            return true;
        }
        Some(&OPEN_CONNECTION) if datagram.len() == 1 => {
            let (handle, fresh) = peers.write().await.open(addr);
            send_datagram(socket, &[CONNECTION_ACCEPTED], addr).await;
            if !fresh {
                return true;
            }
            TransportEvent::Connected { handle, addr }
        }
        Some(&DISCONNECT_NOTIFICATION) if datagram.len() == 1 => {
            match peers.write().await.remove_addr(addr) {
                Some(peer) => TransportEvent::Disconnected {
                    handle: peer.handle,
                },
                None => return true,
            }
        }
        Some(&DATA_FRAME) => match peers.write().await.touch_addr(addr) {
            Some(handle) => TransportEvent::Packet {
                handle,
                bytes: datagram[1..].to_vec(),
            },
            None => {
                debug!("Data frame from unknown peer {}", addr);
                return true;
            }
        },
        Some(_) => {
            peers.write().await.touch_addr(addr);
            TransportEvent::Raw {
                bytes: datagram.to_vec(),
                addr,
            }
        }
    };

    event_tx.send(event).is_ok()
}
