//! Per-connection session state.
//!
//! A session moves through `Connecting → Handshaking → Active → Disconnected`
//! and is bound to one protocol version from the moment its login is accepted.
//! Outbound packets are queued and leave as a single batch per tick.

use crate::chunk::ChunkIndex;
use crate::crypto::SessionKey;
use crate::dimension::DimensionId;
use crate::network::{ConnectionHandle, Transport};
use log::{debug, warn};
use protocol::{Batch, GamePacket, PacketRegistry, ProtocolVersion, Rotation, Text, Vector3};
use std::collections::{BTreeSet, HashSet};
use std::net::SocketAddr;

/// Narrow interface shared by the console and player sessions.
pub trait CommandSender {
    fn send_message(&mut self, message: &str);
    fn has_permission(&self, permission: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Handshaking,
    Active,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionState {
    Disabled,
    /// Key derived, waiting for the client to confirm the handshake.
    Pending { key: SessionKey },
    Established { key: SessionKey },
}

impl EncryptionState {
    pub fn key(&self) -> Option<&SessionKey> {
        match self {
            EncryptionState::Disabled => None,
            EncryptionState::Pending { key } | EncryptionState::Established { key } => Some(key),
        }
    }
}

/// Where a spawned session currently is.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub level: String,
    pub dimension: DimensionId,
    pub position: Vector3,
    pub rotation: Rotation,
}

impl Location {
    pub fn chunk(&self) -> (i32, i32) {
        self.position.chunk_coords()
    }
}

#[derive(Debug)]
pub struct Session {
    id: u32,
    handle: ConnectionHandle,
    addr: Option<SocketAddr>,
    state: SessionState,
    version: Option<ProtocolVersion>,
    display_name: String,
    encryption: EncryptionState,
    unique_id: i64,
    runtime_id: u64,
    location: Option<Location>,
    interest: BTreeSet<ChunkIndex>,
    operator: bool,
    permissions: HashSet<String>,
    outbound: Batch,
}

impl Session {
    pub fn new(id: u32, handle: ConnectionHandle, addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            handle,
            addr,
            state: SessionState::Connecting,
            version: None,
            display_name: String::new(),
            encryption: EncryptionState::Disabled,
            unique_id: i64::from(id),
            runtime_id: u64::from(id),
            location: None,
            interest: BTreeSet::new(),
            operator: false,
            permissions: HashSet::new(),
            outbound: Batch::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn encryption(&self) -> &EncryptionState {
        &self.encryption
    }

    pub fn unique_id(&self) -> i64 {
        self.unique_id
    }

    pub fn runtime_id(&self) -> u64 {
        self.runtime_id
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn interest(&self) -> &BTreeSet<ChunkIndex> {
        &self.interest
    }

    /// Accepts the login: binds the version and name and enters
    /// `Handshaking`. Only valid while `Connecting`.
    pub fn begin_handshake(&mut self, version: ProtocolVersion, display_name: &str) -> bool {
        if self.state != SessionState::Connecting {
            return false;
        }
        self.version = Some(version);
        self.display_name = display_name.to_string();
        self.state = SessionState::Handshaking;
        true
    }

    pub fn set_encryption(&mut self, encryption: EncryptionState) {
        self.encryption = encryption;
    }

    /// Confirms a pending key exchange.
    pub fn establish_encryption(&mut self) -> bool {
        match self.encryption {
            EncryptionState::Pending { key } => {
                self.encryption = EncryptionState::Established { key };
                true
            }
            _ => false,
        }
    }

    pub fn activate(&mut self) -> bool {
        if self.state != SessionState::Handshaking {
            return false;
        }
        self.state = SessionState::Active;
        true
    }

    pub fn mark_disconnected(&mut self) {
        self.state = SessionState::Disconnected;
        self.outbound = Batch::new();
    }

    pub fn spawn(&mut self, location: Location) {
        self.location = Some(location);
    }

    /// Updates the position. Returns true when the session entered a new
    /// chunk column.
    pub fn move_to(&mut self, position: Vector3, rotation: Rotation) -> bool {
        match self.location.as_mut() {
            Some(location) => {
                let before = location.chunk();
                location.position = position;
                location.rotation = rotation;
                before != location.chunk()
            }
            None => false,
        }
    }

    /// Replaces the interest set and returns `(entered, left)`.
    pub fn replace_interest(
        &mut self,
        next: BTreeSet<ChunkIndex>,
    ) -> (Vec<ChunkIndex>, Vec<ChunkIndex>) {
        let entered = next.difference(&self.interest).copied().collect();
        let left = self.interest.difference(&next).copied().collect();
        self.interest = next;
        (entered, left)
    }

    pub fn take_interest(&mut self) -> BTreeSet<ChunkIndex> {
        std::mem::take(&mut self.interest)
    }

    pub fn set_operator(&mut self, operator: bool) {
        self.operator = operator;
    }

    pub fn grant(&mut self, permission: &str) {
        self.permissions.insert(permission.to_string());
    }

    /// Queues a packet for the next flush. Dropped once disconnected.
    pub fn queue(&mut self, packet: impl Into<GamePacket>) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.outbound.add(packet);
    }

    pub fn queued(&self) -> &[GamePacket] {
        self.outbound.packets()
    }

    /// Encodes everything queued as one batch and hands it to the transport.
    pub fn flush(&mut self, registry: &PacketRegistry, transport: &dyn Transport) -> usize {
        if self.outbound.is_empty() {
            return 0;
        }
        let batch = std::mem::take(&mut self.outbound);
        match batch.encode(registry) {
            Ok(bytes) => {
                transport.send_batch(self.handle, bytes);
                batch.len()
            }
            Err(e) => {
                warn!(
                    "Dropping {} queued packets for session {}: {}",
                    batch.len(),
                    self.id,
                    e
                );
                0
            }
        }
    }

    /// Active sessions tick, and so do handshaking ones with queued replies.
    pub fn needs_tick(&self) -> bool {
        match self.state {
            SessionState::Active => true,
            SessionState::Handshaking => !self.outbound.is_empty(),
            _ => false,
        }
    }

    /// Per-tick maintenance: flushes the outbound queue.
    pub fn tick(&mut self, current_tick: u64, registry: &PacketRegistry, transport: &dyn Transport) {
        let sent = self.flush(registry, transport);
        if sent > 0 {
            debug!(
                "Tick {}: flushed {} packets to session {}",
                current_tick, sent, self.id
            );
        }
    }
}

impl CommandSender for Session {
    fn send_message(&mut self, message: &str) {
        self.queue(Text::raw(message));
    }

    fn has_permission(&self, permission: &str) -> bool {
        self.operator || self.permissions.contains(permission)
    }
}
