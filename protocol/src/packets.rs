//! Concrete message types.
//!
//! Field order here is the wire order. Changing it, or a field's primitive,
//! is a breaking change that needs a new protocol version.

use crate::cursor::BinaryCursor;
use crate::error::CodecResult;
use crate::packet::{Packet, PacketKind};
use crate::types::{AttributeMap, BlockPosition, EntityDataMap, Rotation, Vector3};
use crate::version::Features;

/// First packet of every session; carries the protocol number.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Login {
    pub protocol: u32,
    pub display_name: String,
    /// SEC1-encoded client public key, empty when the client has none.
    pub client_key: Vec<u8>,
}

impl Packet for Login {
    const KIND: PacketKind = PacketKind::Login;

    fn encode(&self, cursor: &mut BinaryCursor, _features: &Features) {
        cursor.put_i32_be(self.protocol as i32);
        cursor.put_string(&self.display_name);
        cursor.put_bytes(&self.client_key);
    }

    fn decode(&mut self, cursor: &mut BinaryCursor, _features: &Features) -> CodecResult<()> {
        self.protocol = cursor.get_i32_be()? as u32;
        self.display_name = cursor.get_string()?;
        self.client_key = cursor.get_bytes()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayStatus {
    pub status: i32,
}

impl PlayStatus {
    pub const LOGIN_SUCCESS: i32 = 0;
    pub const LOGIN_FAILED_CLIENT: i32 = 1;
    pub const LOGIN_FAILED_SERVER: i32 = 2;
    pub const PLAYER_SPAWN: i32 = 3;

    pub fn new(status: i32) -> Self {
        Self { status }
    }
}

impl Packet for PlayStatus {
    const KIND: PacketKind = PacketKind::PlayStatus;

    fn encode(&self, cursor: &mut BinaryCursor, _features: &Features) {
        cursor.put_i32_be(self.status);
    }

    fn decode(&mut self, cursor: &mut BinaryCursor, _features: &Features) -> CodecResult<()> {
        self.status = cursor.get_i32_be()?;
        Ok(())
    }
}

/// Server half of the key exchange.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerToClientHandshake {
    pub public_key: Vec<u8>,
    pub token: Vec<u8>,
}

impl Packet for ServerToClientHandshake {
    const KIND: PacketKind = PacketKind::ServerToClientHandshake;

    fn encode(&self, cursor: &mut BinaryCursor, _features: &Features) {
        cursor.put_bytes(&self.public_key);
        cursor.put_bytes(&self.token);
    }

    fn decode(&mut self, cursor: &mut BinaryCursor, _features: &Features) -> CodecResult<()> {
        self.public_key = cursor.get_bytes()?;
        self.token = cursor.get_bytes()?;
        Ok(())
    }
}

/// Client confirmation that it derived the same key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientToServerHandshake;

impl Packet for ClientToServerHandshake {
    const KIND: PacketKind = PacketKind::ClientToServerHandshake;

    fn encode(&self, _cursor: &mut BinaryCursor, _features: &Features) {}

    fn decode(&mut self, _cursor: &mut BinaryCursor, _features: &Features) -> CodecResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Disconnect {
    pub hide_screen: bool,
    pub message: String,
}

impl Disconnect {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            hide_screen: false,
            message: message.into(),
        }
    }
}

impl Packet for Disconnect {
    const KIND: PacketKind = PacketKind::Disconnect;

    fn encode(&self, cursor: &mut BinaryCursor, _features: &Features) {
        cursor.put_bool(self.hide_screen);
        cursor.put_string(&self.message);
    }

    fn decode(&mut self, cursor: &mut BinaryCursor, _features: &Features) -> CodecResult<()> {
        self.hide_screen = cursor.get_bool()?;
        self.message = cursor.get_string()?;
        Ok(())
    }
}

/// Chat, system and announcement lines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Text {
    pub text_type: u8,
    pub source: String,
    pub message: String,
}

impl Text {
    pub const RAW: u8 = 0;
    pub const CHAT: u8 = 1;
    pub const SYSTEM: u8 = 6;

    pub fn raw(message: impl Into<String>) -> Self {
        Self {
            text_type: Self::RAW,
            source: String::new(),
            message: message.into(),
        }
    }

    pub fn chat(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            text_type: Self::CHAT,
            source: source.into(),
            message: message.into(),
        }
    }
}

impl Packet for Text {
    const KIND: PacketKind = PacketKind::Text;

    fn encode(&self, cursor: &mut BinaryCursor, _features: &Features) {
        cursor.put_u8(self.text_type);
        cursor.put_string(&self.source);
        cursor.put_string(&self.message);
    }

    fn decode(&mut self, cursor: &mut BinaryCursor, _features: &Features) -> CodecResult<()> {
        self.text_type = cursor.get_u8()?;
        self.source = cursor.get_string()?;
        self.message = cursor.get_string()?;
        Ok(())
    }
}

/// Rider/vehicle relation attached to a spawned entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityLink {
    pub from: i64,
    pub to: i64,
    pub link_type: u8,
}

/// Spawns an entity on the client.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AddEntity {
    pub unique_id: i64,
    pub runtime_id: u64,
    pub entity_type: u32,
    pub position: Vector3,
    pub motion: Vector3,
    pub rotation: Rotation,
    pub attributes: AttributeMap,
    pub entity_data: EntityDataMap,
    /// Only on the wire for versions with entity links.
    pub links: Vec<EntityLink>,
}

impl Packet for AddEntity {
    const KIND: PacketKind = PacketKind::AddEntity;

    fn encode(&self, cursor: &mut BinaryCursor, features: &Features) {
        cursor.put_unique_id(self.unique_id);
        cursor.put_runtime_id(self.runtime_id);
        cursor.put_uvarint32(self.entity_type);
        cursor.put_vector(self.position);
        cursor.put_vector(self.motion);
        cursor.put_rotation(self.rotation, features.head_yaw);
        cursor.put_attribute_map(&self.attributes);
        cursor.put_entity_data(&self.entity_data);
        if features.entity_links {
            cursor.put_uvarint32(self.links.len() as u32);
            for link in &self.links {
                cursor.put_unique_id(link.from);
                cursor.put_unique_id(link.to);
                cursor.put_u8(link.link_type);
            }
        }
    }

    fn decode(&mut self, cursor: &mut BinaryCursor, features: &Features) -> CodecResult<()> {
        self.unique_id = cursor.get_unique_id()?;
        self.runtime_id = cursor.get_runtime_id()?;
        self.entity_type = cursor.get_uvarint32()?;
        self.position = cursor.get_vector()?;
        self.motion = cursor.get_vector()?;
        self.rotation = cursor.get_rotation(features.head_yaw)?;
        self.attributes = cursor.get_attribute_map()?;
        self.entity_data = cursor.get_entity_data()?;
        self.links.clear();
        if features.entity_links {
            let count = cursor.get_uvarint32()?;
            for _ in 0..count {
                self.links.push(EntityLink {
                    from: cursor.get_unique_id()?,
                    to: cursor.get_unique_id()?,
                    link_type: cursor.get_u8()?,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoveEntity {
    pub unique_id: i64,
}

impl Packet for RemoveEntity {
    const KIND: PacketKind = PacketKind::RemoveEntity;

    fn encode(&self, cursor: &mut BinaryCursor, _features: &Features) {
        cursor.put_unique_id(self.unique_id);
    }

    fn decode(&mut self, cursor: &mut BinaryCursor, _features: &Features) -> CodecResult<()> {
        self.unique_id = cursor.get_unique_id()?;
        Ok(())
    }
}

/// Player movement; sent by clients and relayed by the server.
///
/// Always carries a head yaw, regardless of version.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MovePlayer {
    pub runtime_id: u64,
    pub position: Vector3,
    pub rotation: Rotation,
    pub mode: u8,
    pub on_ground: bool,
}

impl MovePlayer {
    pub const MODE_NORMAL: u8 = 0;
    pub const MODE_RESET: u8 = 1;
    pub const MODE_TELEPORT: u8 = 2;
}

impl Packet for MovePlayer {
    const KIND: PacketKind = PacketKind::MovePlayer;

    fn encode(&self, cursor: &mut BinaryCursor, _features: &Features) {
        cursor.put_runtime_id(self.runtime_id);
        cursor.put_vector(self.position);
        cursor.put_rotation(self.rotation, true);
        cursor.put_u8(self.mode);
        cursor.put_bool(self.on_ground);
    }

    fn decode(&mut self, cursor: &mut BinaryCursor, _features: &Features) -> CodecResult<()> {
        self.runtime_id = cursor.get_runtime_id()?;
        self.position = cursor.get_vector()?;
        self.rotation = cursor.get_rotation(true)?;
        self.mode = cursor.get_u8()?;
        self.on_ground = cursor.get_bool()?;
        Ok(())
    }
}

/// A single block change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateBlock {
    pub position: BlockPosition,
    pub block_id: u32,
    pub block_metadata: u32,
    pub flags: u32,
}

impl UpdateBlock {
    pub const FLAG_NONE: u32 = 0;
    pub const FLAG_NEIGHBORS: u32 = 0x1;
    pub const FLAG_NETWORK: u32 = 0x2;
    pub const FLAG_PRIORITY: u32 = 0x8;
}

impl Packet for UpdateBlock {
    const KIND: PacketKind = PacketKind::UpdateBlock;

    fn encode(&self, cursor: &mut BinaryCursor, _features: &Features) {
        cursor.put_block_position(self.position);
        cursor.put_uvarint32(self.block_id);
        cursor.put_uvarint32(self.block_metadata);
        cursor.put_uvarint32(self.flags);
    }

    fn decode(&mut self, cursor: &mut BinaryCursor, _features: &Features) -> CodecResult<()> {
        self.position = cursor.get_block_position()?;
        self.block_id = cursor.get_uvarint32()?;
        self.block_metadata = cursor.get_uvarint32()?;
        self.flags = cursor.get_uvarint32()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerListEntry {
    pub unique_id: i64,
    /// Not sent for removals; always empty after decoding one.
    pub name: String,
}

/// Adds players to or removes them from the client's player list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerList {
    pub list_type: u8,
    pub entries: Vec<PlayerListEntry>,
}

impl PlayerList {
    pub const ADD: u8 = 0;
    pub const REMOVE: u8 = 1;

    pub fn add(entries: Vec<PlayerListEntry>) -> Self {
        Self {
            list_type: Self::ADD,
            entries,
        }
    }

    pub fn remove(unique_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            list_type: Self::REMOVE,
            entries: unique_ids
                .into_iter()
                .map(|unique_id| PlayerListEntry {
                    unique_id,
                    name: String::new(),
                })
                .collect(),
        }
    }
}

impl Packet for PlayerList {
    const KIND: PacketKind = PacketKind::PlayerList;

    fn encode(&self, cursor: &mut BinaryCursor, _features: &Features) {
        cursor.put_u8(self.list_type);
        cursor.put_uvarint32(self.entries.len() as u32);
        for entry in &self.entries {
            cursor.put_unique_id(entry.unique_id);
            if self.list_type == Self::ADD {
                cursor.put_string(&entry.name);
            }
        }
    }

    fn decode(&mut self, cursor: &mut BinaryCursor, _features: &Features) -> CodecResult<()> {
        self.list_type = cursor.get_u8()?;
        let count = cursor.get_uvarint32()?;
        self.entries.clear();
        for _ in 0..count {
            let unique_id = cursor.get_unique_id()?;
            let name = if self.list_type == Self::ADD {
                cursor.get_string()?
            } else {
                String::new()
            };
            self.entries.push(PlayerListEntry { unique_id, name });
        }
        Ok(())
    }
}
