//! Per-version packet registries.
//!
//! Every protocol revision owns an independent [`PacketRegistry`] mapping its
//! numeric ids to packet descriptors. [`ProtocolRegistry`] keeps one registry
//! per version so sessions on different revisions can share a server.

use crate::cursor::BinaryCursor;
use crate::error::{CodecError, CodecResult};
use crate::packet::{GamePacket, Packet, PacketKind};
use crate::packets::{
    AddEntity, ClientToServerHandshake, Disconnect, Login, MovePlayer, PlayStatus, PlayerList,
    RemoveEntity, ServerToClientHandshake, Text, UpdateBlock,
};
use crate::version::{Features, ProtocolVersion, VersionInfo};
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// Id of the login packet, identical in every version.
pub const LOGIN_ID: u32 = 0x01;

/// Produces a fresh default instance of one packet type.
pub type PacketFactory = fn() -> GamePacket;

fn make<P: Packet + Into<GamePacket>>() -> GamePacket {
    P::default().into()
}

#[derive(Debug, Clone, Copy)]
pub struct PacketDescriptor {
    pub id: u32,
    pub version: ProtocolVersion,
    pub kind: PacketKind,
    pub factory: PacketFactory,
}

impl PacketDescriptor {
    /// Creates a new zero-valued packet of this type.
    pub fn create(&self) -> GamePacket {
        (self.factory)()
    }
}

/// Id table of a single protocol revision.
#[derive(Debug, Clone)]
pub struct PacketRegistry {
    info: VersionInfo,
    by_id: HashMap<u32, PacketDescriptor>,
    ids: HashMap<PacketKind, u32>,
}

impl PacketRegistry {
    pub fn new(info: VersionInfo) -> Self {
        Self {
            info,
            by_id: HashMap::new(),
            ids: HashMap::new(),
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.info.version
    }

    pub fn info(&self) -> &VersionInfo {
        &self.info
    }

    pub fn features(&self) -> &Features {
        &self.info.features
    }

    /// Registers `factory` under `id`. Fails if the id is already taken.
    pub fn register(&mut self, id: u32, kind: PacketKind, factory: PacketFactory) -> CodecResult<()> {
        if self.by_id.contains_key(&id) {
            return Err(CodecError::DuplicateId {
                version: self.info.version.0,
                id,
            });
        }
        self.by_id.insert(
            id,
            PacketDescriptor {
                id,
                version: self.info.version,
                kind,
                factory,
            },
        );
        self.ids.insert(kind, id);
        Ok(())
    }

    /// Typed shorthand for [`register`](Self::register).
    pub fn register_packet<P: Packet + Into<GamePacket>>(&mut self, id: u32) -> CodecResult<()> {
        self.register(id, P::KIND, make::<P>)
    }

    pub fn resolve(&self, id: u32) -> CodecResult<&PacketDescriptor> {
        self.by_id.get(&id).ok_or(CodecError::UnknownPacket {
            version: self.info.version.0,
            id,
        })
    }

    pub fn id_of(&self, kind: PacketKind) -> CodecResult<u32> {
        self.ids
            .get(&kind)
            .copied()
            .ok_or(CodecError::PacketNotInVersion {
                version: self.info.version.0,
                kind: kind.name(),
            })
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Descriptors sorted by id.
    pub fn descriptors(&self) -> Vec<&PacketDescriptor> {
        let mut descriptors: Vec<_> = self.by_id.values().collect();
        descriptors.sort_by_key(|descriptor| descriptor.id);
        descriptors
    }

    /// Encodes `packet` as `uvarint id` followed by its fields.
    pub fn encode(&self, packet: &GamePacket) -> CodecResult<Vec<u8>> {
        let id = self.id_of(packet.kind())?;
        let mut cursor = BinaryCursor::new();
        cursor.put_uvarint32(id);
        packet.encode(&mut cursor, &self.info.features);
        Ok(cursor.into_bytes())
    }

    /// Decodes one payload. Nothing is returned unless every field decoded.
    pub fn decode(&self, payload: &[u8]) -> CodecResult<GamePacket> {
        let mut cursor = BinaryCursor::from_bytes(payload);
        let id = cursor.get_uvarint32()?;
        let descriptor = self.resolve(id)?;
        let mut packet = descriptor.create();
        packet.decode(&mut cursor, &self.info.features)?;
        if !cursor.is_exhausted() {
            debug!(
                "{} ({}) left {} trailing bytes",
                descriptor.kind,
                self.info.version,
                cursor.remaining()
            );
        }
        Ok(packet)
    }
}

/// All registered protocol revisions.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRegistry {
    registries: BTreeMap<ProtocolVersion, PacketRegistry>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the default catalogue for 160, 200, 201 and 220.
    pub fn with_defaults() -> CodecResult<Self> {
        let mut registry = Self::new();
        for info in default_versions() {
            let table = if info.version == ProtocolVersion::V160 {
                &LEGACY_IDS
            } else {
                &CURRENT_IDS
            };
            registry.add_version(info);
            for (kind, id) in table.iter() {
                registry.register(info.version, *id, *kind, factory_for(*kind))?;
            }
        }
        Ok(registry)
    }

    /// Adds an empty registry for `info`, replacing any previous one.
    pub fn add_version(&mut self, info: VersionInfo) {
        self.registries.insert(info.version, PacketRegistry::new(info));
    }

    pub fn register(
        &mut self,
        version: ProtocolVersion,
        id: u32,
        kind: PacketKind,
        factory: PacketFactory,
    ) -> CodecResult<()> {
        self.registries
            .get_mut(&version)
            .ok_or(CodecError::UnknownVersion { version: version.0 })?
            .register(id, kind, factory)
    }

    pub fn resolve(&self, version: ProtocolVersion, id: u32) -> CodecResult<&PacketDescriptor> {
        self.registry(version)?.resolve(id)
    }

    pub fn registry(&self, version: ProtocolVersion) -> CodecResult<&PacketRegistry> {
        self.registries
            .get(&version)
            .ok_or(CodecError::UnknownVersion { version: version.0 })
    }

    pub fn contains(&self, version: ProtocolVersion) -> bool {
        self.registries.contains_key(&version)
    }

    pub fn versions(&self) -> impl Iterator<Item = ProtocolVersion> + '_ {
        self.registries.keys().copied()
    }

    pub fn oldest(&self) -> Option<ProtocolVersion> {
        self.registries.keys().next().copied()
    }

    pub fn latest(&self) -> Option<ProtocolVersion> {
        self.registries.keys().next_back().copied()
    }

    /// Reads the protocol number from a login payload.
    ///
    /// Fails with `UnknownPacket` if the payload is not a login and with
    /// `UnknownVersion` if the number is not registered.
    pub fn negotiate(&self, payload: &[u8]) -> CodecResult<ProtocolVersion> {
        let requested = Self::peek_login_protocol(payload)?;
        if self.contains(requested) {
            Ok(requested)
        } else {
            Err(CodecError::UnknownVersion {
                version: requested.0,
            })
        }
    }

    /// Protocol number of a login payload, registered or not.
    pub fn peek_login_protocol(payload: &[u8]) -> CodecResult<ProtocolVersion> {
        let mut cursor = BinaryCursor::from_bytes(payload);
        let id = cursor.get_uvarint32()?;
        if id != LOGIN_ID {
            return Err(CodecError::UnknownPacket { version: 0, id });
        }
        Ok(ProtocolVersion(cursor.get_i32_be()? as u32))
    }
}

/// Revisions registered at startup, oldest first.
pub fn default_versions() -> [VersionInfo; 4] {
    let legacy = Features {
        head_yaw: false,
        entity_links: false,
    };
    let current = Features {
        head_yaw: true,
        entity_links: true,
    };
    [
        VersionInfo::new(ProtocolVersion::V160, "1.2.0", legacy),
        VersionInfo::new(ProtocolVersion::V200, "1.2.10", current),
        VersionInfo::new(ProtocolVersion::V201, "1.2.10.2", current),
        VersionInfo::new(ProtocolVersion::V220, "1.2.13", current),
    ]
}

const LEGACY_IDS: [(PacketKind, u32); 11] = [
    (PacketKind::Login, LOGIN_ID),
    (PacketKind::PlayStatus, 0x02),
    (PacketKind::ServerToClientHandshake, 0x03),
    (PacketKind::ClientToServerHandshake, 0x04),
    (PacketKind::Disconnect, 0x05),
    (PacketKind::Text, 0x09),
    (PacketKind::AddEntity, 0x0c),
    (PacketKind::RemoveEntity, 0x0d),
    (PacketKind::MovePlayer, 0x12),
    (PacketKind::UpdateBlock, 0x14),
    (PacketKind::PlayerList, 0x3e),
];

const CURRENT_IDS: [(PacketKind, u32); 11] = [
    (PacketKind::Login, LOGIN_ID),
    (PacketKind::PlayStatus, 0x02),
    (PacketKind::ServerToClientHandshake, 0x03),
    (PacketKind::ClientToServerHandshake, 0x04),
    (PacketKind::Disconnect, 0x05),
    (PacketKind::Text, 0x09),
    (PacketKind::AddEntity, 0x0d),
    (PacketKind::RemoveEntity, 0x0e),
    (PacketKind::MovePlayer, 0x13),
    (PacketKind::UpdateBlock, 0x15),
    (PacketKind::PlayerList, 0x3f),
];

fn factory_for(kind: PacketKind) -> PacketFactory {
    match kind {
        PacketKind::Login => make::<Login>,
        PacketKind::PlayStatus => make::<PlayStatus>,
        PacketKind::ServerToClientHandshake => make::<ServerToClientHandshake>,
        PacketKind::ClientToServerHandshake => make::<ClientToServerHandshake>,
        PacketKind::Disconnect => make::<Disconnect>,
        PacketKind::Text => make::<Text>,
        PacketKind::AddEntity => make::<AddEntity>,
        PacketKind::RemoveEntity => make::<RemoveEntity>,
        PacketKind::MovePlayer => make::<MovePlayer>,
        PacketKind::UpdateBlock => make::<UpdateBlock>,
        PacketKind::PlayerList => make::<PlayerList>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockPosition;

    fn login_payload(protocol: u32) -> Vec<u8> {
        let registry = ProtocolRegistry::with_defaults().unwrap();
        let packet = GamePacket::Login(Login {
            protocol,
            display_name: "Steve".to_string(),
            client_key: Vec::new(),
        });
        registry
            .registry(ProtocolVersion::V200)
            .unwrap()
            .encode(&packet)
            .unwrap()
    }

    #[test]
    fn test_defaults_register_every_kind_in_every_version() {
        let registry = ProtocolRegistry::with_defaults().unwrap();
        let versions: Vec<_> = registry.versions().collect();
        assert_eq!(
            versions,
            vec![
                ProtocolVersion::V160,
                ProtocolVersion::V200,
                ProtocolVersion::V201,
                ProtocolVersion::V220
            ]
        );
        for version in versions {
            let table = registry.registry(version).unwrap();
            assert_eq!(table.len(), 11);
            for descriptor in table.descriptors() {
                assert_eq!(descriptor.version, version);
                assert_eq!(descriptor.create().kind(), descriptor.kind);
                assert_eq!(table.id_of(descriptor.kind).unwrap(), descriptor.id);
            }
        }
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut registry = PacketRegistry::new(default_versions()[1]);
        registry.register_packet::<Text>(0x09).unwrap();
        assert_eq!(
            registry.register_packet::<Disconnect>(0x09),
            Err(CodecError::DuplicateId {
                version: 200,
                id: 0x09
            })
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve(0x09).unwrap().kind, PacketKind::Text);
    }

    #[test]
    fn test_same_id_allowed_in_different_versions() {
        let mut registry = ProtocolRegistry::new();
        registry.add_version(default_versions()[0]);
        registry.add_version(default_versions()[3]);
        registry
            .register(ProtocolVersion::V160, 0x0d, PacketKind::RemoveEntity, make::<RemoveEntity>)
            .unwrap();
        registry
            .register(ProtocolVersion::V220, 0x0d, PacketKind::AddEntity, make::<AddEntity>)
            .unwrap();

        assert_eq!(
            registry.resolve(ProtocolVersion::V160, 0x0d).unwrap().kind,
            PacketKind::RemoveEntity
        );
        assert_eq!(
            registry.resolve(ProtocolVersion::V220, 0x0d).unwrap().kind,
            PacketKind::AddEntity
        );
    }

    #[test]
    fn test_register_into_missing_version() {
        let mut registry = ProtocolRegistry::new();
        assert_eq!(
            registry.register(ProtocolVersion(999), 1, PacketKind::Login, make::<Login>),
            Err(CodecError::UnknownVersion { version: 999 })
        );
    }

    #[test]
    fn test_unknown_packet_id() {
        let registry = ProtocolRegistry::with_defaults().unwrap();
        assert!(matches!(
            registry.resolve(ProtocolVersion::V220, 0x7f),
            Err(CodecError::UnknownPacket { version: 220, id: 0x7f })
        ));

        let table = registry.registry(ProtocolVersion::V220).unwrap();
        assert_eq!(
            table.decode(&[0x7f, 0x00]),
            Err(CodecError::UnknownPacket { version: 220, id: 0x7f })
        );
    }

    #[test]
    fn test_ids_differ_between_versions() {
        let registry = ProtocolRegistry::with_defaults().unwrap();
        let packet = GamePacket::UpdateBlock(UpdateBlock {
            position: BlockPosition::new(1, 2, 3),
            block_id: 4,
            block_metadata: 0,
            flags: UpdateBlock::FLAG_NETWORK,
        });

        let legacy = registry.registry(ProtocolVersion::V160).unwrap().encode(&packet).unwrap();
        let current = registry.registry(ProtocolVersion::V220).unwrap().encode(&packet).unwrap();
        assert_eq!(legacy[0], 0x14);
        assert_eq!(current[0], 0x15);
        assert_eq!(legacy[1..], current[1..]);

        assert_eq!(
            registry.registry(ProtocolVersion::V160).unwrap().decode(&legacy).unwrap(),
            packet
        );
        // The same bytes mean something else on another version
        assert_ne!(
            registry.registry(ProtocolVersion::V220).unwrap().decode(&legacy).ok(),
            Some(packet)
        );
    }

    #[test]
    fn test_packet_not_in_version() {
        let mut registry = PacketRegistry::new(default_versions()[2]);
        registry.register_packet::<Login>(LOGIN_ID).unwrap();
        assert_eq!(
            registry.encode(&GamePacket::Text(Text::raw("hi"))),
            Err(CodecError::PacketNotInVersion {
                version: 201,
                kind: "Text"
            })
        );
    }

    #[test]
    fn test_negotiate() {
        let registry = ProtocolRegistry::with_defaults().unwrap();
        assert_eq!(
            registry.negotiate(&login_payload(201)),
            Ok(ProtocolVersion::V201)
        );
        assert_eq!(
            registry.negotiate(&login_payload(137)),
            Err(CodecError::UnknownVersion { version: 137 })
        );
        assert_eq!(
            registry.negotiate(&[0x09, 0x00]),
            Err(CodecError::UnknownPacket { version: 0, id: 0x09 })
        );
        assert!(matches!(
            registry.negotiate(&[0x01, 0x00]),
            Err(CodecError::BufferUnderrun { .. })
        ));
        assert_eq!(registry.oldest(), Some(ProtocolVersion::V160));
        assert_eq!(registry.latest(), Some(ProtocolVersion::V220));
    }
}
