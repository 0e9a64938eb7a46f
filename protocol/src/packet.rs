//! The packet capability and the closed set of message types.

use crate::cursor::BinaryCursor;
use crate::error::CodecResult;
use crate::packets::{
    AddEntity, ClientToServerHandshake, Disconnect, Login, MovePlayer, PlayStatus, PlayerList,
    RemoveEntity, ServerToClientHandshake, Text, UpdateBlock,
};
use crate::version::Features;
use std::fmt;

/// A message type with a symmetric codec.
///
/// `decode` fills a freshly created default instance; it must read exactly
/// the fields `encode` writes for the same feature set.
pub trait Packet: Default {
    const KIND: PacketKind;

    fn encode(&self, cursor: &mut BinaryCursor, features: &Features);

    fn decode(&mut self, cursor: &mut BinaryCursor, features: &Features) -> CodecResult<()>;
}

/// Identifies a message type independently of any version's numeric ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketKind {
    Login,
    PlayStatus,
    ServerToClientHandshake,
    ClientToServerHandshake,
    Disconnect,
    Text,
    AddEntity,
    RemoveEntity,
    MovePlayer,
    UpdateBlock,
    PlayerList,
}

impl PacketKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login => "Login",
            Self::PlayStatus => "PlayStatus",
            Self::ServerToClientHandshake => "ServerToClientHandshake",
            Self::ClientToServerHandshake => "ClientToServerHandshake",
            Self::Disconnect => "Disconnect",
            Self::Text => "Text",
            Self::AddEntity => "AddEntity",
            Self::RemoveEntity => "RemoveEntity",
            Self::MovePlayer => "MovePlayer",
            Self::UpdateBlock => "UpdateBlock",
            Self::PlayerList => "PlayerList",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Any decoded or outgoing packet.
#[derive(Debug, Clone, PartialEq)]
pub enum GamePacket {
    Login(Login),
    PlayStatus(PlayStatus),
    ServerToClientHandshake(ServerToClientHandshake),
    ClientToServerHandshake(ClientToServerHandshake),
    Disconnect(Disconnect),
    Text(Text),
    AddEntity(AddEntity),
    RemoveEntity(RemoveEntity),
    MovePlayer(MovePlayer),
    UpdateBlock(UpdateBlock),
    PlayerList(PlayerList),
}

impl GamePacket {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Login(_) => Login::KIND,
            Self::PlayStatus(_) => PlayStatus::KIND,
            Self::ServerToClientHandshake(_) => ServerToClientHandshake::KIND,
            Self::ClientToServerHandshake(_) => ClientToServerHandshake::KIND,
            Self::Disconnect(_) => Disconnect::KIND,
            Self::Text(_) => Text::KIND,
            Self::AddEntity(_) => AddEntity::KIND,
            Self::RemoveEntity(_) => RemoveEntity::KIND,
            Self::MovePlayer(_) => MovePlayer::KIND,
            Self::UpdateBlock(_) => UpdateBlock::KIND,
            Self::PlayerList(_) => PlayerList::KIND,
        }
    }

    pub fn encode(&self, cursor: &mut BinaryCursor, features: &Features) {
        match self {
            Self::Login(pk) => pk.encode(cursor, features),
            Self::PlayStatus(pk) => pk.encode(cursor, features),
            Self::ServerToClientHandshake(pk) => pk.encode(cursor, features),
            Self::ClientToServerHandshake(pk) => pk.encode(cursor, features),
            Self::Disconnect(pk) => pk.encode(cursor, features),
            Self::Text(pk) => pk.encode(cursor, features),
            Self::AddEntity(pk) => pk.encode(cursor, features),
            Self::RemoveEntity(pk) => pk.encode(cursor, features),
            Self::MovePlayer(pk) => pk.encode(cursor, features),
            Self::UpdateBlock(pk) => pk.encode(cursor, features),
            Self::PlayerList(pk) => pk.encode(cursor, features),
        }
    }

    pub fn decode(&mut self, cursor: &mut BinaryCursor, features: &Features) -> CodecResult<()> {
        match self {
            Self::Login(pk) => pk.decode(cursor, features),
            Self::PlayStatus(pk) => pk.decode(cursor, features),
            Self::ServerToClientHandshake(pk) => pk.decode(cursor, features),
            Self::ClientToServerHandshake(pk) => pk.decode(cursor, features),
            Self::Disconnect(pk) => pk.decode(cursor, features),
            Self::Text(pk) => pk.decode(cursor, features),
            Self::AddEntity(pk) => pk.decode(cursor, features),
            Self::RemoveEntity(pk) => pk.decode(cursor, features),
            Self::MovePlayer(pk) => pk.decode(cursor, features),
            Self::UpdateBlock(pk) => pk.decode(cursor, features),
            Self::PlayerList(pk) => pk.decode(cursor, features),
        }
    }
}

macro_rules! impl_from_packet {
    ($($name:ident),* $(,)?) => {
        $(
            impl From<$name> for GamePacket {
                fn from(packet: $name) -> Self {
                    GamePacket::$name(packet)
                }
            }
        )*
    };
}

impl_from_packet!(
    Login,
    PlayStatus,
    ServerToClientHandshake,
    ClientToServerHandshake,
    Disconnect,
    Text,
    AddEntity,
    RemoveEntity,
    MovePlayer,
    UpdateBlock,
    PlayerList,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let packet: GamePacket = UpdateBlock::default().into();
        assert_eq!(packet.kind(), PacketKind::UpdateBlock);

        let packet: GamePacket = Text::default().into();
        assert_eq!(packet.kind(), PacketKind::Text);
        assert_eq!(packet.kind().to_string(), "Text");
    }
}
