//! # Protocol Library
//!
//! Versioned binary codec shared by the server and its test client. It defines
//! every message type, the primitive reader/writer those messages are built
//! from, and the per-version id tables that let several client revisions talk
//! to one server at the same time.
//!
//! ## Layers
//!
//! ### Binary Cursor (`cursor`)
//! A position-tracked byte buffer with symmetric `put_*`/`get_*` primitives:
//! fixed-width little-endian integers, zig-zag and unsigned varints,
//! length-prefixed strings and byte sequences, vectors, rotations, attribute
//! maps and entity metadata. Every read is bounds-checked and fails with
//! `BufferUnderrun` instead of panicking.
//!
//! ### Packets (`packet`, `packets`)
//! Each message type implements [`Packet`] and encodes using cursor
//! primitives only. Layout differences between revisions are driven by the
//! version's [`Features`], never by the packet value itself.
//!
//! ### Registries (`registry`, `version`)
//! A [`PacketRegistry`] maps one revision's numeric ids to descriptors;
//! [`ProtocolRegistry`] holds one registry per [`ProtocolVersion`]. A session
//! picks its version from the login packet and keeps it for its lifetime.
//!
//! ### Batches (`batch`)
//! Several packets travel in one datagram. [`BroadcastBatch`] encodes the same
//! packets at most once per revision when fanning out to many sessions.
//!
//! ## Usage Example
//!
//! ```rust
//! use protocol::{Batch, GamePacket, ProtocolRegistry, ProtocolVersion, Text};
//!
//! let protocols = ProtocolRegistry::with_defaults().unwrap();
//! let registry = protocols.registry(ProtocolVersion::V220).unwrap();
//!
//! let mut batch = Batch::new();
//! batch.add(Text::raw("Welcome!"));
//! let datagram = batch.encode(registry).unwrap();
//!
//! let decoded = protocol::decode_batch(&datagram, registry).unwrap();
//! assert_eq!(decoded[0], Ok(GamePacket::Text(Text::raw("Welcome!"))));
//! ```

pub mod batch;
pub mod cursor;
pub mod error;
pub mod packet;
pub mod packets;
pub mod registry;
pub mod types;
pub mod version;

pub use batch::{decode_batch, split_batch, Batch, BroadcastBatch, BATCH_HEADER};
pub use cursor::BinaryCursor;
pub use error::{CodecError, CodecResult};
pub use packet::{GamePacket, Packet, PacketKind};
pub use packets::{
    AddEntity, ClientToServerHandshake, Disconnect, EntityLink, Login, MovePlayer, PlayStatus,
    PlayerList, PlayerListEntry, RemoveEntity, ServerToClientHandshake, Text, UpdateBlock,
};
pub use registry::{
    default_versions, PacketDescriptor, PacketFactory, PacketRegistry, ProtocolRegistry, LOGIN_ID,
};
pub use types::{
    Attribute, AttributeMap, BlockPosition, EntityDataMap, EntityDataValue, Rotation, Vector3,
    CHUNK_WIDTH,
};
pub use version::{Features, ProtocolVersion, VersionInfo};
