//! Error types for the packet codec framework.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding, decoding or resolving packets.
///
/// Every variant except `DuplicateId` is local to a single packet: the
/// caller drops the offending message and keeps the connection alive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A read asked for more bytes than the buffer still holds.
    #[error("buffer underrun: requested {requested} bytes but only {available} available")]
    BufferUnderrun { requested: usize, available: usize },

    /// A variable-length integer did not terminate within its maximum width.
    #[error("variable-length integer exceeds {max_bytes} bytes")]
    VarIntTooLong { max_bytes: usize },

    /// A length-prefixed string was not valid UTF-8.
    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    /// An entity data entry used a type tag outside the known set.
    #[error("unknown entity data type tag {tag} for key {key}")]
    UnknownEntityDataType { key: u32, tag: u32 },

    /// No descriptor is registered under this id for the version.
    #[error("unknown packet id {id:#04x} for protocol {version}")]
    UnknownPacket { version: u32, id: u32 },

    /// The protocol number is not registered at all.
    #[error("unsupported protocol version {version}")]
    UnknownVersion { version: u32 },

    /// Two descriptors were registered under the same id for one version.
    #[error("packet id {id:#04x} registered twice for protocol {version}")]
    DuplicateId { version: u32, id: u32 },

    /// The packet type has no id in this version's catalogue.
    #[error("packet {kind} is not part of protocol {version}")]
    PacketNotInVersion { version: u32, kind: &'static str },

    /// A datagram did not start with the batch header.
    #[error("datagram does not start with the batch header (found {found:#04x})")]
    NotABatch { found: u8 },
}

impl CodecError {
    /// Returns true for errors that can only happen while building registries.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DuplicateId { .. })
    }
}
