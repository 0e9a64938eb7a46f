//! Batches: several packets sent as one datagram.
//!
//! Layout: `0xFE`, then for each packet `uvarint length` and the encoded
//! payload. Payload ids depend on the receiving session's version, so a
//! batch is kept as packets and encoded per version on demand.

use crate::cursor::BinaryCursor;
use crate::error::{CodecError, CodecResult};
use crate::packet::GamePacket;
use crate::registry::PacketRegistry;
use crate::version::ProtocolVersion;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// First byte of every batch datagram.
pub const BATCH_HEADER: u8 = 0xfe;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    packets: Vec<GamePacket>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, packet: impl Into<GamePacket>) {
        self.packets.push(packet.into());
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn packets(&self) -> &[GamePacket] {
        &self.packets
    }

    /// Encodes every packet with `registry`'s ids and layout.
    pub fn encode(&self, registry: &PacketRegistry) -> CodecResult<Vec<u8>> {
        let mut cursor = BinaryCursor::new();
        cursor.put_u8(BATCH_HEADER);
        for packet in &self.packets {
            cursor.put_bytes(&registry.encode(packet)?);
        }
        Ok(cursor.into_bytes())
    }
}

impl From<Vec<GamePacket>> for Batch {
    fn from(packets: Vec<GamePacket>) -> Self {
        Self { packets }
    }
}

/// A batch encoded at most once per protocol version.
///
/// Used when the same packets go to many sessions that may speak different
/// revisions.
#[derive(Debug, Default)]
pub struct BroadcastBatch {
    batch: Batch,
    encoded: HashMap<ProtocolVersion, Vec<u8>>,
}

impl BroadcastBatch {
    pub fn new(batch: Batch) -> Self {
        Self {
            batch,
            encoded: HashMap::new(),
        }
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn encoded_for(&mut self, registry: &PacketRegistry) -> CodecResult<&[u8]> {
        let bytes = match self.encoded.entry(registry.version()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.batch.encode(registry)?),
        };
        Ok(bytes.as_slice())
    }

    /// Number of distinct versions encoded so far.
    pub fn encodings(&self) -> usize {
        self.encoded.len()
    }
}

/// Splits a batch datagram into its packet payloads.
pub fn split_batch(datagram: &[u8]) -> CodecResult<Vec<Vec<u8>>> {
    let mut cursor = BinaryCursor::from_bytes(datagram);
    let header = cursor.get_u8()?;
    if header != BATCH_HEADER {
        return Err(CodecError::NotABatch { found: header });
    }
    let mut payloads = Vec::new();
    while !cursor.is_exhausted() {
        payloads.push(cursor.get_bytes()?);
    }
    Ok(payloads)
}

/// Decodes every payload of a batch independently.
///
/// A malformed payload yields an error in its slot without affecting the
/// others.
pub fn decode_batch(datagram: &[u8], registry: &PacketRegistry) -> CodecResult<Vec<CodecResult<GamePacket>>> {
    Ok(split_batch(datagram)?
        .iter()
        .map(|payload| registry.decode(payload))
        .collect())
}
