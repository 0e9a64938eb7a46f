//! Dimensions: chunk storage, per-chunk interest and pending block mutations.
//!
//! World writes never broadcast directly. They are recorded per chunk and
//! delivered once per tick by [`Dimension::flush`], each chunk's batch going
//! to exactly the sessions interested in that chunk.

use crate::chunk::{Chunk, ChunkIndex, ChunkProvider};
use crate::error::ServerResult;
use crate::network::{ConnectionHandle, Transport};
use log::{debug, warn};
use protocol::{Batch, BlockPosition, BroadcastBatch, ProtocolRegistry, ProtocolVersion, UpdateBlock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::iter::Sum;
use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DimensionId {
    Overworld = 0,
    Nether = 1,
    End = 2,
}

impl DimensionId {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(DimensionId::Overworld),
            1 => Some(DimensionId::Nether),
            2 => Some(DimensionId::End),
            _ => None,
        }
    }

    pub fn id(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DimensionId::Overworld => "overworld",
            DimensionId::Nether => "nether",
            DimensionId::End => "end",
        };
        f.write_str(name)
    }
}

/// A block write waiting for the next flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMutation {
    pub index: ChunkIndex,
    pub position: BlockPosition,
    pub block_id: u32,
    pub block_meta: u32,
}

/// What one flush did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Chunks whose pending list was drained.
    pub chunks: usize,
    pub mutations: usize,
    /// Batches handed to the transport.
    pub deliveries: usize,
    /// Mutations cleared without any interested session.
    pub discarded: usize,
}

impl AddAssign for FlushReport {
    fn add_assign(&mut self, other: Self) {
        self.chunks += other.chunks;
        self.mutations += other.mutations;
        self.deliveries += other.deliveries;
        self.discarded += other.discarded;
    }
}

impl Sum for FlushReport {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut total, report| {
            total += report;
            total
        })
    }
}

/// Chunk coordinates within `radius` of `center`, as a square.
pub fn chunks_around(center: (i32, i32), radius: i32) -> BTreeSet<ChunkIndex> {
    let (cx, cz) = center;
    let mut chunks = BTreeSet::new();
    for x in cx.saturating_sub(radius)..=cx.saturating_add(radius) {
        for z in cz.saturating_sub(radius)..=cz.saturating_add(radius) {
            chunks.insert(ChunkIndex::pack(x, z));
        }
    }
    chunks
}

pub struct Dimension {
    name: String,
    id: DimensionId,
    level: String,
    chunks: HashMap<ChunkIndex, Chunk>,
    interest: HashMap<ChunkIndex, BTreeMap<ConnectionHandle, ProtocolVersion>>,
    pending: HashMap<ChunkIndex, Vec<PendingMutation>>,
    provider: Option<Box<dyn ChunkProvider>>,
}

impl Dimension {
    pub fn new(name: impl Into<String>, id: DimensionId, level: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id,
            level: level.into(),
            chunks: HashMap::new(),
            interest: HashMap::new(),
            pending: HashMap::new(),
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: Box<dyn ChunkProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> DimensionId {
        self.id
    }

    pub fn level_name(&self) -> &str {
        &self.level
    }

    pub fn set_chunk(&mut self, x: i32, z: i32, chunk: Chunk) {
        self.chunks.insert(ChunkIndex::pack(x, z), chunk);
    }

    pub fn get_chunk(&self, x: i32, z: i32) -> Option<&Chunk> {
        self.chunks.get(&ChunkIndex::pack(x, z))
    }

    pub fn is_chunk_loaded(&self, x: i32, z: i32) -> bool {
        self.chunks.contains_key(&ChunkIndex::pack(x, z))
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the chunk, loading it from the provider or creating an empty
    /// one when it is not in memory.
    pub fn load_chunk(&mut self, x: i32, z: i32) -> ServerResult<&mut Chunk> {
        let index = ChunkIndex::pack(x, z);
        if !self.chunks.contains_key(&index) {
            let loaded = match self.provider.as_mut() {
                Some(provider) => provider.get_chunk(x, z)?,
                None => None,
            };
            let chunk = loaded.unwrap_or_else(|| Chunk::new(x, z));
            self.chunks.insert(index, chunk);
        }
        Ok(self.chunks.entry(index).or_insert_with(|| Chunk::new(x, z)))
    }

    pub fn add_interest(
        &mut self,
        x: i32,
        z: i32,
        handle: ConnectionHandle,
        version: ProtocolVersion,
    ) {
        self.interest
            .entry(ChunkIndex::pack(x, z))
            .or_default()
            .insert(handle, version);
    }

    pub fn remove_interest(&mut self, x: i32, z: i32, handle: ConnectionHandle) -> bool {
        let index = ChunkIndex::pack(x, z);
        let Some(watchers) = self.interest.get_mut(&index) else {
            return false;
        };
        let removed = watchers.remove(&handle).is_some();
        if watchers.is_empty() {
            self.interest.remove(&index);
        }
        removed
    }

    /// Drops every interest entry held by `handle`. Returns how many chunks
    /// it was watching.
    pub fn remove_session(&mut self, handle: ConnectionHandle) -> usize {
        let mut removed = 0;
        self.interest.retain(|_, watchers| {
            if watchers.remove(&handle).is_some() {
                removed += 1;
            }
            !watchers.is_empty()
        });
        removed
    }

    /// Sessions interested in a chunk, in handle order.
    pub fn interested(&self, x: i32, z: i32) -> Vec<ConnectionHandle> {
        self.interest
            .get(&ChunkIndex::pack(x, z))
            .map(|watchers| watchers.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Sessions interested in any chunk of this dimension.
    pub fn watchers(&self) -> BTreeSet<ConnectionHandle> {
        self.interest
            .values()
            .flat_map(|watchers| watchers.keys().copied())
            .collect()
    }

    /// Appends a mutation to the pending list of the block's chunk without
    /// broadcasting it.
    pub fn record_mutation(&mut self, position: BlockPosition, block_id: u32, block_meta: u32) {
        let index = ChunkIndex::of(&position);
        self.pending.entry(index).or_default().push(PendingMutation {
            index,
            position,
            block_id,
            block_meta,
        });
    }

    /// Writes a block into its chunk and records the mutation.
    pub fn set_block(
        &mut self,
        position: BlockPosition,
        block_id: u32,
        block_meta: u32,
    ) -> ServerResult<()> {
        let (x, z) = position.chunk_coords();
        self.load_chunk(x, z)?
            .set_block(&position, block_id, block_meta);
        self.record_mutation(position, block_id, block_meta);
        Ok(())
    }

    pub fn pending(&self, x: i32, z: i32) -> &[PendingMutation] {
        self.pending
            .get(&ChunkIndex::pack(x, z))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_pending(&self) -> bool {
        self.pending.values().any(|mutations| !mutations.is_empty())
    }

    /// Delivers and clears every non-empty pending list.
    ///
    /// Each chunk's mutations become one batch, encoded at most once per
    /// protocol version among that chunk's watchers. Chunks nobody watches
    /// are cleared without delivery.
    pub fn flush(&mut self, protocols: &ProtocolRegistry, transport: &dyn Transport) -> FlushReport {
        let mut report = FlushReport::default();
        let mut indices: Vec<ChunkIndex> = self
            .pending
            .iter()
            .filter(|(_, mutations)| !mutations.is_empty())
            .map(|(index, _)| *index)
            .collect();
        indices.sort();

        for index in indices {
            let Some(mutations) = self.pending.remove(&index) else {
                continue;
            };
            report.chunks += 1;
            report.mutations += mutations.len();

            let watchers = match self.interest.get(&index) {
                Some(watchers) if !watchers.is_empty() => watchers,
                _ => {
                    report.discarded += mutations.len();
                    continue;
                }
            };

            let mut batch = Batch::new();
            for mutation in &mutations {
                batch.add(UpdateBlock {
                    position: mutation.position,
                    block_id: mutation.block_id,
                    block_metadata: mutation.block_meta,
                    flags: UpdateBlock::FLAG_NONE,
                });
            }
            let mut broadcast = BroadcastBatch::new(batch);

            for (handle, version) in watchers {
                let registry = match protocols.registry(*version) {
                    Ok(registry) => registry,
                    Err(e) => {
                        warn!("Skipping block updates for {}: {}", handle, e);
                        continue;
                    }
                };
                match broadcast.encoded_for(registry) {
                    Ok(bytes) => {
                        transport.send_batch(*handle, bytes.to_vec());
                        report.deliveries += 1;
                    }
                    Err(e) => warn!("Failed to encode block updates for {}: {}", handle, e),
                }
            }
        }

        if report.chunks > 0 {
            debug!(
                "Flushed {} mutations in {} chunks of {} ({} deliveries)",
                report.mutations, report.chunks, self.name, report.deliveries
            );
        }
        report
    }

    /// Writes every loaded chunk through the provider.
    pub fn save_chunks(&mut self) -> ServerResult<usize> {
        let Some(provider) = self.provider.as_mut() else {
            return Ok(0);
        };
        for chunk in self.chunks.values() {
            provider.put_chunk(chunk)?;
        }
        Ok(self.chunks.len())
    }
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dimension")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("level", &self.level)
            .field("chunks", &self.chunks.len())
            .field("watched_chunks", &self.interest.len())
            .field("pending_chunks", &self.pending.len())
            .finish()
    }
}
