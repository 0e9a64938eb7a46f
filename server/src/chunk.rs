//! Chunk storage and chunk persistence.

use crate::error::ServerResult;
use log::debug;
use protocol::{BlockPosition, CHUNK_WIDTH};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Packed chunk coordinates: `x` in the high 32 bits, `z` in the low 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkIndex(pub i64);

impl ChunkIndex {
    pub fn pack(x: i32, z: i32) -> Self {
        ChunkIndex(((x as i64) << 32) | (z as u32 as i64))
    }

    pub fn unpack(self) -> (i32, i32) {
        ((self.0 >> 32) as i32, self.0 as i32)
    }

    pub fn of(position: &BlockPosition) -> Self {
        let (x, z) = position.chunk_coords();
        Self::pack(x, z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: u32,
    pub meta: u32,
}

/// A 16-wide column of blocks. Only non-air blocks are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    x: i32,
    z: i32,
    blocks: BTreeMap<(u8, u32, u8), Block>,
}

impl Chunk {
    pub fn new(x: i32, z: i32) -> Self {
        Self {
            x,
            z,
            blocks: BTreeMap::new(),
        }
    }

    pub fn coords(&self) -> (i32, i32) {
        (self.x, self.z)
    }

    pub fn index(&self) -> ChunkIndex {
        ChunkIndex::pack(self.x, self.z)
    }

    fn local(position: &BlockPosition) -> (u8, u32, u8) {
        (
            position.x.rem_euclid(CHUNK_WIDTH) as u8,
            position.y,
            position.z.rem_euclid(CHUNK_WIDTH) as u8,
        )
    }

    /// Writes a block; id 0 (air) clears the slot.
    pub fn set_block(&mut self, position: &BlockPosition, id: u32, meta: u32) {
        let key = Self::local(position);
        if id == 0 {
            self.blocks.remove(&key);
        } else {
            self.blocks.insert(key, Block { id, meta });
        }
    }

    pub fn block(&self, position: &BlockPosition) -> Option<Block> {
        self.blocks.get(&Self::local(position)).copied()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Persistence collaborator for dimensions.
pub trait ChunkProvider: Send {
    fn get_chunk(&mut self, x: i32, z: i32) -> ServerResult<Option<Chunk>>;
    fn put_chunk(&mut self, chunk: &Chunk) -> ServerResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryChunkProvider {
    chunks: HashMap<ChunkIndex, Chunk>,
}

impl MemoryChunkProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl ChunkProvider for MemoryChunkProvider {
    fn get_chunk(&mut self, x: i32, z: i32) -> ServerResult<Option<Chunk>> {
        Ok(self.chunks.get(&ChunkIndex::pack(x, z)).cloned())
    }

    fn put_chunk(&mut self, chunk: &Chunk) -> ServerResult<()> {
        self.chunks.insert(chunk.index(), chunk.clone());
        Ok(())
    }
}

/// Stores each chunk as a bincode file named `<x>.<z>.chunk`.
#[derive(Debug)]
pub struct FileChunkProvider {
    dir: PathBuf,
}

impl FileChunkProvider {
    pub fn new(dir: impl Into<PathBuf>) -> ServerResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, x: i32, z: i32) -> PathBuf {
        self.dir.join(format!("{}.{}.chunk", x, z))
    }
}

impl ChunkProvider for FileChunkProvider {
    fn get_chunk(&mut self, x: i32, z: i32) -> ServerResult<Option<Chunk>> {
        let path = self.path_for(x, z);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let chunk: Chunk = bincode::deserialize(&bytes)?;
        debug!("Loaded chunk {},{} from {}", x, z, path.display());
        Ok(Some(chunk))
    }

    fn put_chunk(&mut self, chunk: &Chunk) -> ServerResult<()> {
        let (x, z) = chunk.coords();
        let bytes = bincode::serialize(chunk)?;
        fs::write(self.path_for(x, z), bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;

    #[test]
    fn test_chunk_index_known_values() {
        assert_eq!(ChunkIndex::pack(0, 0).0, 0);
        assert_eq!(ChunkIndex::pack(1, 0).0, 1 << 32);
        assert_eq!(ChunkIndex::pack(0, -1).0, 0xffff_ffff);
        assert_eq!(ChunkIndex::pack(-1, -1).unpack(), (-1, -1));
        assert_eq!(
            ChunkIndex::pack(i32::MIN, i32::MAX).unpack(),
            (i32::MIN, i32::MAX)
        );
    }

    #[test]
    fn test_chunk_index_of_block() {
        assert_eq!(
            ChunkIndex::of(&BlockPosition::new(-1, 64, 17)),
            ChunkIndex::pack(-1, 1)
        );
    }

    #[test]
    fn test_chunk_blocks_use_local_coords() {
        let mut chunk = Chunk::new(-1, 2);
        let position = BlockPosition::new(-3, 70, 33);
        chunk.set_block(&position, 5, 2);
        assert_eq!(chunk.block(&position), Some(Block { id: 5, meta: 2 }));
        assert_eq!(chunk.block(&BlockPosition::new(13, 70, 1)), Some(Block { id: 5, meta: 2 }));
        assert_eq!(chunk.block_count(), 1);

        chunk.set_block(&position, 0, 0);
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_memory_provider() {
        let mut provider = MemoryChunkProvider::new();
        assert_eq!(provider.get_chunk(1, 1).unwrap(), None);

        let mut chunk = Chunk::new(1, 1);
        chunk.set_block(&BlockPosition::new(16, 1, 16), 1, 0);
        provider.put_chunk(&chunk).unwrap();
        assert_eq!(provider.get_chunk(1, 1).unwrap(), Some(chunk));
        assert_eq!(provider.len(), 1);
    }

    #[test]
    fn test_file_provider_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = FileChunkProvider::new(dir.path().join("overworld")).unwrap();

        let mut chunk = Chunk::new(-2, 7);
        chunk.set_block(&BlockPosition::new(-20, 12, 115), 3, 1);
        provider.put_chunk(&chunk).unwrap();

        assert!(provider.dir().join("-2.7.chunk").exists());

        let mut reopened = FileChunkProvider::new(provider.dir().to_path_buf()).unwrap();
        assert_eq!(reopened.get_chunk(-2, 7).unwrap(), Some(chunk));
        assert_eq!(reopened.get_chunk(0, 0).unwrap(), None);
    }

    #[test]
    fn test_file_provider_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0.0.chunk"), [0xff]).unwrap();
        let mut provider = FileChunkProvider::new(dir.path()).unwrap();
        assert!(matches!(provider.get_chunk(0, 0), Err(ServerError::Storage(_))));
    }
}
