//! Levels group dimensions; the level manager owns every level.

use crate::chunk::{ChunkProvider, FileChunkProvider};
use crate::dimension::{Dimension, DimensionId, FlushReport};
use crate::error::ServerResult;
use crate::network::{ConnectionHandle, Transport};
use log::info;
use protocol::{ProtocolRegistry, Vector3};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub struct Level {
    name: String,
    dimensions: BTreeMap<DimensionId, Dimension>,
    default_dimension: DimensionId,
    spawn: Vector3,
}

impl Level {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimensions: BTreeMap::new(),
            default_dimension: DimensionId::Overworld,
            spawn: Vector3::new(0.0, 64.0, 0.0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spawn(&self) -> Vector3 {
        self.spawn
    }

    pub fn set_spawn(&mut self, spawn: Vector3) {
        self.spawn = spawn;
    }

    /// Adds a dimension. The first one added becomes the default.
    pub fn add_dimension(&mut self, dimension: Dimension) {
        if self.dimensions.is_empty() {
            self.default_dimension = dimension.id();
        }
        self.dimensions.insert(dimension.id(), dimension);
    }

    /// Creates a dimension of this level, persisted under
    /// `<data_dir>/<level>/<dimension>` when a data directory is given.
    pub fn create_dimension(&mut self, id: DimensionId, data_dir: Option<&Path>) -> ServerResult<()> {
        let mut dimension = Dimension::new(id.to_string(), id, self.name.clone());
        if let Some(dir) = data_dir {
            let provider: Box<dyn ChunkProvider> = Box::new(FileChunkProvider::new(
                dir.join(&self.name).join(id.to_string()),
            )?);
            dimension = dimension.with_provider(provider);
        }
        self.add_dimension(dimension);
        Ok(())
    }

    pub fn default_dimension(&self) -> DimensionId {
        self.default_dimension
    }

    pub fn dimension(&self, id: DimensionId) -> Option<&Dimension> {
        self.dimensions.get(&id)
    }

    pub fn dimension_mut(&mut self, id: DimensionId) -> Option<&mut Dimension> {
        self.dimensions.get_mut(&id)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values()
    }

    pub fn remove_session(&mut self, handle: ConnectionHandle) -> usize {
        self.dimensions
            .values_mut()
            .map(|dimension| dimension.remove_session(handle))
            .sum()
    }

    pub fn flush(&mut self, protocols: &ProtocolRegistry, transport: &dyn Transport) -> FlushReport {
        self.dimensions
            .values_mut()
            .map(|dimension| dimension.flush(protocols, transport))
            .sum()
    }

    pub fn save(&mut self) -> ServerResult<usize> {
        let mut saved = 0;
        for dimension in self.dimensions.values_mut() {
            saved += dimension.save_chunks()?;
        }
        Ok(saved)
    }
}

#[derive(Default)]
pub struct LevelManager {
    levels: HashMap<String, Level>,
    default_level: Option<String>,
}

impl LevelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a level. The first one added becomes the default.
    pub fn add_level(&mut self, level: Level) {
        if self.default_level.is_none() {
            self.default_level = Some(level.name().to_string());
        }
        info!("Loaded level {}", level.name());
        self.levels.insert(level.name().to_string(), level);
    }

    pub fn level(&self, name: &str) -> Option<&Level> {
        self.levels.get(name)
    }

    pub fn level_mut(&mut self, name: &str) -> Option<&mut Level> {
        self.levels.get_mut(name)
    }

    pub fn default_level(&self) -> Option<&Level> {
        self.default_level.as_deref().and_then(|name| self.levels.get(name))
    }

    pub fn default_level_name(&self) -> Option<&str> {
        self.default_level.as_deref()
    }

    pub fn set_default_level(&mut self, name: &str) -> bool {
        if self.levels.contains_key(name) {
            self.default_level = Some(name.to_string());
            true
        } else {
            false
        }
    }

    pub fn dimension_mut(&mut self, level: &str, id: DimensionId) -> Option<&mut Dimension> {
        self.levels.get_mut(level)?.dimension_mut(id)
    }

    pub fn levels(&self) -> impl Iterator<Item = &Level> {
        self.levels.values()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Releases every interest `handle` holds in any level.
    pub fn remove_session(&mut self, handle: ConnectionHandle) -> usize {
        self.levels
            .values_mut()
            .map(|level| level.remove_session(handle))
            .sum()
    }

    pub fn flush(&mut self, protocols: &ProtocolRegistry, transport: &dyn Transport) -> FlushReport {
        self.levels
            .values_mut()
            .map(|level| level.flush(protocols, transport))
            .sum()
    }

    pub fn save_all(&mut self) -> ServerResult<usize> {
        let mut saved = 0;
        for level in self.levels.values_mut() {
            saved += level.save()?;
        }
        Ok(saved)
    }
}
