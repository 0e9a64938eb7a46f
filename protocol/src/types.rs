//! Value types carried inside packets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Width of a chunk along x and z, in blocks.
pub const CHUNK_WIDTH: i32 = 16;

/// A position or motion in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Coordinates of the chunk column containing this point.
    pub fn chunk_coords(&self) -> (i32, i32) {
        (
            (self.x.floor() as i32).div_euclid(CHUNK_WIDTH),
            (self.z.floor() as i32).div_euclid(CHUNK_WIDTH),
        )
    }

    pub fn distance(&self, other: &Vector3) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Orientation of an entity.
///
/// Versions without head yaw never write `head_yaw` and decode it as the
/// body yaw, so a rotation built with [`Rotation::new`] reads back equal on
/// every version.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation {
    pub yaw: f32,
    pub pitch: f32,
    pub head_yaw: f32,
}

impl Rotation {
    pub fn new(yaw: f32, pitch: f32) -> Self {
        Self {
            yaw,
            pitch,
            head_yaw: yaw,
        }
    }

    pub fn with_head_yaw(yaw: f32, pitch: f32, head_yaw: f32) -> Self {
        Self {
            yaw,
            pitch,
            head_yaw,
        }
    }
}

/// Integer block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BlockPosition {
    pub x: i32,
    pub y: u32,
    pub z: i32,
}

impl BlockPosition {
    pub fn new(x: i32, y: u32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Coordinates of the chunk column containing this block.
    pub fn chunk_coords(&self) -> (i32, i32) {
        (self.x.div_euclid(CHUNK_WIDTH), self.z.div_euclid(CHUNK_WIDTH))
    }
}

/// One entry of an [`AttributeMap`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attribute {
    pub min: f32,
    pub max: f32,
    pub value: f32,
    pub default: f32,
}

impl Attribute {
    pub fn new(min: f32, max: f32, value: f32, default: f32) -> Self {
        Self {
            min,
            max,
            value,
            default,
        }
    }
}

/// Named entity attributes (health, movement speed, ...).
///
/// Backed by a sorted map so encoding order never depends on insertion order.
pub type AttributeMap = BTreeMap<String, Attribute>;

/// A single entity metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityDataValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Float(f32),
    String(String),
    BlockPosition(i32, i32, i32),
    Long(i64),
    Vector(Vector3),
}

impl EntityDataValue {
    /// Wire tag written before the value.
    pub fn type_tag(&self) -> u32 {
        match self {
            Self::Byte(_) => 0,
            Self::Short(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::String(_) => 4,
            Self::BlockPosition(..) => 6,
            Self::Long(_) => 7,
            Self::Vector(_) => 8,
        }
    }
}

/// Entity metadata keyed by small integers, sorted by key.
pub type EntityDataMap = BTreeMap<u32, EntityDataValue>;
