//! Position-tracked byte buffer used by every packet codec.
//!
//! Writes always append to the end of the buffer; reads consume from the
//! current offset. A value written with `put_x` is read back by exactly one
//! `get_x`, which consumes the same number of bytes. Reads never panic: asking
//! for more bytes than remain yields [`CodecError::BufferUnderrun`].

use crate::error::{CodecError, CodecResult};
use crate::types::{
    Attribute, AttributeMap, BlockPosition, EntityDataMap, EntityDataValue, Rotation, Vector3,
};

const MAX_VARINT32_BYTES: usize = 5;
const MAX_VARINT64_BYTES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryCursor {
    buffer: Vec<u8>,
    offset: usize,
}

impl BinaryCursor {
    /// Creates an empty cursor for encoding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cursor positioned at the start of `bytes` for decoding.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            buffer: bytes.into(),
            offset: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Current read position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes that have not been read yet.
    pub fn unread(&self) -> &[u8] {
        &self.buffer[self.offset..]
    }

    fn take(&mut self, count: usize) -> CodecResult<&[u8]> {
        if count > self.remaining() {
            return Err(CodecError::BufferUnderrun {
                requested: count,
                available: self.remaining(),
            });
        }
        let start = self.offset;
        self.offset += count;
        Ok(&self.buffer[start..self.offset])
    }

    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(self.take(N)?);
        Ok(bytes)
    }

    // Fixed-width primitives

    pub fn put_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn get_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn put_bool(&mut self, value: bool) {
        self.put_u8(u8::from(value));
    }

    /// Any non-zero byte decodes as `true`.
    pub fn get_bool(&mut self) -> CodecResult<bool> {
        Ok(self.get_u8()? != 0)
    }

    pub fn put_i8(&mut self, value: i8) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_i8(&mut self) -> CodecResult<i8> {
        Ok(i8::from_le_bytes(self.take_array()?))
    }

    pub fn put_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_i16(&mut self) -> CodecResult<i16> {
        Ok(i16::from_le_bytes(self.take_array()?))
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_u16(&mut self) -> CodecResult<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_i32(&mut self) -> CodecResult<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Big-endian variant, used by the login and status headers.
    pub fn put_i32_be(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn get_i32_be(&mut self) -> CodecResult<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn get_f32(&mut self) -> CodecResult<f32> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    // Variable-length integers

    pub fn put_uvarint32(&mut self, value: u32) {
        self.put_uvarint64(u64::from(value));
    }

    pub fn get_uvarint32(&mut self) -> CodecResult<u32> {
        let value = self.read_varint(MAX_VARINT32_BYTES)?;
        u32::try_from(value).map_err(|_| CodecError::VarIntTooLong {
            max_bytes: MAX_VARINT32_BYTES,
        })
    }

    /// Zig-zag encoded signed varint.
    pub fn put_varint32(&mut self, value: i32) {
        self.put_uvarint32(((value << 1) ^ (value >> 31)) as u32);
    }

    pub fn get_varint32(&mut self) -> CodecResult<i32> {
        let raw = self.get_uvarint32()?;
        Ok((raw >> 1) as i32 ^ -((raw & 1) as i32))
    }

    pub fn put_uvarint64(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buffer.push(byte);
                return;
            }
            self.buffer.push(byte | 0x80);
        }
    }

    pub fn get_uvarint64(&mut self) -> CodecResult<u64> {
        self.read_varint(MAX_VARINT64_BYTES)
    }

    pub fn put_varint64(&mut self, value: i64) {
        self.put_uvarint64(((value << 1) ^ (value >> 63)) as u64);
    }

    pub fn get_varint64(&mut self) -> CodecResult<i64> {
        let raw = self.get_uvarint64()?;
        Ok((raw >> 1) as i64 ^ -((raw & 1) as i64))
    }

    fn read_varint(&mut self, max_bytes: usize) -> CodecResult<u64> {
        let mut value = 0u64;
        for i in 0..max_bytes {
            let byte = self.get_u8()?;
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::VarIntTooLong { max_bytes })
    }

    // Length-prefixed sequences

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_uvarint32(bytes.len() as u32);
        self.buffer.extend_from_slice(bytes);
    }

    pub fn get_bytes(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.get_uvarint32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn put_string(&mut self, value: &str) {
        self.put_bytes(value.as_bytes());
    }

    pub fn get_string(&mut self) -> CodecResult<String> {
        let offset = self.offset;
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { offset })
    }

    // Composite records

    pub fn put_vector(&mut self, vector: Vector3) {
        self.put_f32(vector.x);
        self.put_f32(vector.y);
        self.put_f32(vector.z);
    }

    pub fn get_vector(&mut self) -> CodecResult<Vector3> {
        Ok(Vector3 {
            x: self.get_f32()?,
            y: self.get_f32()?,
            z: self.get_f32()?,
        })
    }

    /// Writes pitch and yaw, then head yaw when `head_yaw` is set.
    pub fn put_rotation(&mut self, rotation: Rotation, head_yaw: bool) {
        self.put_f32(rotation.pitch);
        self.put_f32(rotation.yaw);
        if head_yaw {
            self.put_f32(rotation.head_yaw);
        }
    }

    pub fn get_rotation(&mut self, head_yaw: bool) -> CodecResult<Rotation> {
        let pitch = self.get_f32()?;
        let yaw = self.get_f32()?;
        let head_yaw = if head_yaw { self.get_f32()? } else { yaw };
        Ok(Rotation {
            yaw,
            pitch,
            head_yaw,
        })
    }

    pub fn put_unique_id(&mut self, id: i64) {
        self.put_varint64(id);
    }

    pub fn get_unique_id(&mut self) -> CodecResult<i64> {
        self.get_varint64()
    }

    pub fn put_runtime_id(&mut self, id: u64) {
        self.put_uvarint64(id);
    }

    pub fn get_runtime_id(&mut self) -> CodecResult<u64> {
        self.get_uvarint64()
    }

    pub fn put_block_position(&mut self, position: BlockPosition) {
        self.put_varint32(position.x);
        self.put_uvarint32(position.y);
        self.put_varint32(position.z);
    }

    pub fn get_block_position(&mut self) -> CodecResult<BlockPosition> {
        Ok(BlockPosition {
            x: self.get_varint32()?,
            y: self.get_uvarint32()?,
            z: self.get_varint32()?,
        })
    }

    pub fn put_attribute_map(&mut self, attributes: &AttributeMap) {
        self.put_uvarint32(attributes.len() as u32);
        for (name, attribute) in attributes {
            self.put_string(name);
            self.put_f32(attribute.min);
            self.put_f32(attribute.max);
            self.put_f32(attribute.value);
            self.put_f32(attribute.default);
        }
    }

    pub fn get_attribute_map(&mut self) -> CodecResult<AttributeMap> {
        let count = self.get_uvarint32()?;
        let mut attributes = AttributeMap::new();
        for _ in 0..count {
            let name = self.get_string()?;
            let attribute = Attribute {
                min: self.get_f32()?,
                max: self.get_f32()?,
                value: self.get_f32()?,
                default: self.get_f32()?,
            };
            attributes.insert(name, attribute);
        }
        Ok(attributes)
    }

    pub fn put_entity_data(&mut self, data: &EntityDataMap) {
        self.put_uvarint32(data.len() as u32);
        for (key, value) in data {
            self.put_uvarint32(*key);
            self.put_uvarint32(value.type_tag());
            match value {
                EntityDataValue::Byte(v) => self.put_i8(*v),
                EntityDataValue::Short(v) => self.put_i16(*v),
                EntityDataValue::Int(v) => self.put_varint32(*v),
                EntityDataValue::Float(v) => self.put_f32(*v),
                EntityDataValue::String(v) => self.put_string(v),
                EntityDataValue::BlockPosition(x, y, z) => {
                    self.put_varint32(*x);
                    self.put_varint32(*y);
                    self.put_varint32(*z);
                }
                EntityDataValue::Long(v) => self.put_varint64(*v),
                EntityDataValue::Vector(v) => self.put_vector(*v),
            }
        }
    }

    pub fn get_entity_data(&mut self) -> CodecResult<EntityDataMap> {
        let count = self.get_uvarint32()?;
        let mut data = EntityDataMap::new();
        for _ in 0..count {
            let key = self.get_uvarint32()?;
            let tag = self.get_uvarint32()?;
            let value = match tag {
                0 => EntityDataValue::Byte(self.get_i8()?),
                1 => EntityDataValue::Short(self.get_i16()?),
                2 => EntityDataValue::Int(self.get_varint32()?),
                3 => EntityDataValue::Float(self.get_f32()?),
                4 => EntityDataValue::String(self.get_string()?),
                6 => EntityDataValue::BlockPosition(
                    self.get_varint32()?,
                    self.get_varint32()?,
                    self.get_varint32()?,
                ),
                7 => EntityDataValue::Long(self.get_varint64()?),
                8 => EntityDataValue::Vector(self.get_vector()?),
                _ => return Err(CodecError::UnknownEntityDataType { key, tag }),
            };
            data.insert(key, value);
        }
        Ok(data)
    }
}
