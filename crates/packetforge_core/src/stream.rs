//! # Value Streams
//!
//! The ordered value stream generated `encode`/`decode` bodies talk to.
//!
//! ## Design
//!
//! - Fixed-width little-endian scalars
//! - `u32` count prefix for strings, blobs and collections
//! - Vectors as little-endian `f32` components, raw copies for other Pod types
//! - Reads never panic; every short read is a [`ProtocolError`]

use bytemuck::{bytes_of, Pod};

use crate::error::{ProtocolError, ProtocolResult};
use crate::math::{Vec2, Vec3};
use crate::opcode::OpcodeWidth;

/// Growable output stream for one frame.
///
/// Writes are infallible; a collection whose length does not fit the
/// `u32` count is remembered and reported by [`PacketWriter::length_overflow`].
#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    buffer: Vec<u8>,
    overflow: Option<usize>,
}

impl PacketWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflow: None,
        }
    }

    /// Creates an empty writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            overflow: None,
        }
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer, returning the written bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Resets the writer for reuse, keeping its allocation.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.overflow = None;
    }

    /// Returns the first collection length that did not fit a `u32` count.
    #[must_use]
    pub const fn length_overflow(&self) -> Option<usize> {
        self.overflow
    }

    /// Writes a bool as one byte.
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a signed byte.
    #[inline]
    pub fn write_i8(&mut self, value: i8) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i16 in little-endian format.
    #[inline]
    pub fn write_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i32 in little-endian format.
    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u64 in little-endian format.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i64 in little-endian format.
    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u128 in little-endian format.
    #[inline]
    pub fn write_u128(&mut self, value: u128) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i128 in little-endian format.
    #[inline]
    pub fn write_i128(&mut self, value: i128) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f64 in little-endian format.
    #[inline]
    pub fn write_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a char as its `u32` scalar value.
    #[inline]
    pub fn write_char(&mut self, value: char) {
        self.write_u32(u32::from(value));
    }

    /// Writes a collection count.
    #[inline]
    pub fn write_len(&mut self, len: usize) {
        match u32::try_from(len) {
            Ok(count) => self.write_u32(count),
            Err(_) => {
                self.overflow.get_or_insert(len);
                self.write_u32(u32::MAX);
            }
        }
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_len(value.len());
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Writes a length-prefixed binary blob.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.write_len(value.len());
        self.buffer.extend_from_slice(value);
    }

    /// Appends raw bytes without a length prefix.
    #[inline]
    pub fn write_raw(&mut self, value: &[u8]) {
        self.buffer.extend_from_slice(value);
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.buffer.extend_from_slice(bytes_of(value));
    }

    /// Writes a 2D vector as two little-endian floats.
    #[inline]
    pub fn write_vec2(&mut self, value: Vec2) {
        self.write_f32(value.x);
        self.write_f32(value.y);
    }

    /// Writes a 3D vector as three little-endian floats.
    #[inline]
    pub fn write_vec3(&mut self, value: Vec3) {
        self.write_f32(value.x);
        self.write_f32(value.y);
        self.write_f32(value.z);
    }

    /// Writes an opcode with the given width.
    ///
    /// The opcode must fit the width; registries guarantee this at build time.
    pub fn write_opcode(&mut self, width: OpcodeWidth, opcode: u32) {
        debug_assert!(u64::from(opcode) <= width.max_value());
        match width {
            OpcodeWidth::U8 => self.write_u8(opcode as u8),
            OpcodeWidth::U16 => self.write_u16(opcode as u16),
            OpcodeWidth::U32 => self.write_u32(opcode),
        }
    }
}

/// Input stream over one received frame.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PacketReader<'a> {
    /// Creates a new reader from a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes consumed.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Returns a safe preallocation size for a collection of `len` elements.
    ///
    /// Bounded by the remaining input so a forged count cannot force a huge
    /// allocation.
    #[inline]
    #[must_use]
    pub const fn capacity_hint(&self, len: usize) -> usize {
        let remaining = self.remaining();
        if len < remaining {
            len
        } else {
            remaining
        }
    }

    /// Consumes `count` bytes.
    pub fn take(&mut self, count: usize) -> ProtocolResult<&'a [u8]> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(ProtocolError::UnexpectedEnd {
                needed: count,
                remaining,
            });
        }
        let buffer: &'a [u8] = self.buffer;
        let slice = &buffer[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> ProtocolResult<[u8; N]> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(self.take(N)?);
        Ok(bytes)
    }

    /// Reads a bool; only 0 and 1 are accepted.
    pub fn read_bool(&mut self) -> ProtocolResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidBool(other)),
        }
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Reads a signed byte.
    #[inline]
    pub fn read_i8(&mut self) -> ProtocolResult<i8> {
        Ok(i8::from_le_bytes(self.take_array()?))
    }

    /// Reads a u16 in little-endian format.
    #[inline]
    pub fn read_u16(&mut self) -> ProtocolResult<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// Reads an i16 in little-endian format.
    #[inline]
    pub fn read_i16(&mut self) -> ProtocolResult<i16> {
        Ok(i16::from_le_bytes(self.take_array()?))
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Reads an i32 in little-endian format.
    #[inline]
    pub fn read_i32(&mut self) -> ProtocolResult<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Reads a u64 in little-endian format.
    #[inline]
    pub fn read_u64(&mut self) -> ProtocolResult<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Reads an i64 in little-endian format.
    #[inline]
    pub fn read_i64(&mut self) -> ProtocolResult<i64> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    /// Reads a u128 in little-endian format.
    #[inline]
    pub fn read_u128(&mut self) -> ProtocolResult<u128> {
        Ok(u128::from_le_bytes(self.take_array()?))
    }

    /// Reads an i128 in little-endian format.
    #[inline]
    pub fn read_i128(&mut self) -> ProtocolResult<i128> {
        Ok(i128::from_le_bytes(self.take_array()?))
    }

    /// Reads a f32 in little-endian format.
    #[inline]
    pub fn read_f32(&mut self) -> ProtocolResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads a f64 in little-endian format.
    #[inline]
    pub fn read_f64(&mut self) -> ProtocolResult<f64> {
        self.read_u64().map(f64::from_bits)
    }

    /// Reads a char from its `u32` scalar value.
    pub fn read_char(&mut self) -> ProtocolResult<char> {
        let raw = self.read_u32()?;
        char::from_u32(raw).ok_or(ProtocolError::InvalidChar(raw))
    }

    /// Reads a collection count.
    #[inline]
    pub fn read_len(&mut self) -> ProtocolResult<usize> {
        self.read_u32().map(|count| count as usize)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> ProtocolResult<String> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Reads a length-prefixed binary blob.
    pub fn read_bytes(&mut self) -> ProtocolResult<Vec<u8>> {
        let len = self.read_len()?;
        self.take(len).map(<[u8]>::to_vec)
    }

    /// Reads a Pod type directly.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> ProtocolResult<T> {
        let slice = self.take(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(slice))
    }

    /// Reads a 2D vector.
    #[inline]
    pub fn read_vec2(&mut self) -> ProtocolResult<Vec2> {
        Ok(Vec2::new(self.read_f32()?, self.read_f32()?))
    }

    /// Reads a 3D vector.
    #[inline]
    pub fn read_vec3(&mut self) -> ProtocolResult<Vec3> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    /// Reads an opcode with the given width.
    pub fn read_opcode(&mut self, width: OpcodeWidth) -> ProtocolResult<u32> {
        match width {
            OpcodeWidth::U8 => self.read_u8().map(u32::from),
            OpcodeWidth::U16 => self.read_u16().map(u32::from),
            OpcodeWidth::U32 => self.read_u32(),
        }
    }
}
