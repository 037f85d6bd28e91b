//! # State Codec
//!
//! Byte-level writer and reader for bundle records.
//!
//! ## Record Layout
//!
//! ```text
//! ┌──────────────────────────────┬───────────────────────────────────┐
//! │ presence mask ⌈n/8⌉ bytes    │ present field values, schema order │
//! │ bit i of byte i/8 = field i  │ little endian, Pod types verbatim  │
//! └──────────────────────────────┴───────────────────────────────────┘
//! ```
//!
//! The same layout serves network records and savegames; only the
//! [`SerializationPurpose`] decides which fields are eligible.

use bytemuck::{bytes_of, Pod};

use crate::error::CodecError;

/// What a bundle is being serialized for.
///
/// Fields are only written if their flags allow the purpose: `Network`
/// requires `NETWORKED`, `Savegame` requires `SAVED`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SerializationPurpose {
    /// Snapshot traffic between server and clients.
    Network,
    /// Persistent savegames.
    Savegame,
}

/// Bitmask of fields present in a record.
///
/// Bundles are limited to [`PresenceMask::MAX_FIELDS`] fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresenceMask(u64);

impl PresenceMask {
    /// Largest schema a mask can describe.
    pub const MAX_FIELDS: usize = 64;

    /// Mask with no field present.
    pub const EMPTY: Self = Self(0);

    /// Number of bytes the mask occupies for a schema of `field_count` fields.
    #[inline]
    #[must_use]
    pub const fn byte_len(field_count: usize) -> usize {
        (field_count + 7) / 8
    }

    /// Marks field `index` as present.
    #[inline]
    pub fn insert(&mut self, index: usize) {
        debug_assert!(index < Self::MAX_FIELDS);
        self.0 |= 1u64 << index;
    }

    /// Returns true if field `index` is present.
    #[inline]
    #[must_use]
    pub const fn contains(self, index: usize) -> bool {
        index < Self::MAX_FIELDS && self.0 & (1u64 << index) != 0
    }

    /// Number of present fields.
    #[inline]
    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Writes the mask for a schema of `field_count` fields.
    pub fn write(self, writer: &mut StateWriter, field_count: usize) {
        let bytes = self.0.to_le_bytes();
        writer.write_bytes(&bytes[..Self::byte_len(field_count)]);
    }

    /// Reads a mask for a schema of `field_count` fields.
    ///
    /// # Errors
    ///
    /// Fails if the buffer is too short or bits beyond the schema are set.
    pub fn read(reader: &mut StateReader<'_>, field_count: usize) -> Result<Self, CodecError> {
        let raw = reader.read_bytes(Self::byte_len(field_count))?;
        let mut bytes = [0u8; 8];
        bytes[..raw.len()].copy_from_slice(raw);
        let mask = u64::from_le_bytes(bytes);

        if field_count < Self::MAX_FIELDS && mask >> field_count != 0 {
            return Err(CodecError::MaskOverflow { mask, field_count });
        }
        Ok(Self(mask))
    }
}

/// Growable little-endian writer.
///
/// Reuse one writer across messages (`clear()` keeps the allocation).
#[derive(Clone, Debug, Default)]
pub struct StateWriter {
    buffer: Vec<u8>,
}

impl StateWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates an empty writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Forgets the written bytes, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.buffer.clear();
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

    /// Consumes the writer, returning the bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes a f64 in little-endian format.
    #[inline]
    pub fn write_f64(&mut self, value: f64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.write_bytes(bytes_of(value));
    }
}

/// Reader over a borrowed byte buffer.
#[derive(Clone, Debug)]
pub struct StateReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> StateReader<'a> {
    /// Creates a new reader from a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Returns the current read offset.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Reads `len` raw bytes.
    ///
    /// # Errors
    ///
    /// Fails if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::UnexpectedEnd {
                offset: self.position,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Fails at the end of the buffer.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a u16 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails if fewer than 2 bytes remain.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Reads a u32 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails if fewer than 4 bytes remain.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a f32 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails if fewer than 4 bytes remain.
    #[inline]
    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        self.read_array().map(f32::from_le_bytes)
    }

    /// Reads a f64 in little-endian format.
    ///
    /// # Errors
    ///
    /// Fails if fewer than 8 bytes remain.
    #[inline]
    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        self.read_array().map(f64::from_le_bytes)
    }

    /// Reads a Pod type directly.
    ///
    /// # Errors
    ///
    /// Fails if the buffer is too short for `T`.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> Result<T, CodecError> {
        let slice = self.read_bytes(std::mem::size_of::<T>())?;
        // Length was checked above, so the only failure left is impossible.
        bytemuck::try_pod_read_unaligned(slice).map_err(|_| CodecError::UnexpectedEnd {
            offset: self.position,
            needed: std::mem::size_of::<T>(),
            remaining: 0,
        })
    }
}
