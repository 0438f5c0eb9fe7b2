//! Forkable binary cursor over a shared image buffer.
//!
//! A [`BinaryReader`] is a window (`start`, `length`) into a reference-counted [`Backend`] plus
//! a position relative to that window. Cloning or forking a reader never copies image bytes,
//! so the directory reader can keep one cursor on the stream headers and another on the
//! stream contents and advance them independently.
//!
//! Every read is bounds checked against the window; a reader never observes bytes outside of
//! it even when the underlying buffer is larger.
//!
//! # Examples
//!
//! ```rust
//! use cilmeta::BinaryReader;
//!
//! let mut reader = BinaryReader::from_vec(vec![0x42, 0x53, 0x4A, 0x42, 0x81, 0x00]);
//! assert_eq!(reader.read_le::<u32>()?, 0x424A_5342);
//!
//! let mut fork = reader.fork();
//! assert_eq!(fork.read_compressed_uint()?, 0x100);
//! assert_eq!(reader.pos(), 4);
//! # Ok::<(), cilmeta::Error>(())
//! ```

use std::{fmt, sync::Arc};

use super::{
    io::{read_le_at, CilIO},
    memory::Memory,
    Backend,
};
use crate::{segment::DataSegment, Result};

/// Independent cursor over a window of a shared image buffer
#[derive(Clone)]
pub struct BinaryReader {
    data: Arc<dyn Backend>,
    start: usize,
    rva: u32,
    length: usize,
    position: usize,
}

impl BinaryReader {
    /// Create a reader spanning all of `data`, with the first byte at RVA 0
    #[must_use]
    pub fn new(data: Arc<dyn Backend>) -> Self {
        let length = data.len();
        BinaryReader {
            data,
            start: 0,
            rva: 0,
            length,
            position: 0,
        }
    }

    /// Create a reader over an owned buffer
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::new(Arc::new(Memory::new(data)))
    }

    /// Create a reader over the window `offset..offset + length` of `data`
    ///
    /// # Arguments
    /// * 'data'    - The shared image buffer
    /// * 'offset'  - Absolute offset of the window in `data`
    /// * 'rva'     - The RVA the first byte of the window is mapped at
    /// * 'length'  - Size of the window
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the window exceeds `data`
    pub fn with_window(
        data: Arc<dyn Backend>,
        offset: usize,
        rva: u32,
        length: usize,
    ) -> Result<Self> {
        match offset.checked_add(length) {
            Some(end) if end <= data.len() => Ok(BinaryReader {
                data,
                start: offset,
                rva,
                length,
                position: 0,
            }),
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Size of the window in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns true if the window is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Current position, relative to the start of the window
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Absolute offset of the current position in the backing buffer
    #[must_use]
    pub fn offset(&self) -> usize {
        self.start + self.position
    }

    /// Absolute offset of the start of the window in the backing buffer
    #[must_use]
    pub fn start_offset(&self) -> usize {
        self.start
    }

    /// RVA of the current position
    #[must_use]
    pub fn rva(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        self.rva.wrapping_add(self.position as u32)
    }

    /// RVA of the start of the window
    #[must_use]
    pub fn start_rva(&self) -> u32 {
        self.rva
    }

    /// Bytes left between the current position and the end of the window
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.length - self.position
    }

    /// Returns true if `count` more bytes can be read
    #[must_use]
    pub fn can_read(&self, count: usize) -> bool {
        count <= self.remaining()
    }

    /// The bytes of the whole window
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data.data()[self.start..self.start + self.length]
    }

    /// The shared backing buffer
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.data
    }

    /// Move to `pos`, relative to the start of the window
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is past the end of the window
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.length {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Skip `step` bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if !self.can_read(step) {
            return Err(out_of_bounds_error!());
        }

        self.position += step;
        Ok(())
    }

    /// Advance to the next multiple of `alignment`, relative to the start of the window
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding extends past the window
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// An independent cursor over the same window, at the same position
    #[must_use]
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// A new reader whose window starts at `offset` (relative) and runs to the end of this one
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `offset` is past the end of the window
    pub fn fork_at(&self, offset: usize) -> Result<Self> {
        if offset > self.length {
            return Err(out_of_bounds_error!());
        }

        self.fork_slice(offset, self.length - offset)
    }

    /// A new reader over `offset..offset + length`, relative to this window
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the slice exceeds this window
    pub fn fork_slice(&self, offset: usize, length: usize) -> Result<Self> {
        match offset.checked_add(length) {
            Some(end) if end <= self.length => {
                #[allow(clippy::cast_possible_truncation)]
                let rva = self.rva.wrapping_add(offset as u32);
                Ok(BinaryReader {
                    data: Arc::clone(&self.data),
                    start: self.start + offset,
                    rva,
                    length,
                    position: 0,
                })
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// The whole window as a [`DataSegment`]
    #[must_use]
    pub fn to_segment(&self) -> DataSegment {
        DataSegment::from_parts(Arc::clone(&self.data), self.start, self.rva, self.length)
    }

    /// Take the next `length` bytes as a [`DataSegment`] and advance past them
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain
    pub fn read_segment(&mut self, length: usize) -> Result<DataSegment> {
        let slice = self.fork_slice(self.position, length)?;
        self.position += length;
        Ok(slice.to_segment())
    }

    /// Read a little-endian `T`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value extends past the window
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        let data = &self.data.data()[self.start..self.start + self.length];
        read_le_at::<T>(data, &mut self.position)
    }

    /// Read a little-endian `T` without moving the cursor
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value extends past the window
    pub fn peek_le<T: CilIO>(&self) -> Result<T> {
        let mut temp_position = self.position;
        read_le_at::<T>(self.data(), &mut temp_position)
    }

    /// Read `length` raw bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain
    pub fn read_bytes(&mut self, length: usize) -> Result<&[u8]> {
        if !self.can_read(length) {
            return Err(out_of_bounds_error!());
        }

        let start = self.start + self.position;
        self.position += length;
        Ok(&self.data.data()[start..start + length])
    }

    /// Read an ECMA-335 II.23.2 compressed unsigned integer
    ///
    /// The position is left unchanged if no valid value can be read.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the encoding is truncated, or
    /// [`crate::Error::Malformed`] for an invalid leading byte
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let saved_position = self.position;
        let result = self.read_compressed_uint_inner();
        if result.is_err() {
            self.position = saved_position;
        }
        result
    }

    fn read_compressed_uint_inner(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let rest = self.read_bytes(3)?;
            return Ok(((u32::from(first_byte) & 0x1F) << 24)
                | (u32::from(rest[0]) << 16)
                | (u32::from(rest[1]) << 8)
                | u32::from(rest[2]));
        }

        Err(malformed_error!(
            "Invalid compressed integer prefix - 0x{:02X}",
            first_byte
        ))
    }

    /// Like [`BinaryReader::read_compressed_uint`], but returns `None` when no valid value can
    /// be read
    pub fn try_read_compressed_uint(&mut self) -> Option<u32> {
        self.read_compressed_uint().ok()
    }

    /// Read a NUL-terminated ASCII name of at most `max_len` bytes, then skip the padding up to
    /// the next 4 byte boundary
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no terminator occurs within `max_len` bytes or the
    /// name is not ASCII, and [`crate::Error::OutOfBounds`] if the name runs past the window
    pub fn read_aligned_name(&mut self, max_len: usize) -> Result<String> {
        let window = self.data();
        let available = &window[self.position..window.len().min(self.position + max_len)];
        let Some(terminator) = available.iter().position(|byte| *byte == 0) else {
            if available.len() < max_len {
                return Err(out_of_bounds_error!());
            }
            return Err(malformed_error!(
                "Name at offset {} is not terminated within {} bytes",
                self.offset(),
                max_len
            ));
        };

        if !available[..terminator].is_ascii() {
            return Err(malformed_error!(
                "Name at offset {} is not ASCII",
                self.offset()
            ));
        }

        let name = String::from_utf8_lossy(&available[..terminator]).into_owned();
        self.position += terminator + 1;
        self.align(4)?;
        Ok(name)
    }
}

impl fmt::Debug for BinaryReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryReader")
            .field("start", &format_args!("0x{:X}", self.start))
            .field("rva", &format_args!("0x{:X}", self.rva))
            .field("length", &self.length)
            .field("position", &self.position)
            .finish()
    }
}
