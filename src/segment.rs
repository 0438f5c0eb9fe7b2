//! Segments of an image and the references that point at them.
//!
//! A [`DataSegment`] is an offset + length view into the shared image buffer, tagged with the
//! RVA it is mapped at. A [`SegmentReference`] is what an RVA resolves to before its extent is
//! known: nothing at all, an already bounded segment, a readable location of unknown size, or a
//! location that cannot be read from this image.
//!
//! Turning an RVA into a reference, or into a reader, depends on the section layout of the
//! image. That mapping lives behind [`SegmentReferenceResolver`] and [`RvaReaderFactory`] so
//! the metadata layer never depends on how the image was loaded. [`crate::File`] implements
//! both for PE images; [`FlatLayout`] implements both for buffers where RVAs map linearly,
//! such as a raw metadata blob.

use std::{fmt, sync::Arc};

use crate::{
    file::{memory::Memory, reader::BinaryReader, Backend},
    Result,
};

/// A bounded view into the shared image buffer
#[derive(Clone)]
pub struct DataSegment {
    data: Arc<dyn Backend>,
    offset: usize,
    rva: u32,
    len: usize,
}

impl DataSegment {
    /// Create a segment over `offset..offset + len` of `data`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds `data`
    pub fn new(data: Arc<dyn Backend>, offset: usize, rva: u32, len: usize) -> Result<Self> {
        match offset.checked_add(len) {
            Some(end) if end <= data.len() => Ok(Self::from_parts(data, offset, rva, len)),
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// A segment spanning an owned buffer
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self::from_parts(Arc::new(Memory::new(data)), 0, 0, len)
    }

    // Caller guarantees `offset + len <= data.len()`
    pub(crate) fn from_parts(data: Arc<dyn Backend>, offset: usize, rva: u32, len: usize) -> Self {
        DataSegment {
            data,
            offset,
            rva,
            len,
        }
    }

    /// Absolute offset of the segment in the image buffer
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// RVA the segment is mapped at
    #[must_use]
    pub fn rva(&self) -> u32 {
        self.rva
    }

    /// Size of the segment in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the segment has no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The bytes of the segment
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data.data()[self.offset..self.offset + self.len]
    }

    /// A new cursor positioned at the start of the segment
    #[must_use]
    pub fn reader(&self) -> BinaryReader {
        BinaryReader::with_window(Arc::clone(&self.data), self.offset, self.rva, self.len)
            .unwrap_or_else(|_| BinaryReader::from_vec(Vec::new()))
    }

    /// A sub-segment `offset..offset + len`, relative to this one
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds this segment
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => {
                #[allow(clippy::cast_possible_truncation)]
                let rva = self.rva.wrapping_add(offset as u32);
                Ok(Self::from_parts(
                    Arc::clone(&self.data),
                    self.offset + offset,
                    rva,
                    len,
                ))
            }
            _ => Err(out_of_bounds_error!()),
        }
    }
}

impl fmt::Debug for DataSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSegment")
            .field("offset", &format_args!("0x{:X}", self.offset))
            .field("rva", &format_args!("0x{:X}", self.rva))
            .field("len", &self.len)
            .finish()
    }
}

impl PartialEq for DataSegment {
    fn eq(&self, other: &Self) -> bool {
        self.rva == other.rva && self.data() == other.data()
    }
}

/// What an RVA resolves to
#[derive(Clone, Debug)]
pub enum SegmentReference {
    /// RVA 0, nothing is referenced
    Null,
    /// The location and extent are both known
    Bounded(DataSegment),
    /// The location can be read from, but the extent is up to the consumer
    Readable(BinaryReader),
    /// The RVA does not map to any readable data of this image
    Unreadable(u32),
}

impl SegmentReference {
    /// The referenced RVA, 0 for [`SegmentReference::Null`]
    #[must_use]
    pub fn rva(&self) -> u32 {
        match self {
            SegmentReference::Null => 0,
            SegmentReference::Bounded(segment) => segment.rva(),
            SegmentReference::Readable(reader) => reader.start_rva(),
            SegmentReference::Unreadable(rva) => *rva,
        }
    }

    /// Returns true for [`SegmentReference::Null`]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SegmentReference::Null)
    }

    /// Returns true if the extent of the referenced data is known
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        matches!(self, SegmentReference::Bounded(_))
    }

    /// Returns true if the reference can produce a reader
    #[must_use]
    pub fn can_read(&self) -> bool {
        matches!(
            self,
            SegmentReference::Bounded(_) | SegmentReference::Readable(_)
        )
    }

    /// A cursor at the referenced location, if it can be read
    #[must_use]
    pub fn create_reader(&self) -> Option<BinaryReader> {
        match self {
            SegmentReference::Bounded(segment) => Some(segment.reader()),
            SegmentReference::Readable(reader) => Some(reader.fork()),
            _ => None,
        }
    }
}

/// Maps an RVA to the data it references
pub trait SegmentReferenceResolver: Send + Sync {
    /// Resolve `rva`. RVA 0 must resolve to [`SegmentReference::Null`].
    fn resolve(&self, rva: u32) -> SegmentReference;
}

/// Creates readers at arbitrary RVAs of an image
pub trait RvaReaderFactory: Send + Sync {
    /// A cursor starting at `rva`, or `None` if the RVA is not backed by image data
    fn create_reader_at_rva(&self, rva: u32) -> Option<BinaryReader>;
}

/// A buffer in which RVAs map linearly onto offsets, `offset = rva - base_rva`
///
/// Useful for raw metadata blobs and images that are already laid out as they would be in
/// memory.
#[derive(Clone)]
pub struct FlatLayout {
    data: Arc<dyn Backend>,
    base_rva: u32,
}

impl FlatLayout {
    /// Create a layout where the first byte of `data` sits at `base_rva`
    #[must_use]
    pub fn new(data: Arc<dyn Backend>, base_rva: u32) -> Self {
        FlatLayout { data, base_rva }
    }

    /// A reader over the whole buffer
    #[must_use]
    pub fn reader(&self) -> BinaryReader {
        BinaryReader::with_window(Arc::clone(&self.data), 0, self.base_rva, self.data.len())
            .unwrap_or_else(|_| BinaryReader::from_vec(Vec::new()))
    }
}

impl SegmentReferenceResolver for FlatLayout {
    fn resolve(&self, rva: u32) -> SegmentReference {
        if rva == 0 {
            return SegmentReference::Null;
        }

        match self.create_reader_at_rva(rva) {
            Some(reader) => SegmentReference::Readable(reader),
            None => SegmentReference::Unreadable(rva),
        }
    }
}

impl RvaReaderFactory for FlatLayout {
    fn create_reader_at_rva(&self, rva: u32) -> Option<BinaryReader> {
        let offset = rva.checked_sub(self.base_rva)? as usize;
        if offset >= self.data.len() {
            return None;
        }

        BinaryReader::with_window(
            Arc::clone(&self.data),
            offset,
            rva,
            self.data.len() - offset,
        )
        .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> FlatLayout {
        FlatLayout::new(
            Arc::new(Memory::new(vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55])),
            0x1000,
        )
    }

    #[test]
    fn segment_slice() {
        let segment = DataSegment::from_vec(vec![0x00, 0x11, 0x22, 0x33]);
        let slice = segment.slice(1, 2).unwrap();

        assert_eq!(slice.data(), &[0x11, 0x22]);
        assert_eq!(slice.offset(), 1);
        assert_eq!(slice.rva(), 1);
        assert!(segment.slice(3, 2).is_err());
        assert_eq!(slice.reader().read_le::<u16>().unwrap(), 0x2211);
    }

    #[test]
    fn segment_new_bounds() {
        let data: Arc<dyn Backend> = Arc::new(Memory::new(vec![0u8; 4]));
        assert!(DataSegment::new(Arc::clone(&data), 2, 0, 2).is_ok());
        assert!(DataSegment::new(Arc::clone(&data), 2, 0, 3).is_err());
        assert!(DataSegment::new(data, usize::MAX, 0, 1).is_err());
    }

    #[test]
    fn flat_layout_resolve() {
        let layout = layout();

        assert!(layout.resolve(0).is_null());

        let reference = layout.resolve(0x1002);
        assert!(reference.can_read());
        assert!(!reference.is_bounded());
        assert_eq!(reference.rva(), 0x1002);
        let mut reader = reference.create_reader().unwrap();
        assert_eq!(reader.read_le::<u8>().unwrap(), 0x22);
        assert_eq!(reader.remaining(), 3);

        assert!(matches!(
            layout.resolve(0x1006),
            SegmentReference::Unreadable(0x1006)
        ));
        assert!(matches!(
            layout.resolve(0x0FFF),
            SegmentReference::Unreadable(0x0FFF)
        ));
    }

    #[test]
    fn bounded_reference_reader() {
        let segment = DataSegment::from_vec(vec![0xAB, 0xCD]);
        let reference = SegmentReference::Bounded(segment);
        assert!(reference.is_bounded());
        assert_eq!(
            reference.create_reader().unwrap().read_le::<u16>().unwrap(),
            0xCDAB
        );
        assert!(SegmentReference::Unreadable(4).create_reader().is_none());
    }
}
