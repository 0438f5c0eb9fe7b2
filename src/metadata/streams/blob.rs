//! Blob Heap (`#Blob`)
//!
//! Length-prefixed binary records: signatures, constant values, custom attribute payloads,
//! public keys. Tables reference an entry by the byte offset of its length prefix.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{file::reader::BinaryReader, segment::DataSegment, Result};

/// '#Blob' points to streams of bytes. There are chunks, which may not be accessible in between
/// of others that are. Each 'valid' blob is pointed to by a table column, and each carries its
/// size as a compressed integer in front of the data.
///
/// * If the first one byte of the 'blob' is 0bbbbbbb, then the rest of the 'blob' contains the
///   bbbbbbb bytes of actual data.
/// * If the first two bytes of the 'blob' are 10bbbbbb and x, then the rest of the 'blob'
///   contains the (bbbbbb << 8 + x) bytes of actual data.
/// * If the first four bytes of the 'blob' are 110bbbbb, x, y, and z, then the rest of the
///   'blob' contains the (bbbbb << 24 + x << 16 + y << 8 + z) bytes of actual data.
///
/// # Examples
///
/// ```rust
/// use cilmeta::{metadata::streams::Blob, DataSegment};
///
/// let blob = Blob::from_segment(DataSegment::from_vec(vec![0x00, 0x03, 0x41, 0x42, 0x43]))?;
/// assert_eq!(blob.get(1)?, &[0x41, 0x42, 0x43]);
/// # Ok::<(), cilmeta::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Blob {
    segment: DataSegment,
}

impl Blob {
    /// Create a `Blob` heap over the stream contents
    ///
    /// # Arguments
    /// * 'segment' - The contents of the stream
    ///
    /// # Errors
    /// Returns an error if the data is empty or doesn't start with the empty blob
    pub fn from_segment(segment: DataSegment) -> Result<Blob> {
        if segment.is_empty() || segment.data()[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { segment })
    }

    /// The contents of the heap
    #[must_use]
    pub fn segment(&self) -> &DataSegment {
        &self.segment
    }

    /// Get the data of the blob at `index`, without its length prefix
    ///
    /// ## Arguments
    /// * 'index' - The offset of the length prefix within the heap
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds, the length prefix is invalid or the
    /// data runs past the end of the heap
    pub fn get(&self, index: u32) -> Result<&[u8]> {
        let (start, len) = self.locate(index)?;
        Ok(&self.segment.data()[start..start + len])
    }

    /// A reader over the data of the blob at `index`
    ///
    /// The reader is bounded to the blob, so a consumer decoding a signature can never read
    /// into the next entry.
    ///
    /// # Errors
    /// Same as [`Blob::get`]
    pub fn reader(&self, index: u32) -> Result<BinaryReader> {
        let (start, len) = self.locate(index)?;
        self.segment.reader().fork_slice(start, len)
    }

    /// Returns an iterator over all blobs in the heap, yielding `(offset, data)`
    #[must_use]
    pub fn iter(&self) -> BlobIterator<'_> {
        BlobIterator {
            blob: self,
            position: 1,
        }
    }

    fn locate(&self, index: u32) -> Result<(usize, usize)> {
        let mut reader = self.segment.reader();
        reader.seek(index as usize)?;

        let len = reader.read_compressed_uint()? as usize;
        let start = reader.pos();
        if !reader.can_read(len) {
            return Err(out_of_bounds_error!());
        }

        Ok((start, len))
    }
}

impl<'a> IntoIterator for &'a Blob {
    type Item = Result<(usize, &'a [u8])>;
    type IntoIter = BlobIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over entries in the `#Blob` heap
pub struct BlobIterator<'a> {
    blob: &'a Blob,
    position: usize,
}

impl<'a> Iterator for BlobIterator<'a> {
    type Item = Result<(usize, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.blob.segment.len() {
            return None;
        }

        let start_position = self.position;
        #[allow(clippy::cast_possible_truncation)]
        match self.blob.locate(start_position as u32) {
            Ok((start, len)) => {
                self.position = start + len;
                Some(Ok((start_position, &self.blob.segment.data()[start..start + len])))
            }
            Err(error) => {
                self.position = self.blob.segment.len();
                Some(Err(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = {
            let mut data = vec![0xCC; 0x200];
            /* i - 0    - should always be 0    */ data[0]          = 0b_00000000_u8;

            /* i - 1    - len 10                */ data[1]          = 0b_00001010_u8;
            /* i - 1    - len 10                */ data[2..12]      .copy_from_slice(&[0x0A; 10]);

            /* i - 12   - len 5                 */ data[12]         = 0b_00000101_u8;
            /* i - 12   - len 5                 */ data[13..18]     .copy_from_slice(&[0xAB; 5]);

            /* i - 18   - invalid prefix        */ data[18]         = 0b_11111111_u8;

            /* i - 19   - len 257               */ data[19]         = 0b_10000001_u8;
            /* i - 19   - len 257               */ data[20]         = 0b_00000001_u8;
            /* i - 19   - len 257               */ data[21..278]    .copy_from_slice(&[0xBA; 257]);

            /* i - 278  - len 0x10101, past end */ data[278]        = 0b_11000000_u8;
            /* i - 278  - len 0x10101, past end */ data[279]        = 0b_00000001_u8;
            /* i - 278  - len 0x10101, past end */ data[280]        = 0b_00000001_u8;
            /* i - 278  - len 0x10101, past end */ data[281]        = 0b_00000001_u8;

            data
        };

        let blob = Blob::from_segment(DataSegment::from_vec(data)).unwrap();

        assert_eq!(blob.get(0).unwrap().len(), 0);
        assert_eq!(blob.get(1).unwrap(), &[0x0A; 10]);
        assert_eq!(blob.get(12).unwrap(), &[0xAB; 5]);
        assert!(matches!(blob.get(18), Err(Error::Malformed { .. })));
        assert_eq!(blob.get(19).unwrap(), &[0xBA; 257][..]);
        assert!(matches!(blob.get(278), Err(Error::OutOfBounds { .. })));
        assert!(matches!(blob.get(0x200), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn reader_is_bounded() {
        let blob =
            Blob::from_segment(DataSegment::from_vec(vec![0x00, 0x02, 0x06, 0x08, 0xFF])).unwrap();

        let mut reader = blob.reader(1).unwrap();
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.read_le::<u8>().unwrap(), 0x06);
        assert_eq!(reader.read_le::<u8>().unwrap(), 0x08);
        assert!(reader.read_le::<u8>().is_err());
    }

    #[test]
    fn iterate() {
        let blob = Blob::from_segment(DataSegment::from_vec(vec![
            0x00, 0x03, 0x41, 0x42, 0x43, 0x02, 0x44, 0x45, 0x00,
        ]))
        .unwrap();

        let entries = blob.iter().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(
            entries,
            vec![
                (1, &[0x41, 0x42, 0x43][..]),
                (5, &[0x44, 0x45][..]),
                (8, &[][..])
            ]
        );
    }

    #[test]
    fn invalid() {
        assert!(Blob::from_segment(DataSegment::from_vec(Vec::new())).is_err());
        assert!(Blob::from_segment(DataSegment::from_vec(vec![0x01, 0x00])).is_err());
    }
}
