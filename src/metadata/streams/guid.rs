//! GUID Heap (`#GUID`)
//!
//! A plain array of 128-bit GUIDs. Unlike the other heaps, tables index it by 1-based slot
//! rather than by byte offset; slot 0 means "no GUID".
//!
//! # Reference
//! - [ECMA-335 II.24.2.5](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{segment::DataSegment, Result};

/// '#GUID' is a heap, which contains a sequence of 128-bit GUIDs
///
/// # Examples
///
/// ```rust
/// use cilmeta::{metadata::streams::Guid, DataSegment};
///
/// let guids = Guid::from_segment(DataSegment::from_vec(vec![0xAA; 32]))?;
/// assert_eq!(guids.count(), 2);
/// assert_eq!(guids.get(2)?, uguid::guid!("AAAAAAAA-AAAA-AAAA-AAAA-AAAAAAAAAAAA"));
/// # Ok::<(), cilmeta::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Guid {
    segment: DataSegment,
}

impl Guid {
    /// Create a `Guid` heap over the stream contents
    ///
    /// # Arguments
    /// * 'segment' - The contents of the stream
    ///
    /// # Errors
    /// Returns an error if the size of the heap is not a multiple of 16
    pub fn from_segment(segment: DataSegment) -> Result<Guid> {
        if segment.len() % 16 != 0 {
            return Err(malformed_error!(
                "Size of #GUID heap is not a multiple of 16 - {}",
                segment.len()
            ));
        }

        Ok(Guid { segment })
    }

    /// The contents of the heap
    #[must_use]
    pub fn segment(&self) -> &DataSegment {
        &self.segment
    }

    /// Number of GUIDs in the heap
    #[must_use]
    pub fn count(&self) -> usize {
        self.segment.len() / 16
    }

    /// Returns the GUID in the 1-based slot `index`
    ///
    /// ## Arguments
    /// * 'index' - The slot of the GUID, as stored in a table column
    ///
    /// # Errors
    /// Returns an error if `index` is 0 or past the last slot
    pub fn get(&self, index: u32) -> Result<uguid::Guid> {
        let index = index as usize;
        if index < 1 || index > self.count() {
            return Err(out_of_bounds_error!());
        }

        let offset = (index - 1) * 16;
        let mut buffer = [0u8; 16];
        buffer.copy_from_slice(&self.segment.data()[offset..offset + 16]);

        Ok(uguid::Guid::from_bytes(buffer))
    }

    /// Iterate all GUIDs with their 1-based slot
    pub fn iter(&self) -> impl Iterator<Item = (u32, uguid::Guid)> + '_ {
        self.segment
            .data()
            .chunks_exact(16)
            .zip(1_u32..)
            .map(|(chunk, index)| {
                let mut buffer = [0u8; 16];
                buffer.copy_from_slice(chunk);
                (index, uguid::Guid::from_bytes(buffer))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data : [u8; 48] = [
            /* 1 - 0;16   */  0x8e, 0x90, 0x37, 0xd4, 0xe6, 0x65, 0x7c, 0x48, 0x97, 0x35, 0x7b, 0xdf, 0xf6, 0x99, 0xbe, 0xa5,
            /* 2 - 16;32  */  0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
            /* 3 - 32;48  */  0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        let guids = Guid::from_segment(DataSegment::from_vec(data.to_vec())).unwrap();

        assert_eq!(
            guids.get(1).unwrap(),
            uguid::guid!("d437908e-65e6-487c-9735-7bdff699bea5")
        );
        assert_eq!(
            guids.get(2).unwrap(),
            uguid::guid!("AAAAAAAA-AAAA-AAAA-AAAA-AAAAAAAAAAAA")
        );
        assert_eq!(
            guids.get(3).unwrap(),
            uguid::guid!("00000000-0000-0000-0000-000000000000")
        );
        assert!(guids.get(0).is_err());
        assert!(guids.get(4).is_err());
        assert_eq!(guids.iter().map(|(index, _)| index).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn invalid_size() {
        assert!(Guid::from_segment(DataSegment::from_vec(vec![0; 20])).is_err());
        let empty = Guid::from_segment(DataSegment::from_vec(Vec::new())).unwrap();
        assert_eq!(empty.count(), 0);
        assert!(empty.get(1).is_err());
    }
}
