//! User String Heap (`#US`)
//!
//! String literals referenced by `ldstr`, stored as blobs of UTF-16LE code units. Every entry
//! carries one trailing byte after the code units, set when the string contains characters that
//! need more than a plain byte comparison.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use widestring::U16String;

use crate::{segment::DataSegment, Result};

/// '#US' holds the user string literals of the module
///
/// # Examples
///
/// ```rust
/// use cilmeta::{metadata::streams::UserStrings, DataSegment};
///
/// let heap = UserStrings::from_segment(DataSegment::from_vec(vec![
///     0x00, 0x05, 0x48, 0x00, 0x69, 0x00, 0x00,
/// ]))?;
/// assert_eq!(heap.get(1)?.to_string_lossy(), "Hi");
/// # Ok::<(), cilmeta::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct UserStrings {
    segment: DataSegment,
}

impl UserStrings {
    /// Create a `UserStrings` heap over the stream contents
    ///
    /// # Arguments
    /// * 'segment' - The contents of the stream
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with the empty entry
    pub fn from_segment(segment: DataSegment) -> Result<UserStrings> {
        if segment.is_empty() || segment.data()[0] != 0 {
            return Err(malformed_error!("Provided #US heap is empty"));
        }

        Ok(UserStrings { segment })
    }

    /// The contents of the heap
    #[must_use]
    pub fn segment(&self) -> &DataSegment {
        &self.segment
    }

    /// Get the string at `index`
    ///
    /// ## Arguments
    /// * 'index' - The offset of the entry, as found in the low 24 bits of a string token
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds or the entry is truncated or has an odd
    /// number of payload bytes
    pub fn get(&self, index: u32) -> Result<U16String> {
        let mut reader = self.segment.reader();
        reader.seek(index as usize)?;

        let len = reader.read_compressed_uint()? as usize;
        if len == 0 {
            return Ok(U16String::new());
        }

        if len % 2 != 1 {
            return Err(malformed_error!(
                "Invalid user string length at index {} - {}",
                index,
                len
            ));
        }

        let units = reader
            .read_bytes(len - 1)?
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();

        Ok(U16String::from_vec(units))
    }
}
