//! String Heap (`#Strings`)
//!
//! Identifier strings (type, member and namespace names) stored as NUL-terminated UTF-8.
//! Tables reference an entry by its byte offset; offset 0 is always the empty string.
//!
//! # Reference
//! - [ECMA-335 II.24.2.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::ffi::CStr;

use crate::{segment::DataSegment, Result};

/// '#Strings' hold the identifiers referenced from the metadata tables.
///
/// # Examples
///
/// ```rust
/// use cilmeta::{metadata::streams::Strings, DataSegment};
///
/// let strings = Strings::from_segment(DataSegment::from_vec(b"\0Hello\0".to_vec()))?;
/// assert_eq!(strings.get(1)?, "Hello");
/// assert_eq!(strings.get(3)?, "llo");
/// # Ok::<(), cilmeta::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Strings {
    segment: DataSegment,
}

impl Strings {
    /// Create a `Strings` heap over the stream contents
    ///
    /// # Arguments
    /// * 'segment' - The contents of the stream
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with the empty string
    pub fn from_segment(segment: DataSegment) -> Result<Strings> {
        if segment.is_empty() || segment.data()[0] != 0 {
            return Err(malformed_error!("Provided #Strings heap is empty"));
        }

        Ok(Strings { segment })
    }

    /// The contents of the heap
    #[must_use]
    pub fn segment(&self) -> &DataSegment {
        &self.segment
    }

    /// Get the string that starts at `index`
    ///
    /// ## Arguments
    /// * 'index' - The offset within the heap, as stored in a table column
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds, the string is not terminated or is not
    /// valid UTF-8
    pub fn get(&self, index: u32) -> Result<&str> {
        let data = self.segment.data();
        let index = index as usize;
        if index >= data.len() {
            return Err(out_of_bounds_error!());
        }

        match CStr::from_bytes_until_nul(&data[index..]) {
            Ok(result) => match result.to_str() {
                Ok(result) => Ok(result),
                Err(_) => Err(malformed_error!("Invalid string at index - {}", index)),
            },
            Err(_) => Err(malformed_error!("Unterminated string at index - {}", index)),
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
        let data : [u8; 48] = [
            0x00,
            0x3c, 0x4d, 0x61, 0x69, 0x6e, 0x3e, 0x24, 0x00,
            0x43, 0x5f, 0x53, 0x68, 0x61, 0x72, 0x70, 0x5f, 0x50, 0x4f, 0x43, 0x5f, 0x31, 0x00,
            0x3c, 0x4d, 0x6f, 0x64, 0x75, 0x6c, 0x65, 0x3e, 0x00,
            0x53, 0x79, 0x73, 0x74, 0x65, 0x6d, 0x2e, 0x43, 0x6f, 0x6e, 0x73, 0x6f, 0x6c, 0x65, 0x00,
            0x00,
        ];

        let strings = Strings::from_segment(DataSegment::from_vec(data.to_vec())).unwrap();

        assert_eq!(strings.get(0).unwrap(), "");
        assert_eq!(strings.get(1).unwrap(), "<Main>$");
        assert_eq!(strings.get(9).unwrap(), "C_Sharp_POC_1");
        assert_eq!(strings.get(23).unwrap(), "<Module>");
        assert_eq!(strings.get(32).unwrap(), "System.Console");
        assert_eq!(strings.get(39).unwrap(), "Console");
    }

    #[test]
    fn invalid() {
        assert!(Strings::from_segment(DataSegment::from_vec(Vec::new())).is_err());
        assert!(Strings::from_segment(DataSegment::from_vec(b"Foo\0".to_vec())).is_err());

        let strings = Strings::from_segment(DataSegment::from_vec(vec![0x00, 0x41, 0x42])).unwrap();
        assert!(matches!(strings.get(1), Err(Error::Malformed { .. })));
        assert!(matches!(strings.get(3), Err(Error::OutOfBounds { .. })));

        let strings =
            Strings::from_segment(DataSegment::from_vec(vec![0x00, 0xFF, 0xFE, 0x00])).unwrap();
        assert!(matches!(strings.get(1), Err(Error::Malformed { .. })));
    }
}
