//! In-memory backend for images that are already loaded into a buffer.

use super::Backend;
use crate::Result;

/// Owns the raw bytes of an image held in memory
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Wrap a buffer
    ///
    /// # Arguments
    /// * 'data' - The image bytes
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };

        if offset_end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory() {
        let mut data = vec![0xCC_u8; 1048];
        data[10..15].fill(0xBB);

        let memory = Memory::new(data);

        assert_eq!(memory.len(), 1048);
        assert_eq!(memory.data()[0], 0xCC);
        assert_eq!(
            memory.data_slice(10, 5).unwrap(),
            &[0xBB, 0xBB, 0xBB, 0xBB, 0xBB]
        );
        assert!(memory.data_slice(0, 2048).is_err());
    }

    #[test]
    fn memory_offset_overflow() {
        let memory = Memory::new(vec![0x00; 100]);

        assert!(matches!(
            memory.data_slice(usize::MAX, 1),
            Err(crate::Error::OutOfBounds { .. })
        ));
        assert!(memory.data_slice(100, 1).is_err());
        assert!(memory.data_slice(99, 2).is_err());
        assert_eq!(memory.data_slice(100, 0).unwrap().len(), 0);
    }
}
