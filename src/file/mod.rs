//! PE image access.
//!
//! [`File`] loads a PE image from disk (memory-mapped) or from memory, validates that it carries
//! a CLR runtime header, and maps RVAs onto the raw data of its sections. It implements
//! [`SegmentReferenceResolver`] and [`RvaReaderFactory`], which is all the metadata layer
//! needs to know about the PE container.
//!
//! # Key Components
//! - [`File`] - PE image with section based RVA translation
//! - [`Backend`] - Source of the raw bytes (disk mapping or memory buffer)
//! - [`reader::BinaryReader`] - Forkable cursor over a shared [`Backend`]
//! - [`io`] - Little-endian primitive decoding
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilmeta::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("tests/samples/crafted.dll"))?;
//! let (clr_rva, clr_size) = file.clr();
//! println!("CLR header at 0x{:X} ({} bytes)", clr_rva, clr_size);
//! # Ok::<(), cilmeta::Error>(())
//! ```

pub mod io;
pub(crate) mod memory;
mod physical;
pub mod reader;

use std::{path::Path, sync::Arc};

use crate::{
    segment::{RvaReaderFactory, SegmentReference, SegmentReferenceResolver},
    Error::{Empty, GoblinErr},
    Result,
};
use goblin::pe::{section_table::SectionTable, PE};
use memory::Memory;
use ouroboros::self_referencing;
use physical::Physical;
use reader::BinaryReader;

/// Source of the raw bytes of an image
pub trait Backend: Send + Sync {
    /// Get a slice of the data at `offset` with `len` bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// All of the data
    fn data(&self) -> &[u8];

    /// Size of the data in bytes
    fn len(&self) -> usize;
}

/// A loaded PE image carrying a CLR runtime header
#[self_referencing]
pub struct File {
    data: Arc<dyn Backend>,
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl File {
    /// Load and memory-map the image at `file`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not a PE image, or has no CLR runtime
    /// header
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;
        Self::load(Arc::new(input))
    }

    /// Load an image held in memory
    ///
    /// # Errors
    /// Returns an error if `data` is not a PE image, or has no CLR runtime header
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Arc::new(Memory::new(data)))
    }

    fn load(data: Arc<dyn Backend>) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        File::try_new(data, |data| {
            let pe = PE::parse(data.data()).map_err(GoblinErr)?;

            let Some(optional_header) = pe.header.optional_header.as_ref() else {
                return Err(malformed_error!("File does not have an OptionalHeader"));
            };

            if optional_header
                .data_directories
                .get_clr_runtime_header()
                .is_none()
            {
                return Err(malformed_error!(
                    "File does not have a CLR runtime header directory"
                ));
            }

            Ok(pe)
        })
    }

    /// Size of the image in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_data(|data| data.len())
    }

    /// Returns true if the image is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shared backing buffer
    #[must_use]
    pub fn backend(&self) -> Arc<dyn Backend> {
        self.with_data(Arc::clone)
    }

    /// The raw bytes of the image
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data())
    }

    /// The image base from the optional header
    #[must_use]
    pub fn imagebase(&self) -> u64 {
        self.with_pe(|pe| pe.image_base)
    }

    /// RVA and size of the CLR runtime header, `(0, 0)` if absent
    #[must_use]
    pub fn clr(&self) -> (u32, u32) {
        self.with_pe(|pe| {
            if let Some(optional_header) = &pe.header.optional_header {
                if let Some(clr_dir) = optional_header.data_directories.get_clr_runtime_header() {
                    return (clr_dir.virtual_address, clr_dir.size);
                }
            }
            (0, 0)
        })
    }

    /// RVA and size of the debug directory, `(0, 0)` if absent
    #[must_use]
    pub fn debug_directory(&self) -> (u32, u32) {
        self.with_pe(|pe| {
            if let Some(optional_header) = &pe.header.optional_header {
                if let Some(debug_dir) = optional_header.data_directories.get_debug_table() {
                    return (debug_dir.virtual_address, debug_dir.size);
                }
            }
            (0, 0)
        })
    }

    /// The section table
    pub fn sections(&self) -> impl Iterator<Item = &SectionTable> {
        self.with_pe(|pe| pe.sections.iter())
    }

    /// Translate an RVA into a file offset and the number of raw bytes that follow it in its
    /// section
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no section backs `rva` with raw data
    pub fn rva_to_offset(&self, rva: u32) -> Result<(usize, usize)> {
        for section in self.sections() {
            let Some(raw_end) = section
                .pointer_to_raw_data
                .checked_add(section.size_of_raw_data)
            else {
                return Err(malformed_error!(
                    "Section malformed, causing integer overflow - {} + {}",
                    section.pointer_to_raw_data,
                    section.size_of_raw_data
                ));
            };

            let extent = section.virtual_size.max(section.size_of_raw_data);
            let Some(delta) = rva.checked_sub(section.virtual_address) else {
                continue;
            };
            if delta >= extent {
                continue;
            }

            // Zero-filled tail of the section, not present in the file
            if delta >= section.size_of_raw_data {
                break;
            }

            let offset = (section.pointer_to_raw_data + delta) as usize;
            let available = (raw_end as usize).min(self.len()).saturating_sub(offset);
            return Ok((offset, available));
        }

        Err(malformed_error!(
            "RVA could not be converted to offset - 0x{:X}",
            rva
        ))
    }
}

impl SegmentReferenceResolver for File {
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

impl RvaReaderFactory for File {
    fn create_reader_at_rva(&self, rva: u32) -> Option<BinaryReader> {
        let (offset, available) = self.rva_to_offset(rva).ok()?;
        if available == 0 {
            return None;
        }

        BinaryReader::with_window(self.backend(), offset, rva, available).ok()
    }
}
