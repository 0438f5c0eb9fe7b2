//! VTable fixups of mixed-mode images.
//!
//! The CLI header can point at a table of VTable fixups. Each entry names an RVA holding a run of
//! method tokens that the loader replaces with native entry points, so that unmanaged code can
//! call into managed methods through a vtable.
//!
//! ```text
//! u32 rva | u16 count | u16 type
//! ```
//!
//! # Reference
//! - [ECMA-335 II.25.3.3.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use bitflags::bitflags;

use crate::{
    file::reader::BinaryReader,
    metadata::{
        diagnostics::{Diagnostic, DiagnosticCategory, ErrorListener},
        token::Token,
    },
    segment::RvaReaderFactory,
    Result,
};

bitflags! {
    /// Shape and calling behaviour of the slots of one fixup
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct VTableType: u16 {
        /// Slots are 32 bits wide
        const VTABLE_32BIT = 0x01;
        /// Slots are 64 bits wide
        const VTABLE_64BIT = 0x02;
        /// Transition from unmanaged to managed code
        const FROM_UNMANAGED = 0x04;
        /// Transition from unmanaged code, keeping the current application domain
        const FROM_UNMANAGED_RETAIN_APPDOMAIN = 0x08;
        /// Call the most derived override of the method
        const CALL_MOST_DERIVED = 0x10;
    }
}

/// One entry of the VTable fixup directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VTableFixup {
    /// RVA of the slots
    pub rva: u32,
    /// Slot shape and transition flags
    pub vtable_type: VTableType,
    /// The method tokens initially stored in the slots
    pub tokens: Vec<Token>,
}

impl VTableFixup {
    /// Size of one directory entry
    pub const SIZE: usize = 8;

    /// Read one entry at the position of `reader` and the tokens it points at
    ///
    /// The entry is always consumed. If its RVA does not map to image data, or the slots run
    /// past the end of the image, a bad image is reported and `None` is returned.
    ///
    /// # Arguments
    /// * 'listener'    - Receives reports about unmappable entries
    /// * 'factory'     - Creates a reader at the slot RVA
    /// * 'reader'      - Positioned at the entry
    ///
    /// # Errors
    /// Returns an error if the entry itself is truncated or `listener` escalates a report
    pub fn from_reader(
        listener: &dyn ErrorListener,
        factory: &dyn RvaReaderFactory,
        reader: &mut BinaryReader,
    ) -> Result<Option<VTableFixup>> {
        let offset = reader.offset();
        let rva = reader.read_le::<u32>()?;
        let count = reader.read_le::<u16>()?;
        let vtable_type = VTableType::from_bits_retain(reader.read_le::<u16>()?);

        let Some(mut slots) = factory.create_reader_at_rva(rva) else {
            listener.bad_image(
                Diagnostic::new(
                    DiagnosticCategory::Header,
                    format!("VTable fixup RVA 0x{:08X} cannot be mapped", rva),
                )
                .with_offset(offset as u64),
            )?;
            return Ok(None);
        };

        let mut tokens = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let slot = if vtable_type.contains(VTableType::VTABLE_32BIT) {
                slots.read_le::<u32>()
            } else {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                slots.read_le::<i64>().map(|value| value as u32)
            };

            match slot {
                Ok(value) => tokens.push(Token::new(value)),
                Err(_) => {
                    listener.bad_image(
                        Diagnostic::new(
                            DiagnosticCategory::Header,
                            format!(
                                "VTable fixup at RVA 0x{:08X} with {} slots exceeds the image",
                                rva, count
                            ),
                        )
                        .with_offset(offset as u64),
                    )?;
                    return Ok(None);
                }
            }
        }

        Ok(Some(VTableFixup {
            rva,
            vtable_type,
            tokens,
        }))
    }
}

/// The VTable fixup directory of an image
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VTableFixups {
    fixups: Vec<VTableFixup>,
}

impl VTableFixups {
    /// Read the directory the CLI header points at
    ///
    /// A zero RVA means the image has no fixups. A directory that cannot be mapped is reported as
    /// a bad image and yields no fixups.
    ///
    /// # Arguments
    /// * 'listener'    - Receives reports about the directory and its entries
    /// * 'factory'     - Creates readers at the directory and slot RVAs
    /// * 'rva'         - RVA of the directory from the CLI header
    /// * 'size'        - Size of the directory from the CLI header
    ///
    /// # Errors
    /// Returns an error if `listener` escalates a report
    pub fn from_rva(
        listener: &dyn ErrorListener,
        factory: &dyn RvaReaderFactory,
        rva: u32,
        size: u32,
    ) -> Result<VTableFixups> {
        if rva == 0 {
            return Ok(VTableFixups::default());
        }

        let Some(mut reader) = factory.create_reader_at_rva(rva) else {
            listener.bad_image(Diagnostic::new(
                DiagnosticCategory::Header,
                format!("VTable fixup directory RVA 0x{:08X} cannot be mapped", rva),
            ))?;
            return Ok(VTableFixups::default());
        };

        Self::from_reader(listener, factory, &mut reader, size)
    }

    /// Read `size / 8` entries from `reader`, skipping entries that cannot be mapped
    ///
    /// A directory running past the end of the image is reported as a bad image and yields no
    /// fixups.
    ///
    /// # Arguments
    /// * 'listener'    - Receives reports about the directory and its entries
    /// * 'factory'     - Creates readers at slot RVAs
    /// * 'reader'      - Positioned at the first entry
    /// * 'size'        - Size of the directory from the CLI header
    ///
    /// # Errors
    /// Returns an error if `listener` escalates a report
    pub fn from_reader(
        listener: &dyn ErrorListener,
        factory: &dyn RvaReaderFactory,
        reader: &mut BinaryReader,
        size: u32,
    ) -> Result<VTableFixups> {
        let count = size as usize / VTableFixup::SIZE;
        if !reader.can_read(count * VTableFixup::SIZE) {
            listener.bad_image(
                Diagnostic::new(
                    DiagnosticCategory::Header,
                    format!("VTable fixup directory of {} bytes exceeds the image", size),
                )
                .with_offset(reader.offset() as u64),
            )?;
            return Ok(VTableFixups::default());
        }

        let mut fixups = Vec::with_capacity(count);
        for _ in 0..count {
            if let Some(fixup) = VTableFixup::from_reader(listener, factory, reader)? {
                fixups.push(fixup);
            }
        }

        Ok(VTableFixups { fixups })
    }

    /// Number of decoded entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.fixups.len()
    }

    /// Returns true if no entries were decoded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fixups.is_empty()
    }

    /// The decoded entries
    pub fn iter(&self) -> std::slice::Iter<'_, VTableFixup> {
        self.fixups.iter()
    }
}

impl<'a> IntoIterator for &'a VTableFixups {
    type Item = &'a VTableFixup;
    type IntoIter = std::slice::Iter<'a, VTableFixup>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        file::memory::Memory,
        metadata::diagnostics::{Diagnostics, StrictListener},
        segment::FlatLayout,
    };

    #[rustfmt::skip]
    fn image() -> FlatLayout {
        let data = vec![
            // 0x1000: two 32 bit slots
            0x01, 0x00, 0x00, 0x06,
            0x02, 0x00, 0x00, 0x06,
            // 0x1008: one 64 bit slot
            0x03, 0x00, 0x00, 0x06, 0xFF, 0xFF, 0xFF, 0xFF,
        ];
        FlatLayout::new(Arc::new(Memory::new(data)), 0x1000)
    }

    #[rustfmt::skip]
    fn directory() -> Vec<u8> {
        vec![
            0x00, 0x10, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, // 0x1000, 2 slots, 32 bit
            0x08, 0x10, 0x00, 0x00, 0x01, 0x00, 0x06, 0x00, // 0x1008, 1 slot, 64 bit | unmanaged
            0x00, 0x50, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, // 0x5000, unmapped
        ]
    }

    #[test]
    fn crafted() {
        let listener = Diagnostics::new();
        let mut reader = BinaryReader::from_vec(directory());
        let fixups = VTableFixups::from_reader(&listener, &image(), &mut reader, 24).unwrap();

        assert_eq!(fixups.len(), 2);
        assert_eq!(reader.pos(), 24);

        let first = fixups.iter().next().unwrap();
        assert_eq!(first.rva, 0x1000);
        assert_eq!(first.vtable_type, VTableType::VTABLE_32BIT);
        assert_eq!(
            first.tokens,
            vec![Token::new(0x0600_0001), Token::new(0x0600_0002)]
        );

        let second = fixups.iter().nth(1).unwrap();
        assert!(second.vtable_type.contains(VTableType::FROM_UNMANAGED));
        assert_eq!(second.tokens, vec![Token::new(0x0600_0003)]);

        assert_eq!(listener.bad_image_count(), 1);
    }

    #[test]
    fn unmapped_entry() {
        let mut reader = BinaryReader::from_vec(directory());
        reader.seek(16).unwrap();

        let listener = Diagnostics::new();
        let fixup = VTableFixup::from_reader(&listener, &image(), &mut reader).unwrap();
        assert!(fixup.is_none());
        assert_eq!(reader.pos(), 24);
        assert!(listener.has_bad_image());

        reader.seek(16).unwrap();
        assert!(VTableFixup::from_reader(&StrictListener, &image(), &mut reader).is_err());
    }

    #[test]
    fn slots_past_the_end() {
        let mut data = directory();
        // 4 slots of 64 bits at 0x1008, only one fits
        data[12] = 0x04;
        let mut reader = BinaryReader::from_vec(data);
        reader.seek(8).unwrap();

        let listener = Diagnostics::new();
        assert!(VTableFixup::from_reader(&listener, &image(), &mut reader)
            .unwrap()
            .is_none());
        assert_eq!(listener.bad_image_count(), 1);
    }

    #[test]
    fn truncated_directory() {
        let listener = Diagnostics::new();
        let mut reader = BinaryReader::from_vec(directory());
        let fixups = VTableFixups::from_reader(&listener, &image(), &mut reader, 32).unwrap();
        assert!(fixups.is_empty());
        assert_eq!(listener.bad_image_count(), 1);

        let mut reader = BinaryReader::from_vec(directory());
        assert!(VTableFixups::from_reader(&StrictListener, &image(), &mut reader, 32).is_err());
    }

    #[test]
    fn unmapped_directory() {
        let listener = Diagnostics::new();
        let fixups = VTableFixups::from_rva(&listener, &image(), 0x7000_0000, 8).unwrap();
        assert!(fixups.is_empty());
        assert!(listener.has_bad_image());

        assert!(VTableFixups::from_rva(&StrictListener, &image(), 0x7000_0000, 8).is_err());

        let listener = Diagnostics::new();
        assert!(VTableFixups::from_rva(&listener, &image(), 0, 0)
            .unwrap()
            .is_empty());
        assert!(!listener.has_any());
    }
}
