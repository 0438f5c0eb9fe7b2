//! The debug directory of a PE image.
//!
//! The debug data directory is an array of `IMAGE_DEBUG_DIRECTORY` records. Each record describes
//! one blob of debug information (a CodeView PDB reference, an embedded portable PDB, a
//! reproducibility hash, ...) and locates it by RVA. The blob itself is read through the
//! [`RvaReaderFactory`] and handed to a [`DebugDataReader`], which decides how to interpret it.
//!
//! ```text
//! u32 characteristics | u32 time_date_stamp | u16 major | u16 minor | u32 type
//! u32 size_of_data | u32 address_of_raw_data | u32 pointer_to_raw_data
//! ```
//!
//! # Reference
//! - [PE Format, The .debug Section](https://learn.microsoft.com/en-us/windows/win32/debug/pe-format#the-debug-section)

use std::fmt;

use crate::{
    file::reader::BinaryReader,
    metadata::diagnostics::{Diagnostic, DiagnosticCategory, ErrorListener},
    segment::{DataSegment, RvaReaderFactory},
    Result,
};

/// The `Type` field of a debug directory record
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DebugDataType(pub u32);

impl DebugDataType {
    /// Unknown value, ignored by all tools
    pub const UNKNOWN: DebugDataType = DebugDataType(0);
    /// COFF debug information
    pub const COFF: DebugDataType = DebugDataType(1);
    /// Visual C++ debug information, a reference to a PDB
    pub const CODEVIEW: DebugDataType = DebugDataType(2);
    /// Frame pointer omission information
    pub const FPO: DebugDataType = DebugDataType(3);
    /// Location of a DBG file
    pub const MISC: DebugDataType = DebugDataType(4);
    /// Visual C++ feature counts
    pub const VC_FEATURE: DebugDataType = DebugDataType(12);
    /// Profile guided optimisation data
    pub const POGO: DebugDataType = DebugDataType(13);
    /// Hash that makes the image reproducible
    pub const REPRO: DebugDataType = DebugDataType(16);
    /// A portable PDB embedded into the image
    pub const EMBEDDED_PORTABLE_PDB: DebugDataType = DebugDataType(17);
    /// Checksum of the PDB the image was built with
    pub const PDB_CHECKSUM: DebugDataType = DebugDataType(19);
    /// Extended DLL characteristics
    pub const EX_DLL_CHARACTERISTICS: DebugDataType = DebugDataType(20);
}

impl fmt::Debug for DebugDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            DebugDataType::UNKNOWN => "Unknown",
            DebugDataType::COFF => "Coff",
            DebugDataType::CODEVIEW => "CodeView",
            DebugDataType::FPO => "Fpo",
            DebugDataType::MISC => "Misc",
            DebugDataType::VC_FEATURE => "VcFeature",
            DebugDataType::POGO => "Pogo",
            DebugDataType::REPRO => "Repro",
            DebugDataType::EMBEDDED_PORTABLE_PDB => "EmbeddedPortablePdb",
            DebugDataType::PDB_CHECKSUM => "PdbChecksum",
            DebugDataType::EX_DLL_CHARACTERISTICS => "ExDllCharacteristics",
            DebugDataType(other) => return write!(f, "DebugDataType({})", other),
        };
        f.write_str(name)
    }
}

/// The payload of a debug directory record
#[derive(Clone, Debug, PartialEq)]
pub enum DebugDataSegment {
    /// CodeView data, kept raw
    CodeView(DataSegment),
    /// Any other kind of debug data
    Custom {
        /// The record type
        kind: DebugDataType,
        /// The raw payload
        data: DataSegment,
    },
}

impl DebugDataSegment {
    /// The record type the payload was read for
    #[must_use]
    pub fn kind(&self) -> DebugDataType {
        match self {
            DebugDataSegment::CodeView(_) => DebugDataType::CODEVIEW,
            DebugDataSegment::Custom { kind, .. } => *kind,
        }
    }

    /// The raw payload
    #[must_use]
    pub fn data(&self) -> &DataSegment {
        match self {
            DebugDataSegment::CodeView(data) | DebugDataSegment::Custom { data, .. } => data,
        }
    }
}

/// Interprets the payload of a debug directory record
pub trait DebugDataReader: Send + Sync {
    /// Read the payload of a record of type `kind`
    ///
    /// # Arguments
    /// * 'listener'    - Receives reports about malformed payloads
    /// * 'kind'        - Type of the record
    /// * 'reader'      - Spans exactly the payload
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    fn read_debug_data(
        &self,
        listener: &dyn ErrorListener,
        kind: DebugDataType,
        reader: &BinaryReader,
    ) -> Result<Option<DebugDataSegment>>;
}

/// Splits CodeView data from everything else and keeps both raw
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDebugDataReader;

impl DebugDataReader for DefaultDebugDataReader {
    fn read_debug_data(
        &self,
        _listener: &dyn ErrorListener,
        kind: DebugDataType,
        reader: &BinaryReader,
    ) -> Result<Option<DebugDataSegment>> {
        let data = reader.to_segment();
        if kind == DebugDataType::CODEVIEW {
            return Ok(Some(DebugDataSegment::CodeView(data)));
        }

        Ok(Some(DebugDataSegment::Custom { kind, data }))
    }
}

/// One record of the debug directory
#[derive(Clone, Debug, PartialEq)]
pub struct DebugDataEntry {
    /// Reserved, zero
    pub characteristics: u32,
    /// When the debug data was created
    pub time_date_stamp: u32,
    /// Major version of the debug data format
    pub major_version: u16,
    /// Minor version of the debug data format
    pub minor_version: u16,
    /// Type of the payload
    pub kind: DebugDataType,
    /// Size of the payload
    pub size_of_data: u32,
    /// RVA of the payload, zero if it is not mapped
    pub address_of_raw_data: u32,
    /// File offset of the payload
    pub pointer_to_raw_data: u32,
    /// The payload, `None` if the record has none or it cannot be read
    pub contents: Option<DebugDataSegment>,
}

impl DebugDataEntry {
    /// Size of one record
    pub const SIZE: usize = 28;

    /// Read one record at the position of `reader` and the payload it points at
    ///
    /// The record is always consumed. A payload that cannot be mapped is reported as a bad image
    /// and leaves `contents` empty.
    ///
    /// # Arguments
    /// * 'listener'    - Receives reports about unmappable payloads
    /// * 'factory'     - Creates a reader at the payload RVA
    /// * 'debug_reader' - Interprets the payload
    /// * 'reader'      - Positioned at the record
    ///
    /// # Errors
    /// Returns an error if the record itself is truncated or `listener` escalates a report
    pub fn from_reader(
        listener: &dyn ErrorListener,
        factory: &dyn RvaReaderFactory,
        debug_reader: &dyn DebugDataReader,
        reader: &mut BinaryReader,
    ) -> Result<DebugDataEntry> {
        let offset = reader.offset();
        let mut entry = DebugDataEntry {
            characteristics: reader.read_le::<u32>()?,
            time_date_stamp: reader.read_le::<u32>()?,
            major_version: reader.read_le::<u16>()?,
            minor_version: reader.read_le::<u16>()?,
            kind: DebugDataType(reader.read_le::<u32>()?),
            size_of_data: reader.read_le::<u32>()?,
            address_of_raw_data: reader.read_le::<u32>()?,
            pointer_to_raw_data: reader.read_le::<u32>()?,
            contents: None,
        };

        if entry.size_of_data == 0 || entry.address_of_raw_data == 0 {
            return Ok(entry);
        }

        let payload = factory
            .create_reader_at_rva(entry.address_of_raw_data)
            .and_then(|payload| payload.fork_slice(0, entry.size_of_data as usize).ok());
        let Some(payload) = payload else {
            listener.bad_image(
                Diagnostic::new(
                    DiagnosticCategory::Header,
                    format!(
                        "Debug data of {} bytes at RVA 0x{:08X} cannot be mapped",
                        entry.size_of_data, entry.address_of_raw_data
                    ),
                )
                .with_offset(offset as u64),
            )?;
            return Ok(entry);
        };

        entry.contents = debug_reader.read_debug_data(listener, entry.kind, &payload)?;
        Ok(entry)
    }
}

/// The debug directory of an image
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DebugDirectory {
    entries: Vec<DebugDataEntry>,
}

impl DebugDirectory {
    /// Read the directory the debug data directory of the optional header points at
    ///
    /// A zero RVA means the image has no debug data. A directory that cannot be mapped is
    /// reported as a bad image and yields no entries.
    ///
    /// # Arguments
    /// * 'listener'    - Receives reports about the directory and its entries
    /// * 'factory'     - Creates readers at the directory and payload RVAs
    /// * 'debug_reader' - Interprets the payloads
    /// * 'rva'         - RVA of the directory
    /// * 'size'        - Size of the directory
    ///
    /// # Errors
    /// Returns an error if `listener` escalates a report
    pub fn from_rva(
        listener: &dyn ErrorListener,
        factory: &dyn RvaReaderFactory,
        debug_reader: &dyn DebugDataReader,
        rva: u32,
        size: u32,
    ) -> Result<DebugDirectory> {
        if rva == 0 {
            return Ok(DebugDirectory::default());
        }

        let count = size as usize / DebugDataEntry::SIZE;
        let reader = factory
            .create_reader_at_rva(rva)
            .filter(|reader| reader.can_read(count * DebugDataEntry::SIZE));
        let Some(mut reader) = reader else {
            listener.bad_image(Diagnostic::new(
                DiagnosticCategory::Header,
                format!(
                    "Debug directory of {} bytes at RVA 0x{:08X} cannot be mapped",
                    size, rva
                ),
            ))?;
            return Ok(DebugDirectory::default());
        };

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(DebugDataEntry::from_reader(
                listener,
                factory,
                debug_reader,
                &mut reader,
            )?);
        }

        Ok(DebugDirectory { entries })
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the image has no debug records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The records, in directory order
    pub fn iter(&self) -> std::slice::Iter<'_, DebugDataEntry> {
        self.entries.iter()
    }

    /// The first record of type `kind`
    #[must_use]
    pub fn find(&self, kind: DebugDataType) -> Option<&DebugDataEntry> {
        self.entries.iter().find(|entry| entry.kind == kind)
    }
}

impl<'a> IntoIterator for &'a DebugDirectory {
    type Item = &'a DebugDataEntry;
    type IntoIter = std::slice::Iter<'a, DebugDataEntry>;

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

    fn record(kind: u32, size: u32, rva: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0_u32.to_le_bytes());
        out.extend_from_slice(&0x6500_0000_u32.to_le_bytes());
        out.extend_from_slice(&1_u16.to_le_bytes());
        out.extend_from_slice(&0x504D_u16.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&rva.to_le_bytes());
        out.extend_from_slice(&0_u32.to_le_bytes());
        out
    }

    /// Directory at 0x1000 followed by a CodeView and a portable PDB payload
    fn image() -> (FlatLayout, u32) {
        let mut data = Vec::new();
        data.extend(record(2, 8, 0x1000 + 4 * 28));
        data.extend(record(17, 4, 0x1000 + 4 * 28 + 8));
        data.extend(record(16, 0, 0));
        data.extend(record(17, 4, 0x7000_0000));
        data.extend_from_slice(b"RSDS\x01\x02\x03\x04");
        data.extend_from_slice(b"MPDB");
        (FlatLayout::new(Arc::new(Memory::new(data)), 0x1000), 4 * 28)
    }

    #[test]
    fn crafted() {
        let (layout, size) = image();
        let listener = Diagnostics::new();
        let directory = DebugDirectory::from_rva(
            &listener,
            &layout,
            &DefaultDebugDataReader,
            0x1000,
            size,
        )
        .unwrap();

        assert_eq!(directory.len(), 4);

        let codeview = directory.find(DebugDataType::CODEVIEW).unwrap();
        assert_eq!(codeview.time_date_stamp, 0x6500_0000);
        let Some(DebugDataSegment::CodeView(data)) = &codeview.contents else {
            panic!("expected CodeView data, got {:?}", codeview.contents);
        };
        assert_eq!(&data.data()[..4], b"RSDS");
        assert_eq!(data.len(), 8);

        let pdb = directory.iter().nth(1).unwrap();
        assert_eq!(pdb.minor_version, 0x504D);
        let contents = pdb.contents.as_ref().unwrap();
        assert_eq!(contents.kind(), DebugDataType::EMBEDDED_PORTABLE_PDB);
        assert_eq!(contents.data().data(), b"MPDB");

        // No payload
        let repro = directory.find(DebugDataType::REPRO).unwrap();
        assert!(repro.contents.is_none());

        // Payload outside of the image
        assert!(directory.iter().nth(3).unwrap().contents.is_none());
        assert_eq!(listener.bad_image_count(), 1);
    }

    #[test]
    fn unmapped_payload_is_strict_error() {
        let (layout, size) = image();
        assert!(DebugDirectory::from_rva(
            &StrictListener,
            &layout,
            &DefaultDebugDataReader,
            0x1000,
            size,
        )
        .is_err());
    }

    #[test]
    fn unmapped_directory() {
        let (layout, _) = image();
        let listener = Diagnostics::new();

        let directory =
            DebugDirectory::from_rva(&listener, &layout, &DefaultDebugDataReader, 0x7000_0000, 28)
                .unwrap();
        assert!(directory.is_empty());

        // Runs past the end of the image
        let directory =
            DebugDirectory::from_rva(&listener, &layout, &DefaultDebugDataReader, 0x1000, 28 * 10)
                .unwrap();
        assert!(directory.is_empty());
        assert_eq!(listener.bad_image_count(), 2);

        assert!(
            DebugDirectory::from_rva(&listener, &layout, &DefaultDebugDataReader, 0, 0)
                .unwrap()
                .is_empty()
        );
        assert_eq!(listener.bad_image_count(), 2);
    }

    #[test]
    fn custom_reader() {
        struct PortablePdbOnly;

        impl DebugDataReader for PortablePdbOnly {
            fn read_debug_data(
                &self,
                _listener: &dyn ErrorListener,
                kind: DebugDataType,
                reader: &BinaryReader,
            ) -> Result<Option<DebugDataSegment>> {
                Ok((kind == DebugDataType::EMBEDDED_PORTABLE_PDB).then(|| {
                    DebugDataSegment::Custom {
                        kind,
                        data: reader.to_segment(),
                    }
                }))
            }
        }

        let (layout, size) = image();
        let listener = Diagnostics::new();
        let directory =
            DebugDirectory::from_rva(&listener, &layout, &PortablePdbOnly, 0x1000, size)
                .unwrap();

        let with_contents = directory
            .iter()
            .filter(|entry| entry.contents.is_some())
            .map(|entry| entry.kind)
            .collect::<Vec<_>>();
        assert_eq!(with_contents, [DebugDataType::EMBEDDED_PORTABLE_PDB]);
    }
}
