//! A loaded CLI image.
//!
//! [`CilImage`] ties the layers together: the PE [`File`], its [`Cor20Header`], the
//! [`MetadataDirectory`] the header points at, the VTable fixups of mixed-mode images, the debug
//! directory and a [`ModuleReader`] over the metadata. Everything past the metadata root is decoded lazily.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilmeta::{CilImage, Diagnostics, ReaderParameters};
//! use std::{path::Path, sync::Arc};
//!
//! let diagnostics = Arc::new(Diagnostics::new());
//! let parameters = ReaderParameters::default().with_listener(diagnostics.clone());
//! let image = CilImage::from_file_with(Path::new("tests/samples/crafted.dll"), parameters)?;
//!
//! println!("Runtime {}", image.metadata().version());
//! for reference in image.module().assembly_references() {
//!     println!("{:?} {:?}", reference.name()?, reference.version()?);
//! }
//! println!("{}", diagnostics.summary());
//! # Ok::<(), cilmeta::Error>(())
//! ```

use std::{fmt, path::Path, sync::Arc};

use crate::{
    debug::DebugDirectory,
    file::File,
    metadata::{
        cor20header::Cor20Header,
        directory::MetadataDirectory,
        members::{ModuleReader, ReaderParameters},
        vtablefixup::VTableFixups,
    },
    segment::RvaReaderFactory,
    Result,
};

/// A PE image together with its decoded CLI header and metadata
pub struct CilImage {
    file: Arc<File>,
    cor20header: Cor20Header,
    metadata: Arc<MetadataDirectory>,
    vtable_fixups: VTableFixups,
    debug_directory: DebugDirectory,
    module: Arc<ModuleReader>,
}

impl CilImage {
    /// Load and memory-map the image at `file`, recording problems with [`crate::Diagnostics`]
    ///
    /// # Errors
    /// Returns an error if the file is not a PE image with a valid CLI header and metadata root
    pub fn from_file(file: &Path) -> Result<CilImage> {
        Self::from_file_with(file, ReaderParameters::default())
    }

    /// Load and memory-map the image at `file`
    ///
    /// # Errors
    /// Returns an error if the file is not a PE image with a valid CLI header and metadata root,
    /// or the listener of `parameters` escalates a report
    pub fn from_file_with(file: &Path, parameters: ReaderParameters) -> Result<CilImage> {
        let input = Arc::new(File::from_file(file)?);
        Self::load(input, parameters)
    }

    /// Load an image held in memory, recording problems with [`crate::Diagnostics`]
    ///
    /// # Errors
    /// Returns an error if `data` is not a PE image with a valid CLI header and metadata root
    pub fn from_mem(data: Vec<u8>) -> Result<CilImage> {
        Self::from_mem_with(data, ReaderParameters::default())
    }

    /// Load an image held in memory
    ///
    /// # Errors
    /// Returns an error if `data` is not a PE image with a valid CLI header and metadata root,
    /// or the listener of `parameters` escalates a report
    pub fn from_mem_with(data: Vec<u8>, parameters: ReaderParameters) -> Result<CilImage> {
        let input = Arc::new(File::from_mem(data)?);
        Self::load(input, parameters)
    }

    fn load(file: Arc<File>, parameters: ReaderParameters) -> Result<CilImage> {
        let (clr_rva, clr_size) = file.clr();
        if (clr_size as usize) < Cor20Header::SIZE {
            return Err(malformed_error!(
                "CLR runtime header directory is too small - {} bytes",
                clr_size
            ));
        }

        let Some(mut reader) = file.create_reader_at_rva(clr_rva) else {
            return Err(malformed_error!(
                "CLR runtime header is not mapped - 0x{:X}",
                clr_rva
            ));
        };
        let cor20header = Cor20Header::read(&mut reader)?;

        let Some(reader) = file.create_reader_at_rva(cor20header.meta_data_rva) else {
            return Err(malformed_error!(
                "Metadata is not mapped - 0x{:X}",
                cor20header.meta_data_rva
            ));
        };
        let reader = reader.fork_slice(0, reader.len().min(cor20header.meta_data_size as usize))?;

        let Some(metadata) = MetadataDirectory::from_reader(
            Arc::clone(&parameters.listener),
            &reader,
            Arc::clone(&file) as _,
        )?
        else {
            return Err(malformed_error!("Image does not carry a valid metadata root"));
        };

        let vtable_fixups = VTableFixups::from_rva(
            parameters.listener.as_ref(),
            file.as_ref(),
            cor20header.vtable_fixups_rva,
            cor20header.vtable_fixups_size,
        )?;

        let (debug_rva, debug_size) = file.debug_directory();
        let debug_directory = DebugDirectory::from_rva(
            parameters.listener.as_ref(),
            file.as_ref(),
            parameters.debug_data_reader.as_ref(),
            debug_rva,
            debug_size,
        )?;

        tracing::debug!(
            version = metadata.version(),
            vtable_fixups = vtable_fixups.len(),
            debug_entries = debug_directory.len(),
            "loaded CLI image"
        );

        let metadata = Arc::new(metadata);
        let module = ModuleReader::new(Arc::clone(&metadata), parameters);
        Ok(CilImage {
            file,
            cor20header,
            metadata,
            vtable_fixups,
            debug_directory,
            module,
        })
    }

    /// The underlying PE image
    #[must_use]
    pub fn file(&self) -> &Arc<File> {
        &self.file
    }

    /// The CLI header
    #[must_use]
    pub fn cor20header(&self) -> &Cor20Header {
        &self.cor20header
    }

    /// The metadata root and its streams
    #[must_use]
    pub fn metadata(&self) -> &Arc<MetadataDirectory> {
        &self.metadata
    }

    /// The VTable fixups, empty for pure IL images
    #[must_use]
    pub fn vtable_fixups(&self) -> &VTableFixups {
        &self.vtable_fixups
    }

    /// The debug directory, empty if the image has none
    #[must_use]
    pub fn debug_directory(&self) -> &DebugDirectory {
        &self.debug_directory
    }

    /// The member reader over the metadata
    #[must_use]
    pub fn module(&self) -> &Arc<ModuleReader> {
        &self.module
    }
}

impl fmt::Debug for CilImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CilImage")
            .field("len", &self.file.len())
            .field("cor20header", &self.cor20header)
            .field("metadata", &self.metadata)
            .field("vtable_fixups", &self.vtable_fixups)
            .field("debug_directory", &self.debug_directory)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        debug::{DebugDataEntry, DebugDataSegment, DebugDataType},
        metadata::{
            cor20header::CorFlags,
            diagnostics::{Diagnostics, StrictListener},
            members::tests::sample,
            token::Token,
            vtablefixup::VTableType,
        },
        test::pe::{cil_text, PeBuilder, METADATA_TEXT_OFFSET},
        Error,
    };

    /// Offset of `vtable_fixups_rva` within the CLI header
    const VTABLE_FIXUPS_FIELD: usize = 48;

    #[test]
    fn load_from_mem() {
        let image = CilImage::from_mem(PeBuilder::new(cil_text(&sample().build())).build()).unwrap();

        assert_eq!(
            image.cor20header().meta_data_rva,
            PeBuilder::TEXT_RVA + METADATA_TEXT_OFFSET
        );
        assert!(image.cor20header().cor_flags().contains(CorFlags::IL_ONLY));
        assert_eq!(image.metadata().version(), "v4.0.30319");
        assert!(image.vtable_fixups().is_empty());

        let module = image.module();
        assert_eq!(
            module.definition().unwrap().name().unwrap(),
            Some("Sample.dll")
        );
        assert_eq!(module.type_references().count(), 5);
        assert_eq!(
            module.assembly_references().next().unwrap().name().unwrap(),
            Some("mscorlib")
        );
    }

    #[test]
    fn bad_metadata_signature() {
        let mut metadata = sample().build();
        metadata[0..4].copy_from_slice(b"XXXX");
        let data = PeBuilder::new(cil_text(&metadata)).build();

        let diagnostics = Arc::new(Diagnostics::new());
        let result = CilImage::from_mem_with(
            data.clone(),
            ReaderParameters::default().with_listener(diagnostics.clone()),
        );
        assert!(matches!(result, Err(Error::Malformed { .. })));
        assert_eq!(diagnostics.bad_image_count(), 1);

        let result = CilImage::from_mem_with(
            data,
            ReaderParameters::default().with_listener(Arc::new(StrictListener)),
        );
        assert!(matches!(
            result,
            Err(Error::Malformed { message, .. }) if message.contains("Invalid metadata signature")
        ));
    }

    #[test]
    fn truncated_clr_directory() {
        let data = PeBuilder::new(cil_text(&sample().build()))
            .clr(PeBuilder::TEXT_RVA, 16)
            .build();
        assert!(CilImage::from_mem(data).is_err());
    }

    #[test]
    fn vtable_fixups() {
        let mut text = cil_text(&sample().build());
        text.resize(text.len().next_multiple_of(4), 0);

        let directory_rva = PeBuilder::TEXT_RVA + text.len() as u32;
        let slots_rva = directory_rva + 8;
        text.extend_from_slice(&slots_rva.to_le_bytes());
        text.extend_from_slice(&2_u16.to_le_bytes());
        text.extend_from_slice(&VTableType::VTABLE_32BIT.bits().to_le_bytes());
        text.extend_from_slice(&0x0600_0001_u32.to_le_bytes());
        text.extend_from_slice(&0x0600_0002_u32.to_le_bytes());

        text[VTABLE_FIXUPS_FIELD..VTABLE_FIXUPS_FIELD + 4]
            .copy_from_slice(&directory_rva.to_le_bytes());
        text[VTABLE_FIXUPS_FIELD + 4..VTABLE_FIXUPS_FIELD + 8].copy_from_slice(&8_u32.to_le_bytes());

        let image = CilImage::from_mem(PeBuilder::new(text).build()).unwrap();
        let fixups = image.vtable_fixups();
        assert_eq!(fixups.len(), 1);

        let fixup = fixups.iter().next().unwrap();
        assert_eq!(fixup.rva, slots_rva);
        assert_eq!(fixup.vtable_type, VTableType::VTABLE_32BIT);
        assert_eq!(
            fixup.tokens,
            [Token::new(0x0600_0001), Token::new(0x0600_0002)]
        );
    }

    #[test]
    fn unmapped_vtable_fixups() {
        let mut text = cil_text(&sample().build());
        text[VTABLE_FIXUPS_FIELD..VTABLE_FIXUPS_FIELD + 4]
            .copy_from_slice(&0x7000_0000_u32.to_le_bytes());
        text[VTABLE_FIXUPS_FIELD + 4..VTABLE_FIXUPS_FIELD + 8].copy_from_slice(&8_u32.to_le_bytes());
        let data = PeBuilder::new(text).build();

        let diagnostics = Arc::new(Diagnostics::new());
        let image = CilImage::from_mem_with(
            data.clone(),
            ReaderParameters::default().with_listener(diagnostics.clone()),
        )
        .unwrap();
        assert!(image.vtable_fixups().is_empty());
        assert_eq!(diagnostics.bad_image_count(), 1);
        assert_eq!(image.module().type_references().count(), 5);

        let result = CilImage::from_mem_with(
            data,
            ReaderParameters::default().with_listener(Arc::new(StrictListener)),
        );
        assert!(result.is_err());
    }

    #[test]
    fn debug_directory() {
        let mut text = cil_text(&sample().build());
        text.resize(text.len().next_multiple_of(4), 0);

        let directory_rva = PeBuilder::TEXT_RVA + text.len() as u32;
        let codeview_rva = directory_rva + 2 * DebugDataEntry::SIZE as u32;
        let mut codeview = b"RSDS".to_vec();
        codeview.extend_from_slice(&[0x11; 16]);
        codeview.extend_from_slice(&1_u32.to_le_bytes());
        codeview.extend_from_slice(b"a.pdb\0");
        let pdb_rva = codeview_rva + codeview.len() as u32;

        for (kind, size, rva) in [
            (DebugDataType::CODEVIEW, codeview.len() as u32, codeview_rva),
            (DebugDataType::EMBEDDED_PORTABLE_PDB, 4, pdb_rva),
        ] {
            let offset = rva - PeBuilder::TEXT_RVA + PeBuilder::TEXT_OFFSET;
            text.extend_from_slice(&0_u32.to_le_bytes());
            text.extend_from_slice(&0_u32.to_le_bytes());
            text.extend_from_slice(&0_u32.to_le_bytes());
            text.extend_from_slice(&kind.0.to_le_bytes());
            text.extend_from_slice(&size.to_le_bytes());
            text.extend_from_slice(&rva.to_le_bytes());
            text.extend_from_slice(&offset.to_le_bytes());
        }
        text.extend_from_slice(&codeview);
        text.extend_from_slice(b"MPDB");

        let data = PeBuilder::new(text)
            .debug(directory_rva, 2 * DebugDataEntry::SIZE as u32)
            .build();
        let diagnostics = Arc::new(Diagnostics::new());
        let image = CilImage::from_mem_with(
            data,
            ReaderParameters::default().with_listener(diagnostics.clone()),
        )
        .unwrap();

        let debug = image.debug_directory();
        assert_eq!(debug.len(), 2);

        let entry = debug.find(DebugDataType::CODEVIEW).unwrap();
        let Some(DebugDataSegment::CodeView(segment)) = &entry.contents else {
            panic!("expected CodeView data, got {:?}", entry.contents);
        };
        assert_eq!(segment.rva(), codeview_rva);
        assert_eq!(segment.data(), codeview.as_slice());

        let entry = debug.find(DebugDataType::EMBEDDED_PORTABLE_PDB).unwrap();
        assert_eq!(entry.contents.as_ref().unwrap().data().data(), b"MPDB");
        assert!(!diagnostics.has_any());

        assert!(CilImage::from_mem(PeBuilder::new(cil_text(&sample().build())).build())
            .unwrap()
            .debug_directory()
            .is_empty());
    }
}
