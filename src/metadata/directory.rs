//! The metadata root (`BSJB`) and its stream directory.
//!
//! [`MetadataDirectory::from_reader`] decodes the fixed part of the root in one pass and keeps
//! two forked cursors: one over the whole metadata blob (the stream contents) and one at the
//! first stream header. Stream headers are only decoded, and the streams only sliced out of the
//! blob, the first time [`MetadataDirectory::streams`] is called.
//!
//! # Layout
//!
//! ```text
//! u32 signature | u16 major | u16 minor | u32 reserved | i32 version length | version
//! u16 flags | i16 stream count
//! stream count x ( u32 offset | u32 size | name\0 padded to 4 )
//! ```
//!
//! # Reference
//! - [ECMA-335 II.24.2.1](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::sync::{Arc, OnceLock};

use crate::{
    file::reader::BinaryReader,
    metadata::{
        diagnostics::{Diagnostic, DiagnosticCategory, ErrorListener},
        streams::{Blob, Guid, MetadataStream, Strings, UserStrings},
        tables::TablesStream,
    },
    segment::SegmentReferenceResolver,
    Result,
};

/// `BSJB`, the signature of the metadata root
pub const METADATA_SIGNATURE: u32 = 0x424A_5342;
/// `+MOC`, the signature of pre-release metadata
pub const LEGACY_METADATA_SIGNATURE: u32 = 0x2B4D_4F43;

/// Longest stream name, including the terminator
const MAX_STREAM_NAME: usize = 32;

/// One entry of the stream directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream, relative to the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Name of the stream
    pub name: String,
}

impl StreamHeader {
    /// Read one stream header and skip the padding after its name
    ///
    /// # Errors
    /// Returns an error if the header is truncated or its name is not terminated
    pub fn read(reader: &mut BinaryReader) -> Result<StreamHeader> {
        let offset = reader.read_le::<u32>()?;
        let size = reader.read_le::<u32>()?;
        let name = reader.read_aligned_name(MAX_STREAM_NAME)?;

        Ok(StreamHeader { offset, size, name })
    }
}

struct StreamList {
    headers: Vec<StreamHeader>,
    streams: Vec<MetadataStream>,
}

/// The decoded metadata root
pub struct MetadataDirectory {
    major_version: u16,
    minor_version: u16,
    reserved: u32,
    version: String,
    flags: u16,
    stream_count: i16,
    contents: BinaryReader,
    entries: BinaryReader,
    resolver: Arc<dyn SegmentReferenceResolver>,
    listener: Arc<dyn ErrorListener>,
    streams: OnceLock<StreamList>,
}

impl MetadataDirectory {
    /// Decode the metadata root at the position of `reader`
    ///
    /// Returns `Ok(None)` after reporting to `listener` if the signature is not `BSJB` or the
    /// root is truncated.
    ///
    /// # Arguments
    /// * 'listener'    - Receives everything wrong with the root and, later, the streams
    /// * 'reader'      - Positioned at the metadata root; stream offsets are relative to it
    /// * 'resolver'    - Maps RVAs found in metadata (e.g. `FieldRVA`) to image data
    ///
    /// # Errors
    /// Only returns an error if `listener` escalates a report
    pub fn from_reader(
        listener: Arc<dyn ErrorListener>,
        reader: &BinaryReader,
        resolver: Arc<dyn SegmentReferenceResolver>,
    ) -> Result<Option<MetadataDirectory>> {
        let contents = reader.fork_at(reader.pos())?;
        let mut header = contents.fork();

        let signature = match header.read_le::<u32>() {
            Ok(signature) => signature,
            Err(error) => {
                listener.bad_image(Self::diagnostic(
                    &header,
                    format!("Metadata root is truncated - {}", error),
                ))?;
                return Ok(None);
            }
        };

        if signature == LEGACY_METADATA_SIGNATURE {
            listener.not_supported(Self::diagnostic(
                &header,
                "Pre-release metadata (+MOC) is not supported",
            ))?;
            return Ok(None);
        }

        if signature != METADATA_SIGNATURE {
            listener.bad_image(Self::diagnostic(
                &header,
                format!("Invalid metadata signature - 0x{:08X}", signature),
            ))?;
            return Ok(None);
        }

        match Self::read_root(&mut header) {
            Ok((major_version, minor_version, reserved, version, flags, stream_count)) => {
                tracing::debug!(
                    version = %version,
                    streams = stream_count,
                    "metadata root at 0x{:X}",
                    contents.start_offset()
                );

                Ok(Some(MetadataDirectory {
                    major_version,
                    minor_version,
                    reserved,
                    version,
                    flags,
                    stream_count,
                    contents,
                    entries: header,
                    resolver,
                    listener,
                    streams: OnceLock::new(),
                }))
            }
            Err(error) => {
                listener.bad_image(Self::diagnostic(&header, error.to_string()))?;
                Ok(None)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn read_root(header: &mut BinaryReader) -> Result<(u16, u16, u32, String, u16, i16)> {
        let major_version = header.read_le::<u16>()?;
        let minor_version = header.read_le::<u16>()?;
        let reserved = header.read_le::<u32>()?;

        let version_length = header.read_le::<i32>()?;
        let Ok(version_length) = usize::try_from(version_length) else {
            return Err(malformed_error!(
                "Negative metadata version length - {}",
                version_length
            ));
        };
        if !header.can_read(version_length) {
            return Err(malformed_error!(
                "Metadata version length {} exceeds the remaining {} bytes",
                version_length,
                header.remaining()
            ));
        }

        let version_bytes = header.read_bytes(version_length)?;
        let version = String::from_utf8_lossy(version_bytes)
            .trim_end_matches('\0')
            .to_string();

        let flags = header.read_le::<u16>()?;
        let stream_count = header.read_le::<i16>()?;

        Ok((
            major_version,
            minor_version,
            reserved,
            version,
            flags,
            stream_count,
        ))
    }

    fn diagnostic(reader: &BinaryReader, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(DiagnosticCategory::Directory, message).with_offset(reader.offset() as u64)
    }

    /// Major version of the metadata format
    #[must_use]
    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    /// Minor version of the metadata format
    #[must_use]
    pub fn minor_version(&self) -> u16 {
        self.minor_version
    }

    /// Reserved, always 0 for well formed images
    #[must_use]
    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    /// The runtime version string, e.g. `v4.0.30319`
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Reserved flags
    #[must_use]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Number of streams as declared in the root
    #[must_use]
    pub fn stream_count(&self) -> i16 {
        self.stream_count
    }

    /// A cursor over the whole metadata blob
    #[must_use]
    pub fn contents(&self) -> &BinaryReader {
        &self.contents
    }

    /// The resolver RVAs found in metadata are mapped through
    #[must_use]
    pub fn resolver(&self) -> &Arc<dyn SegmentReferenceResolver> {
        &self.resolver
    }

    /// The listener this directory reports to
    #[must_use]
    pub fn listener(&self) -> &Arc<dyn ErrorListener> {
        &self.listener
    }

    /// The streams in directory order, decoded on first access
    ///
    /// # Errors
    /// Only returns an error if the listener escalates a report. Nothing is cached in that
    /// case, a later call decodes again.
    pub fn streams(&self) -> Result<&[MetadataStream]> {
        Ok(&self.stream_list()?.streams)
    }

    /// The stream headers of all streams returned by [`MetadataDirectory::streams`], in the same
    /// order
    ///
    /// # Errors
    /// See [`MetadataDirectory::streams`]
    pub fn stream_headers(&self) -> Result<&[StreamHeader]> {
        Ok(&self.stream_list()?.headers)
    }

    fn stream_list(&self) -> Result<&StreamList> {
        if let Some(list) = self.streams.get() {
            return Ok(list);
        }

        let list = self.read_streams()?;
        Ok(self.streams.get_or_init(|| list))
    }

    fn read_streams(&self) -> Result<StreamList> {
        let mut list = StreamList {
            headers: Vec::new(),
            streams: Vec::new(),
        };

        if self.stream_count <= 0 {
            return Ok(list);
        }

        let mut entries = self.entries.fork();
        for index in 0..self.stream_count {
            let header = match StreamHeader::read(&mut entries) {
                Ok(header) => header,
                Err(error) => {
                    self.listener.bad_image(Self::diagnostic(
                        &entries,
                        format!(
                            "Stream header {} of {} is invalid - {}",
                            index, self.stream_count, error
                        ),
                    ))?;
                    break;
                }
            };

            let segment = match self
                .contents
                .fork_slice(header.offset as usize, header.size as usize)
            {
                Ok(slice) => slice.to_segment(),
                Err(_) => {
                    self.listener.bad_image(Self::diagnostic(
                        &entries,
                        format!(
                            "Stream '{}' (0x{:X}, 0x{:X} bytes) exceeds the metadata of 0x{:X} bytes",
                            header.name,
                            header.offset,
                            header.size,
                            self.contents.len()
                        ),
                    ))?;
                    continue;
                }
            };

            let stream = MetadataStream::from_segment(&*self.listener, &header.name, segment)?;
            tracing::debug!(
                name = %header.name,
                offset = header.offset,
                size = header.size,
                kind = ?stream.kind(),
                "metadata stream"
            );

            list.headers.push(header);
            list.streams.push(stream);
        }

        Ok(list)
    }

    /// The first stream named `name`
    ///
    /// # Errors
    /// See [`MetadataDirectory::streams`]
    pub fn stream_by_name(&self, name: &str) -> Result<Option<&MetadataStream>> {
        Ok(self.streams()?.iter().find(|stream| stream.name() == name))
    }

    /// The `#Strings` heap. If the name occurs more than once, the last one is used.
    ///
    /// # Errors
    /// See [`MetadataDirectory::streams`]
    pub fn strings(&self) -> Result<Option<&Strings>> {
        Ok(self.streams()?.iter().rev().find_map(|stream| match stream {
            MetadataStream::Strings(strings) => Some(strings),
            _ => None,
        }))
    }

    /// The `#US` heap. If the name occurs more than once, the last one is used.
    ///
    /// # Errors
    /// See [`MetadataDirectory::streams`]
    pub fn user_strings(&self) -> Result<Option<&UserStrings>> {
        Ok(self.streams()?.iter().rev().find_map(|stream| match stream {
            MetadataStream::UserStrings(user_strings) => Some(user_strings),
            _ => None,
        }))
    }

    /// The `#GUID` heap. If the name occurs more than once, the last one is used.
    ///
    /// # Errors
    /// See [`MetadataDirectory::streams`]
    pub fn guids(&self) -> Result<Option<&Guid>> {
        Ok(self.streams()?.iter().rev().find_map(|stream| match stream {
            MetadataStream::Guid(guids) => Some(guids),
            _ => None,
        }))
    }

    /// The `#Blob` heap. If the name occurs more than once, the last one is used.
    ///
    /// # Errors
    /// See [`MetadataDirectory::streams`]
    pub fn blob(&self) -> Result<Option<&Blob>> {
        Ok(self.streams()?.iter().rev().find_map(|stream| match stream {
            MetadataStream::Blob(blob) => Some(blob),
            _ => None,
        }))
    }

    /// The tables stream, `#~` or `#-`. If both occur, the last one is used.
    ///
    /// # Errors
    /// See [`MetadataDirectory::streams`]
    pub fn tables(&self) -> Result<Option<&TablesStream>> {
        Ok(self.streams()?.iter().rev().find_map(|stream| match stream {
            MetadataStream::Tables(tables) => Some(tables.as_ref()),
            _ => None,
        }))
    }
}

impl std::fmt::Debug for MetadataDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataDirectory")
            .field("major_version", &self.major_version)
            .field("minor_version", &self.minor_version)
            .field("version", &self.version)
            .field("flags", &self.flags)
            .field("stream_count", &self.stream_count)
            .field("contents", &self.contents)
            .finish_non_exhaustive()
    }
}
