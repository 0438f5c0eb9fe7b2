//! Metadata streams.
//!
//! The metadata root is followed by a directory of named streams. Five names have a defined
//! meaning and get a typed view, everything else is kept as an opaque [`CustomStream`]:
//!
//! - **`#Strings`** - UTF-8 identifiers, see [`Strings`]
//! - **`#US`** - UTF-16 string literals, see [`UserStrings`]
//! - **`#GUID`** - 1-based array of GUIDs, see [`Guid`]
//! - **`#Blob`** - length-prefixed binary records, see [`Blob`]
//! - **`#~`** / **`#-`** - the metadata tables, see [`crate::metadata::tables::TablesStream`]
//!
//! A stream whose contents cannot be decoded as its kind is reported to the
//! [`ErrorListener`] and kept as a [`CustomStream`], so the rest of the directory stays usable.
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partition II, Section 24.2.2 - Stream Headers

mod blob;
mod guid;
mod strings;
mod userstrings;

pub use blob::{Blob, BlobIterator};
pub use guid::Guid;
pub use strings::Strings;
pub use userstrings::UserStrings;

use crate::{
    metadata::{
        diagnostics::{Diagnostic, DiagnosticCategory, ErrorListener},
        tables::TablesStream,
    },
    segment::DataSegment,
    Error, Result,
};

/// The well-known stream kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// `#Strings`
    Strings,
    /// `#US`
    UserStrings,
    /// `#GUID`
    Guid,
    /// `#Blob`
    Blob,
    /// `#~` or `#-`
    Tables,
    /// Any other name
    Custom,
}

impl StreamKind {
    /// The kind a stream name denotes. Names are case sensitive.
    #[must_use]
    pub fn from_name(name: &str) -> StreamKind {
        match name {
            "#Strings" => StreamKind::Strings,
            "#US" => StreamKind::UserStrings,
            "#GUID" => StreamKind::Guid,
            "#Blob" => StreamKind::Blob,
            "#~" | "#-" => StreamKind::Tables,
            _ => StreamKind::Custom,
        }
    }
}

/// A stream with a name this library does not interpret, or whose contents were invalid
#[derive(Clone, Debug)]
pub struct CustomStream {
    name: String,
    segment: DataSegment,
}

impl CustomStream {
    /// Create an opaque stream
    #[must_use]
    pub fn new(name: &str, segment: DataSegment) -> Self {
        CustomStream {
            name: name.to_string(),
            segment,
        }
    }

    /// Name of the stream
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Contents of the stream
    #[must_use]
    pub fn segment(&self) -> &DataSegment {
        &self.segment
    }
}

/// One decoded entry of the stream directory
pub enum MetadataStream {
    /// `#Strings`
    Strings(Strings),
    /// `#US`
    UserStrings(UserStrings),
    /// `#GUID`
    Guid(Guid),
    /// `#Blob`
    Blob(Blob),
    /// `#~` or `#-`
    Tables(Box<TablesStream>),
    /// Anything else
    Custom(CustomStream),
}

impl MetadataStream {
    /// Decode the contents of a stream according to its name
    ///
    /// # Arguments
    /// * 'listener'    - Receives a report if the contents do not match the kind
    /// * 'name'        - Name from the stream header
    /// * 'segment'     - Contents of the stream
    ///
    /// # Errors
    /// Only returns an error if `listener` escalates a report
    pub fn from_segment(
        listener: &dyn ErrorListener,
        name: &str,
        segment: DataSegment,
    ) -> Result<MetadataStream> {
        let kind = StreamKind::from_name(name);
        let decoded = match kind {
            StreamKind::Strings => Strings::from_segment(segment.clone()).map(MetadataStream::Strings),
            StreamKind::UserStrings => {
                UserStrings::from_segment(segment.clone()).map(MetadataStream::UserStrings)
            }
            StreamKind::Guid => Guid::from_segment(segment.clone()).map(MetadataStream::Guid),
            StreamKind::Blob => Blob::from_segment(segment.clone()).map(MetadataStream::Blob),
            StreamKind::Tables => TablesStream::from_segment(name, segment.clone())
                .map(|tables| MetadataStream::Tables(Box::new(tables))),
            StreamKind::Custom => return Ok(MetadataStream::Custom(CustomStream::new(name, segment))),
        };

        match decoded {
            Ok(stream) => Ok(stream),
            Err(Error::NotSupported(reason)) => {
                listener.not_supported(
                    Diagnostic::new(
                        DiagnosticCategory::Directory,
                        format!("Stream '{}' - {}", name, reason),
                    )
                    .with_offset(segment.offset() as u64),
                )?;
                Ok(MetadataStream::Custom(CustomStream::new(name, segment)))
            }
            Err(error) => {
                listener.bad_image(
                    Diagnostic::new(
                        DiagnosticCategory::Directory,
                        format!("Stream '{}' is invalid - {}", name, error),
                    )
                    .with_offset(segment.offset() as u64),
                )?;
                Ok(MetadataStream::Custom(CustomStream::new(name, segment)))
            }
        }
    }

    /// Name of the stream, as found in its header
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            MetadataStream::Strings(_) => "#Strings",
            MetadataStream::UserStrings(_) => "#US",
            MetadataStream::Guid(_) => "#GUID",
            MetadataStream::Blob(_) => "#Blob",
            MetadataStream::Tables(tables) => tables.name(),
            MetadataStream::Custom(custom) => custom.name(),
        }
    }

    /// The decoded kind. A well-known name with invalid contents reports
    /// [`StreamKind::Custom`].
    #[must_use]
    pub fn kind(&self) -> StreamKind {
        match self {
            MetadataStream::Strings(_) => StreamKind::Strings,
            MetadataStream::UserStrings(_) => StreamKind::UserStrings,
            MetadataStream::Guid(_) => StreamKind::Guid,
            MetadataStream::Blob(_) => StreamKind::Blob,
            MetadataStream::Tables(_) => StreamKind::Tables,
            MetadataStream::Custom(_) => StreamKind::Custom,
        }
    }

    /// Contents of the stream
    #[must_use]
    pub fn segment(&self) -> &DataSegment {
        match self {
            MetadataStream::Strings(stream) => stream.segment(),
            MetadataStream::UserStrings(stream) => stream.segment(),
            MetadataStream::Guid(stream) => stream.segment(),
            MetadataStream::Blob(stream) => stream.segment(),
            MetadataStream::Tables(stream) => stream.segment(),
            MetadataStream::Custom(stream) => stream.segment(),
        }
    }
}

impl std::fmt::Debug for MetadataStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStream")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("segment", self.segment())
            .finish()
    }
}
