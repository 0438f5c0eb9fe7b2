//! Reporting of structural problems found while reading metadata.
//!
//! A damaged or exotic image should not stop a reader from looking at the parts that are
//! intact. Every construct the reader cannot make sense of is therefore reported to an
//! [`ErrorListener`] through one of two channels:
//!
//! - **bad image** - the data violates the format (bad signature, truncated stream, index out
//!   of range)
//! - **not supported** - the data is well formed, but uses something this library does not
//!   handle (`+MOC` metadata, tables beyond ECMA-335, unreadable RVAs)
//!
//! The listener decides what happens next. Returning `Ok(())` makes the reader carry on with
//! the affected construct treated as absent; returning an error aborts the current operation
//! and propagates the error to the caller.
//!
//! # Key Components
//!
//! - [`ErrorListener`] - the two channel reporting interface
//! - [`Diagnostics`] - lenient listener, records every report and continues
//! - [`StrictListener`] - turns every report into an [`crate::Error`]
//! - [`Diagnostic`] / [`DiagnosticKind`] / [`DiagnosticCategory`] - one report and its context
//!
//! # Examples
//!
//! ```rust
//! use cilmeta::metadata::diagnostics::{Diagnostic, DiagnosticCategory, Diagnostics, ErrorListener};
//!
//! let diagnostics = Diagnostics::new();
//! diagnostics.bad_image(
//!     Diagnostic::new(DiagnosticCategory::Heap, "Invalid string heap index 0x7fff").with_token(0x0100_0002),
//! )?;
//!
//! assert!(diagnostics.has_bad_image());
//! for entry in diagnostics.iter() {
//!     println!("{}", entry);
//! }
//! # Ok::<(), cilmeta::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! [`Diagnostics`] uses `boxcar::Vec` internally, which provides lock-free concurrent append
//! operations, so members resolved on different threads can report into the same listener.

use std::fmt::{self, Write};

use crate::{Error, Result};

/// The channel a diagnostic was reported through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// The image violates the format
    BadImage,
    /// The image uses a construct this library does not handle
    NotSupported,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::BadImage => write!(f, "BAD IMAGE"),
            DiagnosticKind::NotSupported => write!(f, "NOT SUPPORTED"),
        }
    }
}

/// Where in the image a diagnostic originates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    /// PE headers, the CLI header and data directories
    Header,
    /// The metadata root and the stream directory
    Directory,
    /// Heap lookups (`#Strings`, `#Blob`, `#GUID`, `#US`)
    Heap,
    /// The tables stream and row lookups
    Table,
    /// Signature blobs
    Signature,
    /// Field data referenced through `FieldRVA`
    Field,
    /// Anything else
    General,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticCategory::Header => write!(f, "Header"),
            DiagnosticCategory::Directory => write!(f, "Directory"),
            DiagnosticCategory::Heap => write!(f, "Heap"),
            DiagnosticCategory::Table => write!(f, "Table"),
            DiagnosticCategory::Signature => write!(f, "Signature"),
            DiagnosticCategory::Field => write!(f, "Field"),
            DiagnosticCategory::General => write!(f, "General"),
        }
    }
}

/// A single report, with optional location context
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// The channel the report arrived on, stamped by the listener
    pub kind: DiagnosticKind,
    /// Where the report originates
    pub category: DiagnosticCategory,
    /// Human readable description
    pub message: String,
    /// File offset of the offending data, if known
    pub offset: Option<u64>,
    /// Token of the affected member, if any
    pub token: Option<u32>,
    /// Table id and row of the affected row, if any
    pub table_row: Option<(u8, u32)>,
}

impl Diagnostic {
    /// Create a report without location context
    pub fn new(category: DiagnosticCategory, message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::BadImage,
            category,
            message: message.into(),
            offset: None,
            token: None,
            table_row: None,
        }
    }

    /// Attach the file offset of the offending data
    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Attach the token of the affected member
    #[must_use]
    pub fn with_token(mut self, token: u32) -> Self {
        self.token = Some(token);
        self
    }

    /// Attach the affected table row
    #[must_use]
    pub fn with_table_row(mut self, table_id: u8, row_index: u32) -> Self {
        self.table_row = Some((table_id, row_index));
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.category, self.message)?;

        if let Some(offset) = self.offset {
            write!(f, " (offset: 0x{:08x})", offset)?;
        }

        if let Some(token) = self.token {
            write!(f, " (token: 0x{:08x})", token)?;
        }

        if let Some((table_id, row)) = self.table_row {
            write!(f, " (table: 0x{:02x}, row: {})", table_id, row)?;
        }

        Ok(())
    }
}

/// Receives the structural problems found while reading an image
///
/// Implementations must be usable from several threads at once, members of one module may be
/// resolved in parallel.
pub trait ErrorListener: Send + Sync {
    /// The image violates the format
    ///
    /// # Errors
    /// Returning an error aborts the operation that made the report
    fn bad_image(&self, diagnostic: Diagnostic) -> Result<()>;

    /// The image uses a construct that is not handled
    ///
    /// # Errors
    /// Returning an error aborts the operation that made the report
    fn not_supported(&self, diagnostic: Diagnostic) -> Result<()>;
}

/// Lenient listener: records every report, logs it, and lets parsing continue
#[derive(Debug)]
pub struct Diagnostics {
    entries: boxcar::Vec<Diagnostic>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Create an empty collection
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
        }
    }

    /// Record a report as-is
    pub fn push(&self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Returns true if anything was reported
    pub fn has_any(&self) -> bool {
        self.entries.count() > 0
    }

    /// Returns true if a bad image was reported
    pub fn has_bad_image(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, d)| d.kind == DiagnosticKind::BadImage)
    }

    /// Returns true if an unsupported construct was reported
    pub fn has_not_supported(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, d)| d.kind == DiagnosticKind::NotSupported)
    }

    /// Number of reports
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Number of reports on the bad image channel
    pub fn bad_image_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, d)| d.kind == DiagnosticKind::BadImage)
            .count()
    }

    /// Number of reports on the not supported channel
    pub fn not_supported_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, d)| d.kind == DiagnosticKind::NotSupported)
            .count()
    }

    /// Iterate all reports in the order they were made
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().map(|(_, d)| d)
    }

    /// All reports of one category
    pub fn by_category(&self, category: DiagnosticCategory) -> Vec<&Diagnostic> {
        self.entries
            .iter()
            .filter(|(_, d)| d.category == category)
            .map(|(_, d)| d)
            .collect()
    }

    /// A multi-line summary of all reports
    pub fn summary(&self) -> String {
        let mut output = String::new();

        let _ = writeln!(
            output,
            "Diagnostics: {} bad image, {} not supported",
            self.bad_image_count(),
            self.not_supported_count()
        );

        for diag in self.iter() {
            let _ = writeln!(output, "  {diag}");
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

impl ErrorListener for Diagnostics {
    fn bad_image(&self, mut diagnostic: Diagnostic) -> Result<()> {
        diagnostic.kind = DiagnosticKind::BadImage;
        tracing::warn!(category = %diagnostic.category, "bad image: {}", diagnostic.message);
        self.push(diagnostic);
        Ok(())
    }

    fn not_supported(&self, mut diagnostic: Diagnostic) -> Result<()> {
        diagnostic.kind = DiagnosticKind::NotSupported;
        tracing::warn!(category = %diagnostic.category, "not supported: {}", diagnostic.message);
        self.push(diagnostic);
        Ok(())
    }
}

/// Listener that fails on the first report
///
/// Bad images surface as [`Error::Malformed`], unsupported constructs as
/// [`Error::NotSupported`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictListener;

impl ErrorListener for StrictListener {
    fn bad_image(&self, mut diagnostic: Diagnostic) -> Result<()> {
        diagnostic.kind = DiagnosticKind::BadImage;
        Err(malformed_error!("{}", diagnostic))
    }

    fn not_supported(&self, mut diagnostic: Diagnostic) -> Result<()> {
        diagnostic.kind = DiagnosticKind::NotSupported;
        Err(Error::NotSupported(diagnostic.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_diagnostic_creation() {
        let diag = Diagnostic::new(DiagnosticCategory::Heap, "Test message");

        assert_eq!(diag.category, DiagnosticCategory::Heap);
        assert_eq!(diag.message, "Test message");
        assert!(diag.offset.is_none());
        assert!(diag.token.is_none());
        assert!(diag.table_row.is_none());
    }

    #[test]
    fn test_diagnostic_with_context() {
        let diag = Diagnostic::new(DiagnosticCategory::Table, "Bad row")
            .with_offset(0x1234)
            .with_token(0x0200_0001)
            .with_table_row(0x02, 1);

        let text = diag.to_string();
        assert!(text.contains("Table: Bad row"));
        assert!(text.contains("offset: 0x00001234"));
        assert!(text.contains("token: 0x02000001"));
        assert!(text.contains("table: 0x02, row: 1"));
    }

    #[test]
    fn test_channels_are_stamped() {
        let diagnostics = Diagnostics::new();
        diagnostics
            .not_supported(Diagnostic::new(DiagnosticCategory::Directory, "+MOC"))
            .unwrap();
        diagnostics
            .bad_image(Diagnostic::new(DiagnosticCategory::Heap, "index"))
            .unwrap();
        diagnostics
            .bad_image(Diagnostic::new(DiagnosticCategory::Heap, "index"))
            .unwrap();

        assert!(diagnostics.has_any());
        assert!(diagnostics.has_bad_image());
        assert!(diagnostics.has_not_supported());
        assert_eq!(diagnostics.count(), 3);
        assert_eq!(diagnostics.bad_image_count(), 2);
        assert_eq!(diagnostics.not_supported_count(), 1);
        assert_eq!(diagnostics.by_category(DiagnosticCategory::Heap).len(), 2);

        let first = diagnostics.iter().next().unwrap();
        assert_eq!(first.kind, DiagnosticKind::NotSupported);
        assert!(diagnostics.summary().contains("2 bad image, 1 not supported"));
    }

    #[test]
    fn test_strict_listener() {
        let strict = StrictListener;
        assert!(matches!(
            strict.bad_image(Diagnostic::new(DiagnosticCategory::Directory, "bad signature")),
            Err(Error::Malformed { message, .. }) if message.contains("bad signature")
        ));
        assert!(matches!(
            strict.not_supported(Diagnostic::new(DiagnosticCategory::Directory, "+MOC")),
            Err(Error::NotSupported(reason)) if reason.contains("+MOC")
        ));
    }

    #[test]
    fn test_concurrent_reports() {
        let diagnostics = Arc::new(Diagnostics::new());
        let mut handles = vec![];

        for i in 0..10 {
            let diag = Arc::clone(&diagnostics);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    diag.bad_image(Diagnostic::new(
                        DiagnosticCategory::General,
                        format!("Thread {} message {}", i, j),
                    ))
                    .unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(diagnostics.count(), 1000);
    }
}
