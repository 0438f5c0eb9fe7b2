use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Most structural problems of an image never surface here: they are reported to the
/// [`crate::metadata::diagnostics::ErrorListener`] of the current read, which decides whether
/// parsing continues. The variants below are what a listener escalates to, plus the conditions
/// that are hard failures regardless of the listener.
///
/// # Examples
///
/// ```rust,no_run
/// use cilmeta::{CilImage, Error};
/// use std::path::Path;
///
/// match CilImage::from_file(Path::new("assembly.dll")) {
///     Ok(_) => println!("loaded"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed file: {} ({}:{})", message, file, line);
///     }
///     Err(Error::NotSupported(reason)) => eprintln!("Unsupported: {}", reason),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// Carries the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The construct is valid, but this library does not handle it.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// A static field signature carried an element type that cannot describe field storage.
    ///
    /// This is never routed through a listener: the format only permits primitive, value type
    /// and class element types for data backed by a `FieldRVA` row.
    #[error("Invalid element type for field data - 0x{0:02x}")]
    InvalidElementType(u8),

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),
}
