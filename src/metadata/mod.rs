//! CLI metadata: the CLR header, the metadata root and its streams, tables and members.
//!
//! Reading is layered. [`cor20header::Cor20Header`] locates the metadata root, the
//! [`directory::MetadataDirectory`] decodes the root and, on first access, its stream list, and
//! [`members::ModuleReader`] hands out lazily resolved wrappers for table rows.

/// The CLR runtime header
pub mod cor20header;
/// Error listeners and recorded diagnostics
pub mod diagnostics;
/// The `BSJB` metadata root and its stream list
pub mod directory;
/// Initial data of static fields
pub mod fieldrva;
/// Lazily resolved member wrappers
pub mod members;
/// Metadata heaps and the tables stream
pub mod streams;
/// Table schemas, rows and coded indices
pub mod tables;
/// Metadata tokens
pub mod token;
/// Native entry point fixups
pub mod vtablefixup;
