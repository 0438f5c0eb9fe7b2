// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![warn(missing_docs)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # cilmeta
//!
//! A lazy, fault-tolerant reader for the CLI metadata embedded in .NET PE executables
//! (ECMA-335 Partition II). Nothing is materialised up front: the metadata root is decoded
//! once, the stream directory is decoded on first access, table rows are decoded when they
//! are asked for, and member wrappers resolve their names and references only when observed.
//!
//! ## Layers
//!
//! - [`file`] - PE loading through `goblin`, the [`file::Backend`] trait and the forkable
//!   [`file::reader::BinaryReader`] cursor
//! - [`segment`] - [`segment::DataSegment`] views and the [`segment::SegmentReference`] shapes an
//!   RVA can resolve to
//! - [`metadata::directory`] - the `BSJB` metadata root and its lazily decoded stream list
//! - [`metadata::streams`] - `#Strings`, `#US`, `#GUID`, `#Blob`
//! - [`metadata::tables`] - `#~` / `#-`, schema driven rows and coded indices
//! - [`metadata::members`] - token keyed, lazily resolved member wrappers
//! - [`metadata::fieldrva`] - static field data recovery from `FieldRVA` rows
//! - [`metadata::diagnostics`] - the two channel [`metadata::diagnostics::ErrorListener`]
//! - [`debug`] - debug directory records and their payloads
//!
//! ## Error handling
//!
//! Structural problems in an image are reported to an [`metadata::diagnostics::ErrorListener`]
//! rather than raised. The default [`metadata::diagnostics::Diagnostics`] listener records the
//! report and parsing carries on with the affected construct absent; the
//! [`metadata::diagnostics::StrictListener`] turns every report into an [`Error`].
//!
//! ```rust,no_run
//! use cilmeta::CilImage;
//! use std::path::Path;
//!
//! let image = CilImage::from_file(Path::new("tests/samples/crafted.dll"))?;
//! for reference in image.module().type_references() {
//!     println!("{:?}.{:?}", reference.namespace()?, reference.name()?);
//! }
//! # Ok::<(), cilmeta::Error>(())
//! ```

#[macro_use]
pub(crate) mod error;

pub mod debug;
pub mod file;
pub mod image;
pub mod metadata;
pub mod segment;

#[cfg(test)]
pub(crate) mod test;

/// `cilmeta` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

pub use error::Error;
pub use file::{reader::BinaryReader, File};
pub use image::CilImage;
pub use metadata::{
    diagnostics::{Diagnostic, DiagnosticCategory, Diagnostics, ErrorListener, StrictListener},
    directory::MetadataDirectory,
    members::{Member, ModuleReader, ReaderParameters},
    token::Token,
};
pub use segment::{DataSegment, SegmentReference};
