//! Static field data referenced through the `FieldRVA` table.
//!
//! A `FieldRVA` row only records where the initial value of a static field lives, not how large
//! it is. When the RVA resolves to a location of unknown extent, the size is recovered from the
//! field's signature: primitive element types have a fixed width, value types take the
//! `ClassSize` of their `ClassLayout` row.
//!
//! The lookup is a trait so that a caller who knows better (e.g. a writer that tracks segment
//! sizes) can replace it through [`crate::ReaderParameters`].

use crate::{
    metadata::{
        diagnostics::{Diagnostic, DiagnosticCategory, ErrorListener},
        directory::MetadataDirectory,
        tables::{ClassLayoutRow, CodedIndexType, FieldRow, FieldRvaRow, TableId},
    },
    segment::{DataSegment, SegmentReference},
    Error, Result,
};

/// Element type constants used in signatures (ECMA-335 II.23.1.16)
#[allow(missing_docs)]
pub mod element_type {
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const VALUETYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
}

/// Column of `ClassLayout` holding the owning `TypeDef`
const CLASS_LAYOUT_PARENT: usize = 2;

/// Resolves the initial data of a static field
pub trait FieldRvaDataReader: Send + Sync {
    /// The data referenced by `row`, `None` if there is none or it cannot be located
    ///
    /// # Arguments
    /// * 'listener'    - Receives reports about invalid or unsupported rows
    /// * 'metadata'    - The directory the row belongs to
    /// * 'row'         - The `FieldRVA` row
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report, or
    /// [`crate::Error::InvalidElementType`] if the field has a type that cannot carry RVA data
    fn resolve_field_data(
        &self,
        listener: &dyn ErrorListener,
        metadata: &MetadataDirectory,
        row: &FieldRvaRow,
    ) -> Result<Option<DataSegment>>;
}

/// Sizes field data from the field signature and `ClassLayout`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFieldRvaDataReader;

impl FieldRvaDataReader for DefaultFieldRvaDataReader {
    fn resolve_field_data(
        &self,
        listener: &dyn ErrorListener,
        metadata: &MetadataDirectory,
        row: &FieldRvaRow,
    ) -> Result<Option<DataSegment>> {
        let reader = match metadata.resolver().resolve(row.rva) {
            SegmentReference::Null => return Ok(None),
            SegmentReference::Bounded(segment) => return Ok(Some(segment)),
            SegmentReference::Readable(reader) => reader,
            SegmentReference::Unreadable(rva) => {
                listener.not_supported(
                    Diagnostic::new(
                        DiagnosticCategory::Field,
                        format!("FieldRva row has an unreadable data RVA 0x{:08X}", rva),
                    )
                    .with_token(row.token.value()),
                )?;
                return Ok(None);
            }
        };

        let Some(size) = field_size(listener, metadata, row)? else {
            return Ok(None);
        };

        match reader.fork_slice(0, size) {
            Ok(slice) => Ok(Some(slice.to_segment())),
            Err(_) => {
                listener.bad_image(
                    Diagnostic::new(
                        DiagnosticCategory::Field,
                        format!(
                            "Field data of {} bytes at RVA 0x{:08X} exceeds the image",
                            size, row.rva
                        ),
                    )
                    .with_token(row.token.value()),
                )?;
                Ok(None)
            }
        }
    }
}

fn bad_row(
    listener: &dyn ErrorListener,
    row: &FieldRvaRow,
    message: String,
) -> Result<Option<usize>> {
    listener.bad_image(
        Diagnostic::new(DiagnosticCategory::Field, message)
            .with_token(row.token.value())
            .with_table_row(TableId::FieldRVA as u8, row.rid),
    )?;
    Ok(None)
}

fn field_size(
    listener: &dyn ErrorListener,
    metadata: &MetadataDirectory,
    row: &FieldRvaRow,
) -> Result<Option<usize>> {
    let Some(tables) = metadata.tables()? else {
        return bad_row(listener, row, "FieldRva row without a tables stream".to_string());
    };

    let fields = tables.table::<FieldRow>();
    if row.field == 0 || row.field > fields.row_count() {
        return bad_row(
            listener,
            row,
            format!(
                "FieldRva row has an invalid Field column value - {} of {}",
                row.field,
                fields.row_count()
            ),
        );
    }

    let Some(field) = fields.get(row.field) else {
        return bad_row(listener, row, format!("Field row {} is unreadable", row.field));
    };

    let Some(blob) = metadata.blob()? else {
        return bad_row(listener, row, "FieldRva row without a #Blob heap".to_string());
    };

    let mut signature = match blob.reader(field.signature) {
        Ok(signature) => signature,
        Err(error) => {
            return bad_row(
                listener,
                row,
                format!("Signature of field {} is invalid - {}", field.token, error),
            )
        }
    };

    let element = match signature
        .read_le::<u8>()
        .and_then(|_calling_convention| signature.read_le::<u8>())
    {
        Ok(element) => element,
        Err(_) => {
            return bad_row(
                listener,
                row,
                format!("Signature of field {} is truncated", field.token),
            )
        }
    };

    let size = match element {
        element_type::BOOLEAN | element_type::I1 | element_type::U1 => 1,
        element_type::CHAR | element_type::I2 | element_type::U2 => 2,
        element_type::I4 | element_type::U4 | element_type::R4 => 4,
        element_type::I8 | element_type::U8 | element_type::R8 => 8,
        element_type::VALUETYPE | element_type::CLASS => {
            let Some(coded_index) = signature.try_read_compressed_uint() else {
                return Ok(Some(0));
            };

            let token = tables
                .info()
                .encoder(CodedIndexType::TypeDefOrRef)
                .decode(coded_index);

            if token.table_id() == Some(TableId::TypeDef) {
                tables
                    .table::<ClassLayoutRow>()
                    .find_by_key(CLASS_LAYOUT_PARENT, token.row())
                    .map_or(0, |layout| layout.class_size as usize)
            } else {
                0
            }
        }
        other => return Err(Error::InvalidElementType(other)),
    };

    Ok(Some(size))
}
