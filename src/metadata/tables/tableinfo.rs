//! Column widths of one tables stream.
//!
//! Which index columns are 2 and which are 4 bytes wide is decided once per tables stream,
//! from the `HeapSizes` flags and the row counts in its header. [`TableInfo`] captures that
//! decision so every row of every table is decoded with the same layout.

use bitflags::bitflags;
use strum::{EnumCount, IntoEnumIterator};

use crate::metadata::tables::{CodedIndexType, ColumnType, IndexEncoder, TableId};

bitflags! {
    /// The `HeapSizes` byte of the tables stream header
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct HeapSizes: u8 {
        /// `#Strings` indices are 4 bytes wide
        const LARGE_STRINGS = 0x01;
        /// `#GUID` indices are 4 bytes wide
        const LARGE_GUID = 0x02;
        /// `#Blob` indices are 4 bytes wide
        const LARGE_BLOB = 0x04;
        /// Stream was written with padding
        const PADDING = 0x08;
        /// Stream only contains edit-and-continue deltas
        const DELTA_ONLY = 0x20;
        /// A 4 byte value follows the row counts
        const EXTRA_DATA = 0x40;
        /// Stream may contain deleted rows
        const HAS_DELETE = 0x80;
    }
}

/// Row count and index width of one table
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct TableRowInfo {
    /// Number of rows
    pub rows: u32,
    /// Returns true if indices into this table are 4 bytes wide
    pub is_large: bool,
}

impl TableRowInfo {
    /// Create the info for a table with `rows` rows
    #[must_use]
    pub fn new(rows: u32) -> Self {
        Self {
            rows,
            is_large: rows > u32::from(u16::MAX),
        }
    }
}

/// Row counts and column widths of a tables stream
#[derive(Clone, Debug)]
pub struct TableInfo {
    rows: Vec<TableRowInfo>,
    encoders: Vec<IndexEncoder>,
    heap_sizes: HeapSizes,
}

impl TableInfo {
    /// Build the layout for the given row counts and heap size flags
    ///
    /// # Arguments
    /// * 'row_counts'  - `(table, rows)` for every present table
    /// * 'heap_sizes'  - The `HeapSizes` flags of the stream header
    #[must_use]
    pub fn new(row_counts: &[(TableId, u32)], heap_sizes: HeapSizes) -> Self {
        let mut rows = vec![TableRowInfo::default(); TableId::COUNT];
        for (table, count) in row_counts {
            rows[*table as usize] = TableRowInfo::new(*count);
        }

        let encoders = CodedIndexType::iter()
            .map(|kind| {
                let max_rows = kind
                    .tables()
                    .iter()
                    .flatten()
                    .map(|table| rows[*table as usize].rows)
                    .max()
                    .unwrap_or(0);
                IndexEncoder::new(kind, max_rows)
            })
            .collect::<Vec<_>>();
        debug_assert_eq!(encoders.len(), CodedIndexType::COUNT);

        TableInfo {
            rows,
            encoders,
            heap_sizes,
        }
    }

    /// The `HeapSizes` flags
    #[must_use]
    pub fn heap_sizes(&self) -> HeapSizes {
        self.heap_sizes
    }

    /// Row info of `table`
    #[must_use]
    pub fn get(&self, table: TableId) -> &TableRowInfo {
        &self.rows[table as usize]
    }

    /// Number of rows in `table`
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize].rows
    }

    /// The encoder of a coded index kind
    #[must_use]
    pub fn encoder(&self, kind: CodedIndexType) -> &IndexEncoder {
        &self.encoders[kind as usize]
    }

    /// Width of a `#Strings` index
    #[must_use]
    pub fn str_bytes(&self) -> usize {
        Self::heap_index_size(self.heap_sizes.contains(HeapSizes::LARGE_STRINGS))
    }

    /// Width of a `#GUID` index
    #[must_use]
    pub fn guid_bytes(&self) -> usize {
        Self::heap_index_size(self.heap_sizes.contains(HeapSizes::LARGE_GUID))
    }

    /// Width of a `#Blob` index
    #[must_use]
    pub fn blob_bytes(&self) -> usize {
        Self::heap_index_size(self.heap_sizes.contains(HeapSizes::LARGE_BLOB))
    }

    /// Width of a simple index into `table`
    #[must_use]
    pub fn table_index_bytes(&self, table: TableId) -> usize {
        Self::heap_index_size(self.rows[table as usize].is_large)
    }

    /// Width of a coded index column
    #[must_use]
    pub fn coded_index_bytes(&self, kind: CodedIndexType) -> usize {
        self.encoder(kind).size()
    }

    /// Width of a column
    #[must_use]
    pub fn column_size(&self, column: ColumnType) -> usize {
        match column {
            ColumnType::U16 => 2,
            ColumnType::U32 => 4,
            ColumnType::Strings => self.str_bytes(),
            ColumnType::Guid => self.guid_bytes(),
            ColumnType::Blob => self.blob_bytes(),
            ColumnType::Table(table) => self.table_index_bytes(table),
            ColumnType::Coded(kind) => self.coded_index_bytes(kind),
        }
    }

    /// Width of one row of `table`
    #[must_use]
    pub fn row_size(&self, table: TableId) -> usize {
        table
            .columns()
            .iter()
            .map(|column| self.column_size(*column))
            .sum()
    }

    fn heap_index_size(is_large: bool) -> usize {
        if is_large {
            4
        } else {
            2
        }
    }
}
