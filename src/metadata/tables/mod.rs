//! The tables stream (`#~` and `#-`).
//!
//! The tables stream starts with a header listing which tables are present and how many rows
//! each has, followed by the rows of every present table back to back, in table id order.
//! Nothing in the stream is self-delimiting: the offset of a table depends on the row sizes of
//! every table before it, and a row size depends on heap sizes and on the row counts of other
//! tables. [`TablesStream::from_segment`] resolves all of that once, then rows are decoded on
//! demand.
//!
//! # Key Components
//! - [`TablesStream`] - header, layout and raw row access
//! - [`MetadataTable`] - typed, 1-based access to one table plus keyed binary search
//! - [`RowDefinition`] - conversion from a schema-decoded [`RawRow`] to a typed row
//! - [`TableInfo`] / [`IndexEncoder`] - column widths and coded index handling
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilmeta::metadata::tables::{TablesStream, TypeRefRow};
//!
//! fn dump(tables: &TablesStream) {
//!     for row in tables.table::<TypeRefRow>().iter() {
//!         println!("{} scope {}", row.token, row.resolution_scope);
//!     }
//! }
//! ```

mod codedindex;
mod rows;
mod tableid;
mod tableinfo;

pub use codedindex::{CodedIndexType, IndexEncoder};
pub use rows::{
    AssemblyRefRow, ClassLayoutRow, FieldRow, FieldRvaRow, ModuleRefRow, ModuleRow, TypeDefRow,
    TypeRefRow,
};
pub use tableid::{ColumnType, TableId};
pub use tableinfo::{HeapSizes, TableInfo, TableRowInfo};

use std::marker::PhantomData;

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::read_le_at_dyn, metadata::token::Token, segment::DataSegment, Error, Result,
};

/// Largest number of columns of any table
pub const MAX_COLUMNS: usize = 9;

/// Conversion from a decoded row into a typed row of one table
pub trait RowDefinition: Sized + 'static {
    /// The table this row type belongs to
    const TABLE: TableId;

    /// Build the typed row
    ///
    /// # Arguments
    /// * 'row'     - The schema-decoded columns
    /// * 'info'    - Layout of the owning stream, used to decode coded indices
    fn from_raw(row: &RawRow, info: &TableInfo) -> Self;
}

/// A row decoded according to its table schema, with every column widened to `u32`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawRow {
    table: TableId,
    rid: u32,
    offset: usize,
    columns: [u32; MAX_COLUMNS],
    count: usize,
}

impl RawRow {
    /// The owning table
    #[must_use]
    pub fn table(&self) -> TableId {
        self.table
    }

    /// The 1-based row id
    #[must_use]
    pub fn rid(&self) -> u32 {
        self.rid
    }

    /// The token of this row
    #[must_use]
    pub fn token(&self) -> Token {
        Token::from_parts(self.table, self.rid)
    }

    /// Offset of the row within the tables stream
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The value of column `index`, 0 if there is no such column
    #[must_use]
    pub fn column(&self, index: usize) -> u32 {
        if index < self.count {
            self.columns[index]
        } else {
            0
        }
    }

    /// All column values
    #[must_use]
    pub fn columns(&self) -> &[u32] {
        &self.columns[..self.count]
    }
}

#[derive(Clone, Copy, Debug)]
struct TableLayout {
    offset: usize,
    row_size: usize,
    rows: u32,
}

/// A decoded `#~` or `#-` stream
pub struct TablesStream {
    name: String,
    segment: DataSegment,
    major_version: u8,
    minor_version: u8,
    valid: u64,
    sorted: u64,
    extra_data: Option<u32>,
    info: TableInfo,
    layouts: Vec<Option<TableLayout>>,
}

impl TablesStream {
    /// Decode the header of a tables stream and compute the location of every table
    ///
    /// # Arguments
    /// * 'name'    - Name of the stream, `#~` or `#-`
    /// * 'segment' - Contents of the stream
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the stream contains tables that are not
    /// defined by ECMA-335, and [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`]
    /// if the header or the table data is truncated
    pub fn from_segment(name: &str, segment: DataSegment) -> Result<TablesStream> {
        let mut reader = segment.reader();

        let _reserved = reader.read_le::<u32>()?;
        let major_version = reader.read_le::<u8>()?;
        let minor_version = reader.read_le::<u8>()?;
        let heap_sizes = HeapSizes::from_bits_retain(reader.read_le::<u8>()?);
        let _reserved = reader.read_le::<u8>()?;
        let valid = reader.read_le::<u64>()?;
        let sorted = reader.read_le::<u64>()?;

        if valid >> TableId::COUNT != 0 {
            return Err(Error::NotSupported(format!(
                "Tables stream declares unknown tables - valid: 0x{:016X}",
                valid
            )));
        }

        let mut row_counts = Vec::new();
        for table in TableId::iter() {
            if valid & (1 << table as u64) != 0 {
                row_counts.push((table, reader.read_le::<u32>()?));
            }
        }

        let extra_data = if heap_sizes.contains(HeapSizes::EXTRA_DATA) {
            Some(reader.read_le::<u32>()?)
        } else {
            None
        };

        let info = TableInfo::new(&row_counts, heap_sizes);

        let mut layouts = vec![None; TableId::COUNT];
        let mut offset = reader.pos();
        for (table, rows) in row_counts {
            let row_size = info.row_size(table);
            let Some(end) = (rows as usize)
                .checked_mul(row_size)
                .and_then(|size| size.checked_add(offset))
            else {
                return Err(malformed_error!("Table {:?} size overflows", table));
            };

            if end > segment.len() {
                return Err(malformed_error!(
                    "Table {:?} with {} rows exceeds the tables stream - {} > {}",
                    table,
                    rows,
                    end,
                    segment.len()
                ));
            }

            layouts[table as usize] = Some(TableLayout {
                offset,
                row_size,
                rows,
            });
            offset = end;
        }

        Ok(TablesStream {
            name: name.to_string(),
            segment,
            major_version,
            minor_version,
            valid,
            sorted,
            extra_data,
            info,
            layouts,
        })
    }

    /// Name of the stream
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true for the optimized `#~` layout
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.name == "#~"
    }

    /// Contents of the stream
    #[must_use]
    pub fn segment(&self) -> &DataSegment {
        &self.segment
    }

    /// Major schema version
    #[must_use]
    pub fn major_version(&self) -> u8 {
        self.major_version
    }

    /// Minor schema version
    #[must_use]
    pub fn minor_version(&self) -> u8 {
        self.minor_version
    }

    /// Bit vector of present tables
    #[must_use]
    pub fn valid(&self) -> u64 {
        self.valid
    }

    /// Bit vector of tables declared sorted
    #[must_use]
    pub fn sorted(&self) -> u64 {
        self.sorted
    }

    /// Returns true if `table` is declared sorted
    #[must_use]
    pub fn is_sorted(&self, table: TableId) -> bool {
        self.sorted & (1 << table as u64) != 0
    }

    /// The extra 4 byte value that follows the row counts, if present
    #[must_use]
    pub fn extra_data(&self) -> Option<u32> {
        self.extra_data
    }

    /// Column widths of this stream
    #[must_use]
    pub fn info(&self) -> &TableInfo {
        &self.info
    }

    /// Number of rows of `table`
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.layouts[table as usize].map_or(0, |layout| layout.rows)
    }

    /// Decode row `rid` of `table` according to its schema
    #[must_use]
    pub fn raw_row(&self, table: TableId, rid: u32) -> Option<RawRow> {
        let layout = self.layouts[table as usize]?;
        if rid == 0 || rid > layout.rows {
            return None;
        }

        let data = self.segment.data();
        let row_offset = layout.offset + (rid as usize - 1) * layout.row_size;
        let mut offset = row_offset;
        let mut columns = [0u32; MAX_COLUMNS];
        let schema = table.columns();
        for (slot, column) in columns.iter_mut().zip(schema) {
            let is_large = self.info.column_size(*column) == 4;
            *slot = read_le_at_dyn(data, &mut offset, is_large).ok()?;
        }

        Some(RawRow {
            table,
            rid,
            offset: row_offset,
            columns,
            count: schema.len(),
        })
    }

    /// Typed access to the table of `T`
    #[must_use]
    pub fn table<T: RowDefinition>(&self) -> MetadataTable<'_, T> {
        MetadataTable {
            stream: self,
            _marker: PhantomData,
        }
    }
}

/// Typed view of one table
pub struct MetadataTable<'a, T> {
    stream: &'a TablesStream,
    _marker: PhantomData<T>,
}

impl<'a, T: RowDefinition> MetadataTable<'a, T> {
    /// Number of rows
    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.stream.row_count(T::TABLE)
    }

    /// Returns true if the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Width of one row in bytes
    #[must_use]
    pub fn row_size(&self) -> usize {
        self.stream.info.row_size(T::TABLE)
    }

    /// The row with 1-based id `rid`
    #[must_use]
    pub fn get(&self, rid: u32) -> Option<T> {
        self.stream
            .raw_row(T::TABLE, rid)
            .map(|row| T::from_raw(&row, &self.stream.info))
    }

    /// Iterate all rows in order
    pub fn iter(&self) -> impl Iterator<Item = T> + 'a {
        let stream = self.stream;
        (1..=stream.row_count(T::TABLE)).filter_map(move |rid| {
            stream
                .raw_row(T::TABLE, rid)
                .map(|row| T::from_raw(&row, &stream.info))
        })
    }

    /// Binary search for the row whose `column` equals `key`, returning its row id
    ///
    /// The table must be sorted ascending by `column`. On an unsorted table the search may
    /// miss a matching row, but never returns a row that does not match.
    #[must_use]
    pub fn find_rid_by_key(&self, column: usize, key: u32) -> Option<u32> {
        let mut low = 1_u32;
        let mut high = self.row_count();

        while low <= high {
            let mid = low + (high - low) / 2;
            let value = self.stream.raw_row(T::TABLE, mid)?.column(column);
            match value.cmp(&key) {
                std::cmp::Ordering::Equal => return Some(mid),
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid - 1,
            }
        }

        None
    }

    /// Binary search for the row whose `column` equals `key`
    #[must_use]
    pub fn find_by_key(&self, column: usize, key: u32) -> Option<T> {
        self.find_rid_by_key(column, key)
            .and_then(|rid| self.get(rid))
    }
}
