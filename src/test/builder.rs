//! Builds complete metadata blobs (root, stream directory, heaps and tables) for tests.

use std::collections::BTreeMap;

use crate::metadata::{
    directory::METADATA_SIGNATURE,
    tables::{CodedIndexType, HeapSizes, IndexEncoder, TableId, TableInfo},
    token::Token,
};

/// RVA of the field data written by [`field_metadata`], with a flat layout at base 0
pub const FIELD_DATA_RVA: u32 = 0x400;

/// Accumulates heap entries and table rows, then lays them out as a `BSJB` metadata root
pub struct MetadataBuilder {
    strings: Vec<u8>,
    user_strings: Vec<u8>,
    guids: Vec<u8>,
    blobs: Vec<u8>,
    rows: BTreeMap<TableId, Vec<Vec<u32>>>,
    extra: Vec<(String, Vec<u8>)>,
    trailer: Option<(usize, Vec<u8>)>,
}

impl Default for MetadataBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataBuilder {
    pub fn new() -> Self {
        MetadataBuilder {
            strings: vec![0],
            user_strings: vec![0],
            guids: Vec::new(),
            blobs: vec![0],
            rows: BTreeMap::new(),
            extra: Vec::new(),
            trailer: None,
        }
    }

    /// Append to `#Strings`, returns the heap index
    pub fn string(&mut self, value: &str) -> u32 {
        let index = self.strings.len() as u32;
        self.strings.extend_from_slice(value.as_bytes());
        self.strings.push(0);
        index
    }

    /// Append to `#Blob`, returns the heap index
    pub fn blob(&mut self, value: &[u8]) -> u32 {
        let index = self.blobs.len() as u32;
        self.blobs.extend_from_slice(&compressed(value.len() as u32));
        self.blobs.extend_from_slice(value);
        index
    }

    /// Append to `#GUID`, returns the 1-based index
    pub fn guid(&mut self, value: [u8; 16]) -> u32 {
        self.guids.extend_from_slice(&value);
        (self.guids.len() / 16) as u32
    }

    /// Append to `#US`, returns the heap index
    pub fn user_string(&mut self, value: &str) -> u32 {
        let index = self.user_strings.len() as u32;
        let units = value.encode_utf16().collect::<Vec<_>>();
        self.user_strings
            .extend_from_slice(&compressed(units.len() as u32 * 2 + 1));
        for unit in units {
            self.user_strings.extend_from_slice(&unit.to_le_bytes());
        }
        self.user_strings.push(0);
        index
    }

    /// Append a row to `table`, returns its token. Values are given in schema order.
    pub fn row(&mut self, table: TableId, values: &[u32]) -> Token {
        assert_eq!(values.len(), table.columns().len(), "{:?} column count", table);
        let rows = self.rows.entry(table).or_default();
        rows.push(values.to_vec());
        Token::from_parts(table, rows.len() as u32)
    }

    /// Append another stream after the standard ones
    pub fn extra_stream(&mut self, name: &str, data: Vec<u8>) {
        self.extra.push((name.to_string(), data));
    }

    /// Place `data` at `offset` from the metadata root, after all streams
    pub fn data_at(&mut self, offset: usize, data: Vec<u8>) {
        self.trailer = Some((offset, data));
    }

    /// A coded index value of `kind` for `token`
    pub fn coded(&self, kind: CodedIndexType, token: Token) -> u32 {
        IndexEncoder::new(kind, 0).encode(token)
    }

    fn tables_stream(&self) -> Vec<u8> {
        let counts = self
            .rows
            .iter()
            .map(|(table, rows)| (*table, rows.len() as u32))
            .collect::<Vec<_>>();
        let info = TableInfo::new(&counts, HeapSizes::empty());
        let valid = counts
            .iter()
            .fold(0_u64, |valid, (table, _)| valid | (1 << *table as u64));

        let mut out = Vec::new();
        out.extend_from_slice(&0_u32.to_le_bytes());
        out.extend_from_slice(&[2, 0, HeapSizes::empty().bits(), 1]);
        out.extend_from_slice(&valid.to_le_bytes());
        out.extend_from_slice(&valid.to_le_bytes());
        for (_, count) in &counts {
            out.extend_from_slice(&count.to_le_bytes());
        }

        for (table, rows) in &self.rows {
            for row in rows {
                for (value, column) in row.iter().zip(table.columns()) {
                    if info.column_size(*column) == 4 {
                        out.extend_from_slice(&value.to_le_bytes());
                    } else {
                        out.extend_from_slice(&(*value as u16).to_le_bytes());
                    }
                }
            }
        }

        out
    }

    pub fn build(&self) -> Vec<u8> {
        let mut streams = vec![
            ("#~".to_string(), self.tables_stream()),
            ("#Strings".to_string(), self.strings.clone()),
            ("#US".to_string(), self.user_strings.clone()),
            ("#GUID".to_string(), self.guids.clone()),
            ("#Blob".to_string(), self.blobs.clone()),
        ];
        streams.extend(self.extra.iter().cloned());

        let version = b"v4.0.30319\0\0";
        let headers_size = streams
            .iter()
            .map(|(name, _)| 8 + align4(name.len() + 1))
            .sum::<usize>();

        let mut out = Vec::new();
        out.extend_from_slice(&METADATA_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&1_u16.to_le_bytes());
        out.extend_from_slice(&1_u16.to_le_bytes());
        out.extend_from_slice(&0_u32.to_le_bytes());
        out.extend_from_slice(&(version.len() as u32).to_le_bytes());
        out.extend_from_slice(version);
        out.extend_from_slice(&0_u16.to_le_bytes());
        out.extend_from_slice(&(streams.len() as u16).to_le_bytes());

        let mut offset = out.len() + headers_size;
        for (name, data) in &streams {
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.resize(out.len() + align4(name.len() + 1) - name.len(), 0);
            offset += align4(data.len());
        }

        for (_, data) in &streams {
            out.extend_from_slice(data);
            out.resize(align4(out.len()), 0);
        }

        if let Some((offset, data)) = &self.trailer {
            assert!(*offset >= out.len(), "trailer overlaps the streams");
            out.resize(*offset, 0);
            out.extend_from_slice(data);
        }

        out
    }
}

fn align4(value: usize) -> usize {
    (value + 3) & !3
}

fn compressed(value: u32) -> Vec<u8> {
    if value < 0x80 {
        vec![value as u8]
    } else if value < 0x4000 {
        (0x8000 | value as u16).to_be_bytes().to_vec()
    } else {
        (0xC000_0000 | value).to_be_bytes().to_vec()
    }
}

/// A module declaring `Holder` with one static field `Value` whose data lives at
/// [`FIELD_DATA_RVA`]. The data is `11 22 33 44` followed by 28 bytes of `0x55`.
///
/// # Arguments
/// * 'signature'   - Blob of the field signature
/// * 'class_size'  - Adds a `ClassLayout` row for `Holder` when set
pub fn field_metadata(signature: &[u8], class_size: Option<u32>) -> Vec<u8> {
    let mut builder = MetadataBuilder::new();

    let module_name = builder.string("Test.dll");
    let mvid = builder.guid([0x11; 16]);
    builder.row(TableId::Module, &[0, module_name, mvid, 0, 0]);

    let object = builder.string("Object");
    let system = builder.string("System");
    let scope = builder.coded(
        CodedIndexType::ResolutionScope,
        Token::from_parts(TableId::Module, 1),
    );
    builder.row(TableId::TypeRef, &[scope, object, system]);

    let holder = builder.string("Holder");
    builder.row(TableId::TypeDef, &[0x0010_0100, holder, 0, 0, 1, 1]);

    let value = builder.string("Value");
    let signature = builder.blob(signature);
    builder.row(TableId::Field, &[0x0110, value, signature]);

    if let Some(class_size) = class_size {
        builder.row(TableId::ClassLayout, &[0, class_size, 1]);
    }

    builder.row(TableId::FieldRVA, &[FIELD_DATA_RVA, 1]);

    let mut data = vec![0x11, 0x22, 0x33, 0x44];
    data.resize(32, 0x55);
    builder.data_at(FIELD_DATA_RVA as usize, data);

    builder.build()
}
