//! Crafts metadata roots and PE32 images for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use cilmeta::metadata::{
    directory::METADATA_SIGNATURE,
    tables::{CodedIndexType, HeapSizes, IndexEncoder, TableId, TableInfo},
    token::Token,
};

/// RVA of the `.text` section of [`pe_image`]
pub const TEXT_RVA: u32 = 0x2000;
/// Offset of the metadata root within the `.text` section of [`pe_image`]
pub const METADATA_OFFSET: u32 = 0x50;

#[derive(Default)]
pub struct Metadata {
    strings: Vec<u8>,
    guids: Vec<u8>,
    blobs: Vec<u8>,
    rows: BTreeMap<TableId, Vec<Vec<u32>>>,
    stream_count: Option<u16>,
}

impl Metadata {
    pub fn new() -> Self {
        Metadata {
            strings: vec![0],
            blobs: vec![0],
            ..Metadata::default()
        }
    }

    pub fn string(&mut self, value: &str) -> u32 {
        let index = self.strings.len() as u32;
        self.strings.extend_from_slice(value.as_bytes());
        self.strings.push(0);
        index
    }

    pub fn blob(&mut self, value: &[u8]) -> u32 {
        assert!(value.len() < 0x80);
        let index = self.blobs.len() as u32;
        self.blobs.push(value.len() as u8);
        self.blobs.extend_from_slice(value);
        index
    }

    pub fn guid(&mut self, value: [u8; 16]) -> u32 {
        self.guids.extend_from_slice(&value);
        (self.guids.len() / 16) as u32
    }

    pub fn row(&mut self, table: TableId, values: &[u32]) -> Token {
        assert_eq!(values.len(), table.columns().len());
        let rows = self.rows.entry(table).or_default();
        rows.push(values.to_vec());
        Token::from_parts(table, rows.len() as u32)
    }

    pub fn coded(&self, kind: CodedIndexType, token: Token) -> u32 {
        IndexEncoder::new(kind, 0).encode(token)
    }

    /// Write a stream count of `count` while leaving the stream headers out
    pub fn with_stream_count(mut self, count: u16) -> Self {
        self.stream_count = Some(count);
        self
    }

    fn tables(&self) -> Vec<u8> {
        let counts = self
            .rows
            .iter()
            .map(|(table, rows)| (*table, rows.len() as u32))
            .collect::<Vec<_>>();
        let mut heap_sizes = HeapSizes::empty();
        heap_sizes.set(HeapSizes::LARGE_STRINGS, self.strings.len() > 0xFFFF);
        heap_sizes.set(HeapSizes::LARGE_GUID, self.guids.len() / 16 > 0xFFFF);
        heap_sizes.set(HeapSizes::LARGE_BLOB, self.blobs.len() > 0xFFFF);
        let info = TableInfo::new(&counts, heap_sizes);
        let valid = counts
            .iter()
            .fold(0_u64, |valid, (table, _)| valid | (1 << *table as u64));

        let mut out = vec![0, 0, 0, 0, 2, 0, heap_sizes.bits(), 1];
        out.extend_from_slice(&valid.to_le_bytes());
        out.extend_from_slice(&valid.to_le_bytes());
        for (_, count) in &counts {
            out.extend_from_slice(&count.to_le_bytes());
        }
        for (table, rows) in &self.rows {
            for row in rows {
                for (value, column) in row.iter().zip(table.columns()) {
                    match info.column_size(*column) {
                        4 => out.extend_from_slice(&value.to_le_bytes()),
                        _ => out.extend_from_slice(&(*value as u16).to_le_bytes()),
                    }
                }
            }
        }
        out
    }

    pub fn build(&self) -> Vec<u8> {
        let streams = [
            ("#~", self.tables()),
            ("#Strings", self.strings.clone()),
            ("#US", vec![0]),
            ("#GUID", self.guids.clone()),
            ("#Blob", self.blobs.clone()),
        ];
        let version = b"v4.0.30319\0\0";

        let mut out = Vec::new();
        out.extend_from_slice(&METADATA_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&[1, 0, 1, 0, 0, 0, 0, 0]);
        out.extend_from_slice(&(version.len() as u32).to_le_bytes());
        out.extend_from_slice(version);
        out.extend_from_slice(&0_u16.to_le_bytes());

        if let Some(count) = self.stream_count {
            out.extend_from_slice(&count.to_le_bytes());
            return out;
        }
        out.extend_from_slice(&(streams.len() as u16).to_le_bytes());

        let headers = streams
            .iter()
            .map(|(name, _)| 8 + align4(name.len() + 1))
            .sum::<usize>();
        let mut offset = out.len() + headers;
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
        out
    }
}

pub fn align4(value: usize) -> usize {
    (value + 3) & !3
}

/// A `.text` section holding a CLI header followed by `metadata` at [`METADATA_OFFSET`]
pub fn cil_text(metadata: &[u8]) -> Vec<u8> {
    let mut text = Vec::new();
    text.extend_from_slice(&72_u32.to_le_bytes());
    text.extend_from_slice(&2_u16.to_le_bytes());
    text.extend_from_slice(&5_u16.to_le_bytes());
    text.extend_from_slice(&(TEXT_RVA + METADATA_OFFSET).to_le_bytes());
    text.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
    text.extend_from_slice(&1_u32.to_le_bytes());
    text.resize(METADATA_OFFSET as usize, 0);
    text.extend_from_slice(metadata);
    text
}

/// A PE32 dll with a single `.text` section at [`TEXT_RVA`] whose CLR directory points at the
/// start of the section
pub fn pe_image(text: &[u8]) -> Vec<u8> {
    const TEXT_OFFSET: u32 = 0x200;
    const PE_OFFSET: usize = 0x80;

    let raw_size = (text.len() as u32).div_ceil(0x200).max(1) * 0x200;
    let mut image = vec![0u8; (TEXT_OFFSET + raw_size) as usize];
    image[0..2].copy_from_slice(b"MZ");
    image[0x3C..0x40].copy_from_slice(&(PE_OFFSET as u32).to_le_bytes());

    let mut out = b"PE\0\0".to_vec();
    out.extend_from_slice(&0x014C_u16.to_le_bytes());
    out.extend_from_slice(&1_u16.to_le_bytes());
    out.extend_from_slice(&[0; 12]);
    out.extend_from_slice(&0xE0_u16.to_le_bytes());
    out.extend_from_slice(&0x2102_u16.to_le_bytes());

    out.extend_from_slice(&0x010B_u16.to_le_bytes());
    out.extend_from_slice(&[0x30, 0x00]);
    out.extend_from_slice(&raw_size.to_le_bytes());
    out.extend_from_slice(&[0; 12]);
    out.extend_from_slice(&TEXT_RVA.to_le_bytes());
    out.extend_from_slice(&0_u32.to_le_bytes());
    out.extend_from_slice(&0x0040_0000_u32.to_le_bytes());
    out.extend_from_slice(&0x2000_u32.to_le_bytes());
    out.extend_from_slice(&0x200_u32.to_le_bytes());
    out.extend_from_slice(&[4, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0]);
    out.extend_from_slice(&0_u32.to_le_bytes());
    out.extend_from_slice(&(TEXT_RVA + raw_size.div_ceil(0x2000) * 0x2000).to_le_bytes());
    out.extend_from_slice(&TEXT_OFFSET.to_le_bytes());
    out.extend_from_slice(&0_u32.to_le_bytes());
    out.extend_from_slice(&3_u16.to_le_bytes());
    out.extend_from_slice(&0x8540_u16.to_le_bytes());
    for value in [0x0010_0000_u32, 0x1000, 0x0010_0000, 0x1000, 0, 16] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    for index in 0..16 {
        if index == 14 {
            out.extend_from_slice(&TEXT_RVA.to_le_bytes());
            out.extend_from_slice(&72_u32.to_le_bytes());
        } else {
            out.extend_from_slice(&[0; 8]);
        }
    }

    out.extend_from_slice(b".text\0\0\0");
    out.extend_from_slice(&(text.len() as u32).max(1).to_le_bytes());
    out.extend_from_slice(&TEXT_RVA.to_le_bytes());
    out.extend_from_slice(&raw_size.to_le_bytes());
    out.extend_from_slice(&TEXT_OFFSET.to_le_bytes());
    out.extend_from_slice(&[0; 12]);
    out.extend_from_slice(&0x6000_0020_u32.to_le_bytes());

    image[PE_OFFSET..PE_OFFSET + out.len()].copy_from_slice(&out);
    image[TEXT_OFFSET as usize..TEXT_OFFSET as usize + text.len()].copy_from_slice(text);
    image
}

/// A module referencing `Foo` (no namespace) in itself and `System.Object` in `mscorlib`
pub fn references() -> Metadata {
    let mut metadata = Metadata::new();

    let name = metadata.string("References.dll");
    let mvid = metadata.guid([0x42; 16]);
    metadata.row(TableId::Module, &[0, name, mvid, 0, 0]);

    let mscorlib = metadata.string("mscorlib");
    metadata.row(TableId::AssemblyRef, &[4, 0, 0, 0, 0, 0, mscorlib, 0, 0]);

    let foo = metadata.string("Foo");
    let object = metadata.string("Object");
    let system = metadata.string("System");
    let module = metadata.coded(
        CodedIndexType::ResolutionScope,
        Token::from_parts(TableId::Module, 1),
    );
    let assembly = metadata.coded(
        CodedIndexType::ResolutionScope,
        Token::from_parts(TableId::AssemblyRef, 1),
    );
    metadata.row(TableId::TypeRef, &[module, foo, 0]);
    metadata.row(TableId::TypeRef, &[assembly, object, system]);
    metadata
}
