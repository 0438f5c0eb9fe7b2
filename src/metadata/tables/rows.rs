//! Typed rows of the tables the member layer reads.
//!
//! Heap indices stay raw (`u32` offsets into their heap); coded indices are decoded into
//! [`Token`]s at construction, and simple table indices stay raw row ids.

use crate::metadata::{
    tables::{CodedIndexType, RawRow, RowDefinition, TableId, TableInfo},
    token::Token,
};

/// A row of the `Module` table, `TableId` = 0x00
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Offset of the row in the tables stream
    pub offset: usize,
    /// Reserved, shall be zero
    pub generation: u32,
    /// `#Strings` index of the module name
    pub name: u32,
    /// `#GUID` index of the module version id
    pub mvid: u32,
    /// `#GUID` index, reserved for edit-and-continue
    pub encid: u32,
    /// `#GUID` index, reserved for edit-and-continue
    pub encbaseid: u32,
}

impl RowDefinition for ModuleRow {
    const TABLE: TableId = TableId::Module;

    fn from_raw(row: &RawRow, _info: &TableInfo) -> Self {
        ModuleRow {
            rid: row.rid(),
            token: row.token(),
            offset: row.offset(),
            generation: row.column(0),
            name: row.column(1),
            mvid: row.column(2),
            encid: row.column(3),
            encbaseid: row.column(4),
        }
    }
}

/// A row of the `TypeRef` table, `TableId` = 0x01
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeRefRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Offset of the row in the tables stream
    pub offset: usize,
    /// The `ResolutionScope` the type is defined in, null for exported types
    pub resolution_scope: Token,
    /// `#Strings` index of the type name
    pub type_name: u32,
    /// `#Strings` index of the namespace
    pub type_namespace: u32,
}

impl RowDefinition for TypeRefRow {
    const TABLE: TableId = TableId::TypeRef;

    fn from_raw(row: &RawRow, info: &TableInfo) -> Self {
        TypeRefRow {
            rid: row.rid(),
            token: row.token(),
            offset: row.offset(),
            resolution_scope: info
                .encoder(CodedIndexType::ResolutionScope)
                .decode(row.column(0)),
            type_name: row.column(1),
            type_namespace: row.column(2),
        }
    }
}

/// A row of the `TypeDef` table, `TableId` = 0x02
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeDefRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Offset of the row in the tables stream
    pub offset: usize,
    /// `TypeAttributes` bitmask
    pub flags: u32,
    /// `#Strings` index of the type name
    pub type_name: u32,
    /// `#Strings` index of the namespace
    pub type_namespace: u32,
    /// The base type, a `TypeDefOrRef` coded index
    pub extends: Token,
    /// First row of the `Field` table owned by this type
    pub field_list: u32,
    /// First row of the `MethodDef` table owned by this type
    pub method_list: u32,
}

impl RowDefinition for TypeDefRow {
    const TABLE: TableId = TableId::TypeDef;

    fn from_raw(row: &RawRow, info: &TableInfo) -> Self {
        TypeDefRow {
            rid: row.rid(),
            token: row.token(),
            offset: row.offset(),
            flags: row.column(0),
            type_name: row.column(1),
            type_namespace: row.column(2),
            extends: info
                .encoder(CodedIndexType::TypeDefOrRef)
                .decode(row.column(3)),
            field_list: row.column(4),
            method_list: row.column(5),
        }
    }
}

/// A row of the `Field` table, `TableId` = 0x04
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Offset of the row in the tables stream
    pub offset: usize,
    /// `FieldAttributes` bitmask
    pub flags: u32,
    /// `#Strings` index of the field name
    pub name: u32,
    /// `#Blob` index of the field signature
    pub signature: u32,
}

impl RowDefinition for FieldRow {
    const TABLE: TableId = TableId::Field;

    fn from_raw(row: &RawRow, _info: &TableInfo) -> Self {
        FieldRow {
            rid: row.rid(),
            token: row.token(),
            offset: row.offset(),
            flags: row.column(0),
            name: row.column(1),
            signature: row.column(2),
        }
    }
}

/// A row of the `ClassLayout` table, `TableId` = 0x0F
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassLayoutRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Offset of the row in the tables stream
    pub offset: usize,
    /// Field alignment, a power of two up to 128
    pub packing_size: u16,
    /// Size of the type in bytes
    pub class_size: u32,
    /// Row of the `TypeDef` table this layout applies to
    pub parent: u32,
}

impl RowDefinition for ClassLayoutRow {
    const TABLE: TableId = TableId::ClassLayout;

    fn from_raw(row: &RawRow, _info: &TableInfo) -> Self {
        ClassLayoutRow {
            rid: row.rid(),
            token: row.token(),
            offset: row.offset(),
            packing_size: u16::try_from(row.column(0)).unwrap_or_default(),
            class_size: row.column(1),
            parent: row.column(2),
        }
    }
}

/// A row of the `FieldRVA` table, `TableId` = 0x1D
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldRvaRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Offset of the row in the tables stream
    pub offset: usize,
    /// RVA of the initial field data
    pub rva: u32,
    /// Row of the `Field` table the data belongs to
    pub field: u32,
}

impl RowDefinition for FieldRvaRow {
    const TABLE: TableId = TableId::FieldRVA;

    fn from_raw(row: &RawRow, _info: &TableInfo) -> Self {
        FieldRvaRow {
            rid: row.rid(),
            token: row.token(),
            offset: row.offset(),
            rva: row.column(0),
            field: row.column(1),
        }
    }
}

/// A row of the `ModuleRef` table, `TableId` = 0x1A
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleRefRow {
    /// `RowID`
    pub rid: u32,
    /// Token
    pub token: Token,
    /// Offset of the row in the tables stream
    pub offset: usize,
    /// `#Strings` index of the module name
    pub name: u32,
}

impl RowDefinition for ModuleRefRow {
    const TABLE: TableId = TableId::ModuleRef;

    fn from_raw(row: &RawRow, _info: &TableInfo) -> Self {
        ModuleRefRow {
            rid: row.rid(),
            token: row.token(),
            offset: row.offset(),
            name: row.column(0),
        }
    }
}

/// A row of the `AssemblyRef` table, `TableId` = 0x23
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct AssemblyRefRow {
    pub rid: u32,
    pub token: Token,
    pub offset: usize,
    pub major_version: u32,
    pub minor_version: u32,
    pub build_number: u32,
    pub revision_number: u32,
    /// `AssemblyFlags` bitmask
    pub flags: u32,
    /// `#Blob` index of the public key or its token
    pub public_key_or_token: u32,
    /// `#Strings` index of the assembly name
    pub name: u32,
    /// `#Strings` index of the culture
    pub culture: u32,
    /// `#Blob` index of the hash value
    pub hash_value: u32,
}

impl RowDefinition for AssemblyRefRow {
    const TABLE: TableId = TableId::AssemblyRef;

    fn from_raw(row: &RawRow, _info: &TableInfo) -> Self {
        AssemblyRefRow {
            rid: row.rid(),
            token: row.token(),
            offset: row.offset(),
            major_version: row.column(0),
            minor_version: row.column(1),
            build_number: row.column(2),
            revision_number: row.column(3),
            flags: row.column(4),
            public_key_or_token: row.column(5),
            name: row.column(6),
            culture: row.column(7),
            hash_value: row.column(8),
        }
    }
}
