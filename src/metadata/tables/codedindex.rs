//! Coded indices (ECMA-335 II.24.2.6).
//!
//! A coded index multiplexes several tables into one column: the low `n` bits select one of
//! the candidate tables of its [`CodedIndexType`], the remaining bits carry the 1-based row.
//! `n` is derived from the number of candidates rather than stored, so a kind that gains
//! candidates in a future revision of the format only needs its candidate list extended.
//!
//! Some kinds reserve tag values without assigning a table (`CustomAttributeType` uses only
//! tags 2 and 3). Those slots are `None` in the candidate list and decode to the null token.
//!
//! # Examples
//!
//! ```rust
//! use cilmeta::metadata::tables::{CodedIndexType, IndexEncoder, TableId};
//! use cilmeta::Token;
//!
//! let encoder = IndexEncoder::new(CodedIndexType::TypeDefOrRef, 10);
//! let token = encoder.decode(0x0D);
//! assert_eq!(token, Token::from_parts(TableId::TypeRef, 3));
//! assert_eq!(encoder.encode(token), 0x0D);
//! ```

use strum::{EnumCount, EnumIter};

use crate::metadata::{tables::TableId, token::Token};

/// The coded index kinds defined by ECMA-335
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[repr(usize)]
#[allow(missing_docs)]
pub enum CodedIndexType {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// Candidate tables, indexed by tag. `None` marks a tag value without a table.
    #[must_use]
    pub fn tables(self) -> &'static [Option<TableId>] {
        match self {
            CodedIndexType::TypeDefOrRef => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasConstant => &[
                Some(TableId::Field),
                Some(TableId::Param),
                Some(TableId::Property),
            ],
            CodedIndexType::HasCustomAttribute => &[
                Some(TableId::MethodDef),
                Some(TableId::Field),
                Some(TableId::TypeRef),
                Some(TableId::TypeDef),
                Some(TableId::Param),
                Some(TableId::InterfaceImpl),
                Some(TableId::MemberRef),
                Some(TableId::Module),
                // Listed as 'Permission' in the standard, which is the DeclSecurity table
                Some(TableId::DeclSecurity),
                Some(TableId::Property),
                Some(TableId::Event),
                Some(TableId::StandAloneSig),
                Some(TableId::ModuleRef),
                Some(TableId::TypeSpec),
                Some(TableId::Assembly),
                Some(TableId::AssemblyRef),
                Some(TableId::File),
                Some(TableId::ExportedType),
                Some(TableId::ManifestResource),
                Some(TableId::GenericParam),
                Some(TableId::GenericParamConstraint),
                Some(TableId::MethodSpec),
            ],
            CodedIndexType::HasFieldMarshal => &[Some(TableId::Field), Some(TableId::Param)],
            CodedIndexType::HasDeclSecurity => &[
                Some(TableId::TypeDef),
                Some(TableId::MethodDef),
                Some(TableId::Assembly),
            ],
            CodedIndexType::MemberRefParent => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::ModuleRef),
                Some(TableId::MethodDef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasSemantics => &[Some(TableId::Event), Some(TableId::Property)],
            CodedIndexType::MethodDefOrRef => {
                &[Some(TableId::MethodDef), Some(TableId::MemberRef)]
            }
            CodedIndexType::MemberForwarded => &[Some(TableId::Field), Some(TableId::MethodDef)],
            CodedIndexType::Implementation => &[
                Some(TableId::File),
                Some(TableId::AssemblyRef),
                Some(TableId::ExportedType),
            ],
            CodedIndexType::CustomAttributeType => &[
                None,
                None,
                Some(TableId::MethodDef),
                Some(TableId::MemberRef),
                None,
            ],
            CodedIndexType::ResolutionScope => &[
                Some(TableId::Module),
                Some(TableId::ModuleRef),
                Some(TableId::AssemblyRef),
                Some(TableId::TypeRef),
            ],
            CodedIndexType::TypeOrMethodDef => &[Some(TableId::TypeDef), Some(TableId::MethodDef)],
        }
    }

    /// Number of low bits used for the tag, `ceil(log2(candidates))`
    #[must_use]
    pub fn tag_bits(self) -> u8 {
        #[allow(clippy::cast_possible_truncation)]
        let candidates = self.tables().len() as u32;
        #[allow(clippy::cast_possible_truncation)]
        let bits = (u32::BITS - candidates.saturating_sub(1).leading_zeros()) as u8;
        bits
    }
}

/// Decodes and encodes one coded index kind, as laid out in one tables stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEncoder {
    kind: CodedIndexType,
    tag_bits: u8,
    is_large: bool,
}

impl IndexEncoder {
    /// Create an encoder for `kind`
    ///
    /// # Arguments
    /// * 'kind'        - The coded index kind
    /// * 'max_rows'    - The largest row count among the candidate tables
    #[must_use]
    pub fn new(kind: CodedIndexType, max_rows: u32) -> Self {
        let tag_bits = kind.tag_bits();
        IndexEncoder {
            kind,
            tag_bits,
            is_large: (u64::from(max_rows) << tag_bits) > 0xFFFF,
        }
    }

    /// The coded index kind
    #[must_use]
    pub fn kind(&self) -> CodedIndexType {
        self.kind
    }

    /// Number of tag bits
    #[must_use]
    pub fn tag_bits(&self) -> u8 {
        self.tag_bits
    }

    /// Returns true if the column is 4 bytes wide
    #[must_use]
    pub fn is_large(&self) -> bool {
        self.is_large
    }

    /// Column width in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        if self.is_large {
            4
        } else {
            2
        }
    }

    /// Split `value` into a token. Tags without a candidate table, row 0 and rows that do not
    /// fit the 24 bits of a token yield [`Token::NULL`].
    #[must_use]
    pub fn decode(&self, value: u32) -> Token {
        let tag = value & ((1 << self.tag_bits) - 1);
        let rid = value >> self.tag_bits;
        if rid == 0 || rid > Token::MAX_ROW {
            return Token::NULL;
        }

        match self.kind.tables().get(tag as usize) {
            Some(Some(table)) => Token::from_parts(*table, rid),
            _ => Token::NULL,
        }
    }

    /// Pack `token` into a coded index value
    ///
    /// Only tokens whose table is a candidate of this kind can be encoded; anything else,
    /// including the null token, encodes to 0.
    #[must_use]
    pub fn encode(&self, token: Token) -> u32 {
        if token.is_null() {
            return 0;
        }

        let Some(table) = token.table_id() else {
            return 0;
        };

        match self
            .kind
            .tables()
            .iter()
            .position(|candidate| *candidate == Some(table))
        {
            #[allow(clippy::cast_possible_truncation)]
            Some(tag) => (token.row() << self.tag_bits) | tag as u32,
            None => 0,
        }
    }
}
