//! Token addressed, lazily resolved members of a module.
//!
//! [`ModuleReader`] hands out one wrapper per token and caches it, so repeated lookups of the
//! same token share the same lazily computed state. A wrapper only stores its token and a weak
//! link to its module; names, scopes and data are decoded from the metadata the first time they
//! are asked for, then memoised. Setters replace a value and detach it from the metadata.
//!
//! Problems found while resolving a property are reported to the listener of the module's
//! [`ReaderParameters`]; with the default lenient listener the property is simply `None`.
//!
//! # Key Components
//! - [`ModuleReader`] - token to member cache, traversal, heap access
//! - [`Member`] - the wrapper kinds a token can resolve to
//! - [`TypeReference`] / [`ResolutionScope`] - `TypeRef` rows and where they point
//! - [`TypeDefinition`], [`FieldDefinition`], [`ModuleDefinition`], [`ModuleReference`],
//!   [`AssemblyReference`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilmeta::{metadata::members::Member, metadata::tables::TableId, CilImage};
//! use std::path::Path;
//!
//! let image = CilImage::from_file(Path::new("tests/samples/crafted.dll"))?;
//! for member in image.module().members(TableId::TypeDef) {
//!     if let Member::TypeDefinition(definition) = member {
//!         println!("{:?} {:?}", definition.name()?, definition.class_size()?);
//!     }
//! }
//! # Ok::<(), cilmeta::Error>(())
//! ```

mod assemblyref;
mod field;
mod module;
mod typedefinition;
mod typereference;

pub use assemblyref::{AssemblyReference, AssemblyVersion};
pub use field::FieldDefinition;
pub use module::{ModuleDefinition, ModuleReference};
pub use typedefinition::TypeDefinition;
pub use typereference::{ResolutionScope, TypeReference};

use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use dashmap::DashMap;
use rayon::prelude::*;

use crate::{
    debug::{DebugDataReader, DefaultDebugDataReader},
    metadata::{
        diagnostics::{Diagnostic, DiagnosticCategory, Diagnostics, ErrorListener},
        directory::MetadataDirectory,
        fieldrva::{DefaultFieldRvaDataReader, FieldRvaDataReader},
        tables::{RowDefinition, TableId, TablesStream},
        token::Token,
    },
    Result,
};

/// Collaborators used while reading a module
#[derive(Clone)]
pub struct ReaderParameters {
    /// Receives structural problems, lenient [`Diagnostics`] by default
    pub listener: Arc<dyn ErrorListener>,
    /// Locates static field data, [`DefaultFieldRvaDataReader`] by default
    pub field_rva_reader: Arc<dyn FieldRvaDataReader>,
    /// Interprets debug directory payloads, [`DefaultDebugDataReader`] by default
    pub debug_data_reader: Arc<dyn DebugDataReader>,
}

impl ReaderParameters {
    /// Replace the error listener
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ErrorListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Replace the field data reader
    #[must_use]
    pub fn with_field_rva_reader(mut self, reader: Arc<dyn FieldRvaDataReader>) -> Self {
        self.field_rva_reader = reader;
        self
    }

    /// Replace the debug data reader
    #[must_use]
    pub fn with_debug_data_reader(mut self, reader: Arc<dyn DebugDataReader>) -> Self {
        self.debug_data_reader = reader;
        self
    }
}

impl Default for ReaderParameters {
    fn default() -> Self {
        ReaderParameters {
            listener: Arc::new(Diagnostics::new()),
            field_rva_reader: Arc::new(DefaultFieldRvaDataReader),
            debug_data_reader: Arc::new(DefaultDebugDataReader),
        }
    }
}

impl fmt::Debug for ReaderParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderParameters").finish_non_exhaustive()
    }
}

/// A resolved member
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Member {
    /// Row of the `Module` table
    Module(ModuleDefinition),
    /// Row of the `TypeRef` table
    TypeReference(TypeReference),
    /// Row of the `TypeDef` table
    TypeDefinition(TypeDefinition),
    /// Row of the `Field` table
    Field(FieldDefinition),
    /// Row of the `ModuleRef` table
    ModuleReference(ModuleReference),
    /// Row of the `AssemblyRef` table
    AssemblyReference(AssemblyReference),
}

impl Member {
    /// Token of the member
    #[must_use]
    pub fn token(&self) -> Token {
        match self {
            Member::Module(member) => member.token(),
            Member::TypeReference(member) => member.token(),
            Member::TypeDefinition(member) => member.token(),
            Member::Field(member) => member.token(),
            Member::ModuleReference(member) => member.token(),
            Member::AssemblyReference(member) => member.token(),
        }
    }

    /// Name of the member
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn name(&self) -> Result<Option<&str>> {
        match self {
            Member::Module(member) => member.name(),
            Member::TypeReference(member) => member.name(),
            Member::TypeDefinition(member) => member.name(),
            Member::Field(member) => member.name(),
            Member::ModuleReference(member) => member.name(),
            Member::AssemblyReference(member) => member.name(),
        }
    }
}

/// Resolves tokens of one module into cached member wrappers
pub struct ModuleReader {
    metadata: Arc<MetadataDirectory>,
    parameters: ReaderParameters,
    members: DashMap<Token, Member>,
    this: Weak<ModuleReader>,
}

impl ModuleReader {
    /// Create a reader over `metadata`
    ///
    /// # Arguments
    /// * 'metadata'    - The metadata directory of the module
    /// * 'parameters'  - Listener and field data reader used by every member
    #[must_use]
    pub fn new(metadata: Arc<MetadataDirectory>, parameters: ReaderParameters) -> Arc<Self> {
        Arc::new_cyclic(|this| ModuleReader {
            metadata,
            parameters,
            members: DashMap::new(),
            this: this.clone(),
        })
    }

    /// The metadata directory of the module
    #[must_use]
    pub fn metadata(&self) -> &MetadataDirectory {
        &self.metadata
    }

    /// The parameters the module was opened with
    #[must_use]
    pub fn parameters(&self) -> &ReaderParameters {
        &self.parameters
    }

    /// The error listener of the module
    #[must_use]
    pub fn listener(&self) -> &dyn ErrorListener {
        &*self.parameters.listener
    }

    /// The tables stream
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report about the stream directory
    pub fn tables(&self) -> Result<Option<&TablesStream>> {
        self.metadata.tables()
    }

    /// Number of rows of `table`, 0 without a tables stream
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        match self.tables() {
            Ok(Some(tables)) => tables.row_count(table),
            _ => 0,
        }
    }

    /// The member `token` refers to
    ///
    /// Returns `None` for the null token, for rows that do not exist and for tables that have
    /// no wrapper. The same token always yields a wrapper sharing the same cached state.
    #[must_use]
    pub fn resolve(&self, token: Token) -> Option<Member> {
        if let Some(member) = self.members.get(&token) {
            return Some(member.clone());
        }

        let table = token.table_id()?;
        if token.row() == 0 || token.row() > self.row_count(table) {
            return None;
        }

        let module = self.this.clone();
        let member = match table {
            TableId::Module => Member::Module(ModuleDefinition::new(token, module)),
            TableId::TypeRef => Member::TypeReference(TypeReference::new(token, module)),
            TableId::TypeDef => Member::TypeDefinition(TypeDefinition::new(token, module)),
            TableId::Field => Member::Field(FieldDefinition::new(token, module)),
            TableId::ModuleRef => Member::ModuleReference(ModuleReference::new(token, module)),
            TableId::AssemblyRef => {
                Member::AssemblyReference(AssemblyReference::new(token, module))
            }
            _ => return None,
        };

        tracing::trace!(%token, "member created");
        Some(self.members.entry(token).or_insert(member).clone())
    }

    /// All members of `table`, in row order
    pub fn members(&self, table: TableId) -> impl Iterator<Item = Member> + '_ {
        (1..=self.row_count(table)).filter_map(move |rid| self.resolve(Token::from_parts(table, rid)))
    }

    /// All members of `table`, resolved in parallel. The result is in row order.
    #[must_use]
    pub fn par_members(&self, table: TableId) -> Vec<Member> {
        (1..=self.row_count(table))
            .into_par_iter()
            .filter_map(|rid| self.resolve(Token::from_parts(table, rid)))
            .collect()
    }

    /// The `Module` row of this module
    #[must_use]
    pub fn definition(&self) -> Option<ModuleDefinition> {
        match self.resolve(Token::from_parts(TableId::Module, 1))? {
            Member::Module(module) => Some(module),
            _ => None,
        }
    }

    /// All rows of the `TypeRef` table
    pub fn type_references(&self) -> impl Iterator<Item = TypeReference> + '_ {
        self.members(TableId::TypeRef).filter_map(|member| match member {
            Member::TypeReference(reference) => Some(reference),
            _ => None,
        })
    }

    /// All rows of the `TypeDef` table
    pub fn type_definitions(&self) -> impl Iterator<Item = TypeDefinition> + '_ {
        self.members(TableId::TypeDef).filter_map(|member| match member {
            Member::TypeDefinition(definition) => Some(definition),
            _ => None,
        })
    }

    /// All rows of the `Field` table
    pub fn fields(&self) -> impl Iterator<Item = FieldDefinition> + '_ {
        self.members(TableId::Field).filter_map(|member| match member {
            Member::Field(field) => Some(field),
            _ => None,
        })
    }

    /// All rows of the `ModuleRef` table
    pub fn module_references(&self) -> impl Iterator<Item = ModuleReference> + '_ {
        self.members(TableId::ModuleRef).filter_map(|member| match member {
            Member::ModuleReference(reference) => Some(reference),
            _ => None,
        })
    }

    /// All rows of the `AssemblyRef` table
    pub fn assembly_references(&self) -> impl Iterator<Item = AssemblyReference> + '_ {
        self.members(TableId::AssemblyRef).filter_map(|member| match member {
            Member::AssemblyReference(reference) => Some(reference),
            _ => None,
        })
    }

    /// Typed row `rid` of `T`'s table
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report about the stream directory
    pub fn row<T: RowDefinition>(&self, rid: u32) -> Result<Option<T>> {
        Ok(self.tables()?.and_then(|tables| tables.table::<T>().get(rid)))
    }

    /// The `#Strings` entry at `index`, `None` for index 0 or a module without the heap
    ///
    /// # Errors
    /// Returns an error if the listener escalates the report about an invalid index
    pub fn string(&self, index: u32, owner: Token) -> Result<Option<String>> {
        if index == 0 {
            return Ok(None);
        }

        let Some(strings) = self.metadata.strings()? else {
            return Ok(None);
        };

        match strings.get(index) {
            Ok(value) => Ok(Some(value.to_string())),
            Err(error) => {
                self.report(owner, format!("Invalid #Strings index 0x{:X} - {}", index, error))?;
                Ok(None)
            }
        }
    }

    /// The `#GUID` entry at 1-based `index`, `None` for index 0 or a module without the heap
    ///
    /// # Errors
    /// Returns an error if the listener escalates the report about an invalid index
    pub fn guid(&self, index: u32, owner: Token) -> Result<Option<uguid::Guid>> {
        if index == 0 {
            return Ok(None);
        }

        let Some(guids) = self.metadata.guids()? else {
            return Ok(None);
        };

        match guids.get(index) {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                self.report(owner, format!("Invalid #GUID index {} - {}", index, error))?;
                Ok(None)
            }
        }
    }

    /// The `#Blob` entry at `index`, `None` for index 0 or a module without the heap
    ///
    /// # Errors
    /// Returns an error if the listener escalates the report about an invalid index
    pub fn blob(&self, index: u32, owner: Token) -> Result<Option<Vec<u8>>> {
        if index == 0 {
            return Ok(None);
        }

        let Some(blob) = self.metadata.blob()? else {
            return Ok(None);
        };

        match blob.get(index) {
            Ok(value) => Ok(Some(value.to_vec())),
            Err(error) => {
                self.report(owner, format!("Invalid #Blob index 0x{:X} - {}", index, error))?;
                Ok(None)
            }
        }
    }

    fn report(&self, owner: Token, message: String) -> Result<()> {
        self.listener().bad_image(
            Diagnostic::new(DiagnosticCategory::Heap, message)
                .with_token(owner.value())
                .with_table_row(owner.table(), owner.row()),
        )
    }
}

impl fmt::Debug for ModuleReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleReader")
            .field("metadata", &self.metadata)
            .field("cached", &self.members.len())
            .finish_non_exhaustive()
    }
}

/// Return the cached value of `cell`, or compute it with the owning module and cache it
///
/// Nothing is cached if the module is gone or `compute` fails.
fn lazy<'a, T>(
    cell: &'a OnceLock<Option<T>>,
    module: &Weak<ModuleReader>,
    compute: impl FnOnce(&ModuleReader) -> Result<Option<T>>,
) -> Result<Option<&'a T>> {
    if let Some(value) = cell.get() {
        return Ok(value.as_ref());
    }

    let Some(module) = module.upgrade() else {
        return Ok(None);
    };

    let value = compute(&module)?;
    Ok(cell.get_or_init(|| value).as_ref())
}
