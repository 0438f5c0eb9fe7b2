use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock, Weak},
};

use crate::{
    metadata::{
        members::{lazy, ModuleReader},
        tables::{FieldRow, FieldRvaRow},
        token::Token,
    },
    segment::DataSegment,
    Result,
};

/// Column of `FieldRVA` holding the owning `Field`
const FIELD_RVA_FIELD: usize = 1;

#[derive(Clone, Default)]
struct FieldState {
    name: OnceLock<Option<String>>,
    signature: OnceLock<Option<Vec<u8>>>,
    data: OnceLock<Option<DataSegment>>,
}

/// A row of the `Field` table, resolved on demand
#[derive(Clone)]
pub struct FieldDefinition {
    token: Token,
    module: Weak<ModuleReader>,
    state: Arc<FieldState>,
}

impl FieldDefinition {
    pub(crate) fn new(token: Token, module: Weak<ModuleReader>) -> Self {
        FieldDefinition {
            token,
            module,
            state: Arc::default(),
        }
    }

    /// Token of the row
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// The raw `FieldAttributes`, `None` once the module has been dropped
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn flags(&self) -> Result<Option<u32>> {
        let Some(module) = self.module.upgrade() else {
            return Ok(None);
        };
        Ok(module.row::<FieldRow>(self.token.row())?.map(|row| row.flags))
    }

    /// Name of the field
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn name(&self) -> Result<Option<&str>> {
        let token = self.token;
        lazy(&self.state.name, &self.module, |module| {
            match module.row::<FieldRow>(token.row())? {
                Some(row) => module.string(row.name, token),
                None => Ok(None),
            }
        })
        .map(|name| name.map(String::as_str))
    }

    /// The raw field signature blob
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn signature(&self) -> Result<Option<&[u8]>> {
        let token = self.token;
        lazy(&self.state.signature, &self.module, |module| {
            match module.row::<FieldRow>(token.row())? {
                Some(row) => module.blob(row.signature, token),
                None => Ok(None),
            }
        })
        .map(|signature| signature.map(Vec::as_slice))
    }

    /// The `FieldRVA` row of this field, if it has initial data
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn field_rva(&self) -> Result<Option<FieldRvaRow>> {
        let Some(module) = self.module.upgrade() else {
            return Ok(None);
        };
        Ok(module.tables()?.and_then(|tables| {
            tables
                .table::<FieldRvaRow>()
                .find_by_key(FIELD_RVA_FIELD, self.token.row())
        }))
    }

    /// The initial data of a static field, located through its `FieldRVA` row
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report, or
    /// [`crate::Error::InvalidElementType`] if the field type cannot carry data
    pub fn data(&self) -> Result<Option<&DataSegment>> {
        let rid = self.token.row();
        lazy(&self.state.data, &self.module, |module| {
            let Some(row) = module.tables()?.and_then(|tables| {
                tables
                    .table::<FieldRvaRow>()
                    .find_by_key(FIELD_RVA_FIELD, rid)
            }) else {
                return Ok(None);
            };
            module.parameters().field_rva_reader.resolve_field_data(
                module.listener(),
                module.metadata(),
                &row,
            )
        })
    }

    /// Replace the name
    pub fn set_name(&mut self, name: Option<String>) {
        Arc::make_mut(&mut self.state).name = OnceLock::from(name);
    }

    /// Replace the initial data
    pub fn set_data(&mut self, data: Option<DataSegment>) {
        Arc::make_mut(&mut self.state).data = OnceLock::from(data);
    }
}

impl PartialEq for FieldDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for FieldDefinition {}

impl Hash for FieldDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token.hash(state);
    }
}

impl fmt::Debug for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("token", &self.token)
            .field("name", &self.state.name.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        file::reader::BinaryReader,
        metadata::{
            diagnostics::{Diagnostics, ErrorListener},
            directory::MetadataDirectory,
            fieldrva::{element_type, FieldRvaDataReader},
            members::{Member, ReaderParameters},
            tables::TableId,
        },
        segment::FlatLayout,
        test::builder::{field_metadata, FIELD_DATA_RVA},
        Error,
    };

    fn field(data: Vec<u8>, parameters: ReaderParameters) -> (Arc<ModuleReader>, FieldDefinition) {
        let reader = BinaryReader::from_vec(data);
        let resolver = Arc::new(FlatLayout::new(Arc::clone(reader.backend()), 0));
        let metadata =
            MetadataDirectory::from_reader(Arc::clone(&parameters.listener), &reader, resolver)
                .unwrap()
                .unwrap();
        let module = ModuleReader::new(Arc::new(metadata), parameters);
        let Some(Member::Field(field)) = module.resolve(Token::from_parts(TableId::Field, 1)) else {
            panic!("expected a field");
        };
        (module, field)
    }

    #[test]
    fn static_data() {
        let (_module, field) = field(
            field_metadata(&[0x06, element_type::VALUETYPE, 0x04], Some(16)),
            ReaderParameters::default(),
        );

        assert_eq!(field.name().unwrap(), Some("Value"));
        assert_eq!(field.flags().unwrap(), Some(0x0110));
        assert_eq!(
            field.signature().unwrap(),
            Some(&[0x06, element_type::VALUETYPE, 0x04][..])
        );
        assert_eq!(field.field_rva().unwrap().unwrap().rva, FIELD_DATA_RVA);

        let data = field.data().unwrap().unwrap();
        assert_eq!(data.len(), 16);
        assert_eq!(&data.data()[..4], &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn invalid_element_type_propagates() {
        let (_module, field) = field(field_metadata(&[0x06, 0x1C], None), ReaderParameters::default());
        assert!(matches!(field.data(), Err(Error::InvalidElementType(0x1C))));
    }

    struct Fixed;

    impl FieldRvaDataReader for Fixed {
        fn resolve_field_data(
            &self,
            _listener: &dyn ErrorListener,
            _metadata: &MetadataDirectory,
            _row: &FieldRvaRow,
        ) -> Result<Option<DataSegment>> {
            Ok(Some(DataSegment::from_vec(vec![0xCC; 3])))
        }
    }

    #[test]
    fn custom_field_reader() {
        let listener = Arc::new(Diagnostics::new());
        let (_module, field) = field(
            field_metadata(&[0x06, 0x1C], None),
            ReaderParameters::default()
                .with_listener(listener.clone())
                .with_field_rva_reader(Arc::new(Fixed)),
        );

        assert_eq!(field.data().unwrap().unwrap().data(), &[0xCC; 3]);
        assert!(!listener.has_any());
    }

    #[test]
    fn set_data() {
        let (_module, mut field) = field(
            field_metadata(&[0x06, element_type::I4], None),
            ReaderParameters::default(),
        );
        field.set_data(None);
        assert!(field.data().unwrap().is_none());
    }
}
