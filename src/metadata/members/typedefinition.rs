use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock, Weak},
};

use crate::{
    metadata::{
        members::{lazy, FieldDefinition, Member, ModuleReader},
        tables::{ClassLayoutRow, TableId, TypeDefRow},
        token::Token,
    },
    Result,
};

/// Column of `ClassLayout` holding the owning `TypeDef`
const CLASS_LAYOUT_PARENT: usize = 2;

#[derive(Clone, Default)]
struct TypeDefinitionState {
    name: OnceLock<Option<String>>,
    namespace: OnceLock<Option<String>>,
    class_size: OnceLock<Option<u32>>,
}

/// A row of the `TypeDef` table, resolved on demand
#[derive(Clone)]
pub struct TypeDefinition {
    token: Token,
    module: Weak<ModuleReader>,
    state: Arc<TypeDefinitionState>,
}

impl TypeDefinition {
    pub(crate) fn new(token: Token, module: Weak<ModuleReader>) -> Self {
        TypeDefinition {
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

    /// Name of the type
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn name(&self) -> Result<Option<&str>> {
        let token = self.token;
        lazy(&self.state.name, &self.module, |module| {
            match module.row::<TypeDefRow>(token.row())? {
                Some(row) => module.string(row.type_name, token),
                None => Ok(None),
            }
        })
        .map(|name| name.map(String::as_str))
    }

    /// Namespace of the type, `None` if it has none
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn namespace(&self) -> Result<Option<&str>> {
        let token = self.token;
        lazy(&self.state.namespace, &self.module, |module| {
            match module.row::<TypeDefRow>(token.row())? {
                Some(row) => module.string(row.type_namespace, token),
                None => Ok(None),
            }
        })
        .map(|namespace| namespace.map(String::as_str))
    }

    /// Explicit size of the type from its `ClassLayout` row, `None` without one
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn class_size(&self) -> Result<Option<u32>> {
        let rid = self.token.row();
        lazy(&self.state.class_size, &self.module, |module| {
            Ok(module.tables()?.and_then(|tables| {
                tables
                    .table::<ClassLayoutRow>()
                    .find_by_key(CLASS_LAYOUT_PARENT, rid)
                    .map(|layout| layout.class_size)
            }))
        })
        .map(|class_size| class_size.copied())
    }

    /// The fields owned by this type
    ///
    /// A type owns the run of `Field` rows from its `FieldList` up to the `FieldList` of the
    /// next type. The list is computed on every call.
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn fields(&self) -> Result<Vec<FieldDefinition>> {
        let Some(module) = self.module.upgrade() else {
            return Ok(Vec::new());
        };
        let Some(row) = module.row::<TypeDefRow>(self.token.row())? else {
            return Ok(Vec::new());
        };

        let field_count = module.row_count(TableId::Field);
        let end = match module.row::<TypeDefRow>(self.token.row() + 1)? {
            Some(next) => next.field_list.min(field_count + 1),
            None => field_count + 1,
        };

        Ok((row.field_list.max(1)..end)
            .filter_map(|rid| match module.resolve(Token::from_parts(TableId::Field, rid)) {
                Some(Member::Field(field)) => Some(field),
                _ => None,
            })
            .collect())
    }

    /// Replace the name
    pub fn set_name(&mut self, name: Option<String>) {
        Arc::make_mut(&mut self.state).name = OnceLock::from(name);
    }

    /// Replace the namespace
    pub fn set_namespace(&mut self, namespace: Option<String>) {
        Arc::make_mut(&mut self.state).namespace = OnceLock::from(namespace);
    }

    /// Replace the class size
    pub fn set_class_size(&mut self, class_size: Option<u32>) {
        Arc::make_mut(&mut self.state).class_size = OnceLock::from(class_size);
    }
}

impl PartialEq for TypeDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for TypeDefinition {}

impl Hash for TypeDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token.hash(state);
    }
}

impl fmt::Debug for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDefinition")
            .field("token", &self.token)
            .field("name", &self.state.name.get())
            .field("namespace", &self.state.namespace.get())
            .finish_non_exhaustive()
    }
}
