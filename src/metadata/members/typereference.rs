use std::{
    collections::HashSet,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock, Weak},
};

use crate::{
    metadata::{
        diagnostics::{Diagnostic, DiagnosticCategory},
        members::{
            lazy, AssemblyReference, Member, ModuleDefinition, ModuleReader, ModuleReference,
        },
        tables::{TableId, TypeRefRow},
        token::Token,
    },
    Result,
};

/// Where a [`TypeReference`] is defined
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResolutionScope {
    /// The current module
    Module(ModuleDefinition),
    /// Another module of the current assembly
    ModuleReference(ModuleReference),
    /// Another assembly
    AssemblyReference(AssemblyReference),
    /// The enclosing type of a nested type
    TypeReference(TypeReference),
}

impl ResolutionScope {
    /// Token of the scope
    #[must_use]
    pub fn token(&self) -> Token {
        match self {
            ResolutionScope::Module(scope) => scope.token(),
            ResolutionScope::ModuleReference(scope) => scope.token(),
            ResolutionScope::AssemblyReference(scope) => scope.token(),
            ResolutionScope::TypeReference(scope) => scope.token(),
        }
    }

    /// The scope a member stands for, if its kind can be one
    #[must_use]
    pub fn from_member(member: Member) -> Option<ResolutionScope> {
        match member {
            Member::Module(scope) => Some(ResolutionScope::Module(scope)),
            Member::ModuleReference(scope) => Some(ResolutionScope::ModuleReference(scope)),
            Member::AssemblyReference(scope) => Some(ResolutionScope::AssemblyReference(scope)),
            Member::TypeReference(scope) => Some(ResolutionScope::TypeReference(scope)),
            _ => None,
        }
    }
}

#[derive(Clone, Default)]
struct TypeReferenceState {
    name: OnceLock<Option<String>>,
    namespace: OnceLock<Option<String>>,
    scope: OnceLock<Option<ResolutionScope>>,
}

/// A row of the `TypeRef` table, resolved on demand
///
/// Clones share their cache until a setter is called on one of them.
#[derive(Clone)]
pub struct TypeReference {
    token: Token,
    module: Weak<ModuleReader>,
    state: Arc<TypeReferenceState>,
}

impl TypeReference {
    pub(crate) fn new(token: Token, module: Weak<ModuleReader>) -> Self {
        TypeReference {
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

    /// The module this reference was read from, `None` once it has been dropped
    #[must_use]
    pub fn module(&self) -> Option<Arc<ModuleReader>> {
        self.module.upgrade()
    }

    /// Name of the referenced type
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn name(&self) -> Result<Option<&str>> {
        let token = self.token;
        lazy(&self.state.name, &self.module, |module| {
            match module.row::<TypeRefRow>(token.row())? {
                Some(row) => module.string(row.type_name, token),
                None => Ok(None),
            }
        })
        .map(|name| name.map(String::as_str))
    }

    /// Namespace of the referenced type, `None` if it has none
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn namespace(&self) -> Result<Option<&str>> {
        let token = self.token;
        lazy(&self.state.namespace, &self.module, |module| {
            match module.row::<TypeRefRow>(token.row())? {
                Some(row) => module.string(row.type_namespace, token),
                None => Ok(None),
            }
        })
        .map(|namespace| namespace.map(String::as_str))
    }

    /// Where the referenced type is defined, `None` for a null scope
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn scope(&self) -> Result<Option<&ResolutionScope>> {
        let token = self.token;
        lazy(&self.state.scope, &self.module, |module| {
            let Some(row) = module.row::<TypeRefRow>(token.row())? else {
                return Ok(None);
            };

            if row.resolution_scope.is_null() {
                return Ok(None);
            }

            if scope_chain_is_cyclic(module, token, row.resolution_scope)? {
                module.listener().bad_image(
                    Diagnostic::new(
                        DiagnosticCategory::Table,
                        format!("TypeRef {} has a cyclic resolution scope", token),
                    )
                    .with_token(token.value())
                    .with_table_row(TableId::TypeRef as u8, token.row()),
                )?;
                return Ok(None);
            }

            match module.resolve(row.resolution_scope) {
                Some(member) => Ok(ResolutionScope::from_member(member)),
                None => {
                    module.listener().bad_image(
                        Diagnostic::new(
                            DiagnosticCategory::Table,
                            format!(
                                "TypeRef {} has an invalid resolution scope {}",
                                token, row.resolution_scope
                            ),
                        )
                        .with_token(token.value())
                        .with_table_row(TableId::TypeRef as u8, token.row()),
                    )?;
                    Ok(None)
                }
            }
        })
    }

    /// Replace the name
    pub fn set_name(&mut self, name: Option<String>) {
        Arc::make_mut(&mut self.state).name = OnceLock::from(name);
    }

    /// Replace the namespace
    pub fn set_namespace(&mut self, namespace: Option<String>) {
        Arc::make_mut(&mut self.state).namespace = OnceLock::from(namespace);
    }

    /// Replace the resolution scope
    pub fn set_scope(&mut self, scope: Option<ResolutionScope>) {
        Arc::make_mut(&mut self.state).scope = OnceLock::from(scope);
    }

    #[cfg(test)]
    pub(crate) fn shares_state_with(&self, other: &TypeReference) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Follow the `TypeRef` scopes starting at `scope` and check whether they lead back to a row
/// already on the chain
fn scope_chain_is_cyclic(module: &ModuleReader, token: Token, scope: Token) -> Result<bool> {
    let mut visited = HashSet::from([token]);
    let mut current = scope;
    while current.table_id() == Some(TableId::TypeRef) {
        if !visited.insert(current) {
            return Ok(true);
        }

        match module.row::<TypeRefRow>(current.row())? {
            Some(row) => current = row.resolution_scope,
            None => break,
        }
    }
    Ok(false)
}

impl PartialEq for TypeReference {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for TypeReference {}

impl Hash for TypeReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token.hash(state);
    }
}

impl fmt::Debug for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeReference")
            .field("token", &self.token)
            .field("name", &self.state.name.get())
            .field("namespace", &self.state.namespace.get())
            .finish_non_exhaustive()
    }
}
