use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock, Weak},
};

use crate::{
    metadata::{
        members::{lazy, ModuleReader},
        tables::{ModuleRefRow, ModuleRow},
        token::Token,
    },
    Result,
};

#[derive(Clone, Default)]
struct ModuleState {
    name: OnceLock<Option<String>>,
    mvid: OnceLock<Option<uguid::Guid>>,
}

/// The `Module` row of a module
#[derive(Clone)]
pub struct ModuleDefinition {
    token: Token,
    module: Weak<ModuleReader>,
    state: Arc<ModuleState>,
}

impl ModuleDefinition {
    pub(crate) fn new(token: Token, module: Weak<ModuleReader>) -> Self {
        ModuleDefinition {
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

    /// File name of the module
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn name(&self) -> Result<Option<&str>> {
        let token = self.token;
        lazy(&self.state.name, &self.module, |module| {
            match module.row::<ModuleRow>(token.row())? {
                Some(row) => module.string(row.name, token),
                None => Ok(None),
            }
        })
        .map(|name| name.map(String::as_str))
    }

    /// Module version id, unique per build
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn mvid(&self) -> Result<Option<&uguid::Guid>> {
        let token = self.token;
        lazy(&self.state.mvid, &self.module, |module| {
            match module.row::<ModuleRow>(token.row())? {
                Some(row) => module.guid(row.mvid, token),
                None => Ok(None),
            }
        })
    }

    /// Replace the name
    pub fn set_name(&mut self, name: Option<String>) {
        Arc::make_mut(&mut self.state).name = OnceLock::from(name);
    }

    /// Replace the module version id
    pub fn set_mvid(&mut self, mvid: Option<uguid::Guid>) {
        Arc::make_mut(&mut self.state).mvid = OnceLock::from(mvid);
    }
}

impl PartialEq for ModuleDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for ModuleDefinition {}

impl Hash for ModuleDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token.hash(state);
    }
}

impl fmt::Debug for ModuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDefinition")
            .field("token", &self.token)
            .field("name", &self.state.name.get())
            .finish_non_exhaustive()
    }
}

/// A row of the `ModuleRef` table, resolved on demand
#[derive(Clone)]
pub struct ModuleReference {
    token: Token,
    module: Weak<ModuleReader>,
    name: Arc<OnceLock<Option<String>>>,
}

impl ModuleReference {
    pub(crate) fn new(token: Token, module: Weak<ModuleReader>) -> Self {
        ModuleReference {
            token,
            module,
            name: Arc::default(),
        }
    }

    /// Token of the row
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// File name of the referenced module
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn name(&self) -> Result<Option<&str>> {
        let token = self.token;
        lazy(&self.name, &self.module, |module| {
            match module.row::<ModuleRefRow>(token.row())? {
                Some(row) => module.string(row.name, token),
                None => Ok(None),
            }
        })
        .map(|name| name.map(String::as_str))
    }

    /// Replace the name
    pub fn set_name(&mut self, name: Option<String>) {
        self.name = Arc::new(OnceLock::from(name));
    }
}

impl PartialEq for ModuleReference {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for ModuleReference {}

impl Hash for ModuleReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token.hash(state);
    }
}

impl fmt::Debug for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleReference")
            .field("token", &self.token)
            .field("name", &self.name.get())
            .finish_non_exhaustive()
    }
}
