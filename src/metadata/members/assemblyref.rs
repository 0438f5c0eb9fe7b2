use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock, Weak},
};

use crate::{
    metadata::{
        members::{lazy, ModuleReader},
        tables::AssemblyRefRow,
        token::Token,
    },
    Result,
};

/// Four part assembly version
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssemblyVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

#[derive(Clone, Default)]
struct AssemblyReferenceState {
    name: OnceLock<Option<String>>,
    culture: OnceLock<Option<String>>,
    version: OnceLock<Option<AssemblyVersion>>,
    public_key_or_token: OnceLock<Option<Vec<u8>>>,
}

/// A row of the `AssemblyRef` table, resolved on demand
#[derive(Clone)]
pub struct AssemblyReference {
    token: Token,
    module: Weak<ModuleReader>,
    state: Arc<AssemblyReferenceState>,
}

impl AssemblyReference {
    pub(crate) fn new(token: Token, module: Weak<ModuleReader>) -> Self {
        AssemblyReference {
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

    /// Simple name of the referenced assembly
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn name(&self) -> Result<Option<&str>> {
        let token = self.token;
        lazy(&self.state.name, &self.module, |module| {
            match module.row::<AssemblyRefRow>(token.row())? {
                Some(row) => module.string(row.name, token),
                None => Ok(None),
            }
        })
        .map(|name| name.map(String::as_str))
    }

    /// Culture of the referenced assembly, `None` for the neutral culture
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn culture(&self) -> Result<Option<&str>> {
        let token = self.token;
        lazy(&self.state.culture, &self.module, |module| {
            match module.row::<AssemblyRefRow>(token.row())? {
                Some(row) => module.string(row.culture, token),
                None => Ok(None),
            }
        })
        .map(|culture| culture.map(String::as_str))
    }

    /// Version of the referenced assembly
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn version(&self) -> Result<Option<&AssemblyVersion>> {
        let token = self.token;
        lazy(&self.state.version, &self.module, |module| {
            Ok(module
                .row::<AssemblyRefRow>(token.row())?
                .map(|row| AssemblyVersion {
                    major: u16::try_from(row.major_version).unwrap_or_default(),
                    minor: u16::try_from(row.minor_version).unwrap_or_default(),
                    build: u16::try_from(row.build_number).unwrap_or_default(),
                    revision: u16::try_from(row.revision_number).unwrap_or_default(),
                }))
        })
    }

    /// Public key or public key token of the referenced assembly
    ///
    /// # Errors
    /// Returns an error if the listener escalates a report
    pub fn public_key_or_token(&self) -> Result<Option<&[u8]>> {
        let token = self.token;
        lazy(&self.state.public_key_or_token, &self.module, |module| {
            match module.row::<AssemblyRefRow>(token.row())? {
                Some(row) => module.blob(row.public_key_or_token, token),
                None => Ok(None),
            }
        })
        .map(|key| key.map(Vec::as_slice))
    }

    /// Replace the name
    pub fn set_name(&mut self, name: Option<String>) {
        Arc::make_mut(&mut self.state).name = OnceLock::from(name);
    }

    /// Replace the culture
    pub fn set_culture(&mut self, culture: Option<String>) {
        Arc::make_mut(&mut self.state).culture = OnceLock::from(culture);
    }

    /// Replace the version
    pub fn set_version(&mut self, version: Option<AssemblyVersion>) {
        Arc::make_mut(&mut self.state).version = OnceLock::from(version);
    }
}

impl PartialEq for AssemblyReference {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for AssemblyReference {}

impl Hash for AssemblyReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token.hash(state);
    }
}

impl fmt::Debug for AssemblyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyReference")
            .field("token", &self.token)
            .field("name", &self.state.name.get())
            .field("version", &self.state.version.get())
            .finish_non_exhaustive()
    }
}
