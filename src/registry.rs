//! Module registry: named, ordered patch modules.
//!
//! A [`Registry`] is built once (usually from a catalog, see
//! [`crate::config`]) and then treated as read-only context. Modules are kept
//! in registration order and indexed by name; lookup by name is the only
//! way to reach a single module.

use std::collections::HashMap;
use thiserror::Error;

/// A single pattern/replacement pair.
///
/// Only meaningful as part of its module's ordered operation list: a later
/// pattern may rely on text introduced by an earlier replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOperation {
    /// Regular expression expected to match the target content
    pub pattern: String,
    /// Replacement template (`$1`, `${name}`, `$$` for a literal dollar)
    pub replacement: String,
}

impl PatchOperation {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// Bounded preview of the pattern for diagnostics.
    pub fn pattern_preview(&self) -> String {
        preview(&self.pattern)
    }
}

/// A named set of operations applied together, all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchModule {
    name: String,
    description: String,
    operations: Vec<PatchOperation>,
}

impl PatchModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.operations
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("module '{0}' is already registered")]
    DuplicateModule(String),

    #[error("unknown module '{0}'")]
    UnknownModule(String),

    #[error("module '{0}' has no operations")]
    EmptyModule(String),
}

/// Ordered collection of patch modules, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    modules: Vec<PatchModule>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module. Names must be unique and every module needs at least
    /// one operation.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        operations: Vec<PatchOperation>,
    ) -> Result<&PatchModule, RegistryError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateModule(name));
        }
        if operations.is_empty() {
            return Err(RegistryError::EmptyModule(name));
        }

        let slot = self.modules.len();
        self.index.insert(name.clone(), slot);
        self.modules.push(PatchModule {
            name,
            description: description.into(),
            operations,
        });
        Ok(&self.modules[slot])
    }

    pub fn lookup(&self, name: &str) -> Result<&PatchModule, RegistryError> {
        self.index
            .get(name)
            .map(|&slot| &self.modules[slot])
            .ok_or_else(|| RegistryError::UnknownModule(name.to_string()))
    }

    /// `(name, description)` pairs in registration order.
    ///
    /// Every call returns a fresh iterator, so listing can be restarted.
    pub fn list_all(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.modules
            .iter()
            .map(|m| (m.name.as_str(), m.description.as_str()))
    }

    /// Modules in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &PatchModule> + '_ {
        self.modules.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

const PREVIEW_CHARS: usize = 60;

/// Truncate `text` to a fixed number of characters, appending `...` when cut.
pub(crate) fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
