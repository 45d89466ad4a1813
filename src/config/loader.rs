use crate::config::schema::{CatalogFile, Metadata, ReplacementSyntax, ValidationError};
use crate::registry::{PatchOperation, Registry, RegistryError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Modules loaded from one or more catalog files.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// `[meta]` of each loaded file, in load order
    pub metas: Vec<Metadata>,
    pub registry: Registry,
    /// Files the catalog was loaded from (empty when loaded from a string)
    pub sources: Vec<PathBuf>,
}

impl Catalog {
    /// Version requirements declared by the loaded files.
    pub fn version_ranges(&self) -> impl Iterator<Item = &str> + '_ {
        self.metas
            .iter()
            .filter_map(|m| m.version_range.as_deref())
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// First version-detection pattern declared by any loaded file.
    pub fn version_pattern(&self) -> Option<&str> {
        self.metas.iter().find_map(|m| m.version_pattern.as_deref())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    Registry {
        path: Option<PathBuf>,
        source: RegistryError,
    },
    Discovery {
        path: PathBuf,
        source: walkdir::Error,
    },
    NoCatalogs {
        searched: Vec<PathBuf>,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            ConfigError::Registry { path: None, source } => ConfigError::Registry {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read patch catalog from {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse patch catalog TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse patch catalog TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid patch catalog ({}): {}", path.display(), source),
                None => write!(f, "invalid patch catalog: {}", source),
            },
            ConfigError::Registry { path, source } => match path {
                Some(path) => write!(f, "cannot register modules from {}: {}", path.display(), source),
                None => write!(f, "cannot register modules: {}", source),
            },
            ConfigError::Discovery { path, source } => {
                write!(f, "failed to scan {} for catalogs: {}", path.display(), source)
            }
            ConfigError::NoCatalogs { searched } => {
                let dirs: Vec<String> = searched.iter().map(|p| p.display().to_string()).collect();
                write!(f, "no .toml patch catalogs found in {}", dirs.join(" or "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::Registry { source, .. } => Some(source),
            ConfigError::Discovery { source, .. } => Some(source),
            ConfigError::NoCatalogs { .. } => None,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<Catalog, ConfigError> {
    let mut catalog = Catalog::default();
    merge_str(&mut catalog, input)?;
    Ok(catalog)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Catalog, ConfigError> {
    load_catalogs(&[path.as_ref().to_path_buf()])
}

/// Load several catalog files into one registry, in the given order.
///
/// A module name defined in more than one file is an error.
pub fn load_catalogs(paths: &[PathBuf]) -> Result<Catalog, ConfigError> {
    let mut catalog = Catalog::default();
    for path in paths {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        merge_str(&mut catalog, &contents).map_err(|error| error.with_path(path))?;
        catalog.sources.push(path.clone());
        tracing::debug!(path = %path.display(), "catalog loaded");
    }
    Ok(catalog)
}

/// All `.toml` files directly inside `dir`, sorted by path.
pub fn discover_catalog_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry.map_err(|source| ConfigError::Discovery {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn merge_str(catalog: &mut Catalog, input: &str) -> Result<(), ConfigError> {
    let file: CatalogFile = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    file.validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;

    let syntax = file.meta.replacement_syntax;
    for module in file.modules {
        let operations = module
            .operations
            .into_iter()
            .map(|op| {
                let replacement = match syntax {
                    ReplacementSyntax::Regex => op.replacement,
                    ReplacementSyntax::Sed => sed_to_regex_template(&op.replacement),
                };
                PatchOperation::new(op.pattern, replacement)
            })
            .collect();
        catalog
            .registry
            .register(module.name, module.description, operations)
            .map_err(|source| ConfigError::Registry { path: None, source })?;
    }
    catalog.metas.push(file.meta);
    Ok(())
}

/// Rewrite a sed-style replacement into a regex crate template.
///
/// `\1`..`\9` become group references, `&` the whole match, `\n` a newline;
/// any other escaped character and any `$` are taken literally.
pub fn sed_to_regex_template(sed: &str) -> String {
    let mut out = String::with_capacity(sed.len());
    let mut chars = sed.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(d @ '1'..='9') => {
                    out.push_str("${");
                    out.push(d);
                    out.push('}');
                }
                Some('n') => out.push('\n'),
                Some('$') => out.push_str("$$"),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            '&' => out.push_str("${0}"),
            '$' => out.push_str("$$"),
            other => out.push(other),
        }
    }
    out
}
