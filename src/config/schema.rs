use crate::cache::get_or_compile;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// A patch catalog as written on disk.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CatalogFile {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub modules: Vec<ModuleDefinition>,
}

impl CatalogFile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.modules.is_empty() {
            issues.push(ValidationIssue::EmptyModuleList);
        }

        if let Some(pattern) = &self.meta.version_pattern {
            match get_or_compile(pattern) {
                Ok(re) if re.captures_len() < 2 => issues.push(ValidationIssue::InvalidMeta {
                    message: "version_pattern needs a capture group".to_string(),
                }),
                Ok(_) => {}
                Err(e) => issues.push(ValidationIssue::InvalidMeta {
                    message: format!("version_pattern does not compile: {e}"),
                }),
            }
        }

        let mut seen = HashSet::new();
        for module in &self.modules {
            if module.name.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    module: None,
                    field: "name",
                });
                continue;
            }
            if !seen.insert(module.name.as_str()) {
                issues.push(ValidationIssue::DuplicateModule {
                    module: module.name.clone(),
                });
            }
            if module.operations.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    module: Some(module.name.clone()),
                    field: "operations",
                });
            }

            for (index, op) in module.operations.iter().enumerate() {
                if op.pattern.is_empty() {
                    issues.push(ValidationIssue::InvalidOperation {
                        module: module.name.clone(),
                        index,
                        message: "pattern is empty".to_string(),
                    });
                } else if let Err(e) = get_or_compile(&op.pattern) {
                    issues.push(ValidationIssue::InvalidOperation {
                        module: module.name.clone(),
                        index,
                        message: format!("pattern does not compile: {e}"),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Semver requirement the target's version must satisfy
    #[serde(default)]
    pub version_range: Option<String>,
    /// Regex whose first capture group extracts the target's version
    #[serde(default)]
    pub version_pattern: Option<String>,
    #[serde(default)]
    pub replacement_syntax: ReplacementSyntax,
}

/// How replacement templates are written in the catalog.
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReplacementSyntax {
    /// `$1`, `${name}`, `$$`
    #[default]
    Regex,
    /// `\1`..`\9` and `\\`, rewritten to regex syntax on load
    Sed,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModuleDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub operations: Vec<OperationDefinition>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperationDefinition {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyModuleList,
    MissingField {
        module: Option<String>,
        field: &'static str,
    },
    DuplicateModule {
        module: String,
    },
    InvalidOperation {
        module: String,
        index: usize,
        message: String,
    },
    InvalidMeta {
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyModuleList => write!(f, "catalog contains no modules"),
            ValidationIssue::MissingField { module, field } => match module {
                Some(name) => write!(f, "module '{name}' missing required field '{field}'"),
                None => write!(f, "module missing required field '{field}'"),
            },
            ValidationIssue::DuplicateModule { module } => {
                write!(f, "module '{module}' is defined more than once")
            }
            ValidationIssue::InvalidOperation {
                module,
                index,
                message,
            } => write!(f, "module '{module}' operation #{index}: {message}"),
            ValidationIssue::InvalidMeta { message } => write!(f, "invalid [meta]: {message}"),
        }
    }
}
