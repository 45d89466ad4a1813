//! Pattern validation for patch modules.
//!
//! Before a module is applied, every one of its patterns must match the
//! target's current content. Validation stops at the first pattern that
//! does not match: that pattern is the most useful signal when the target is
//! a different version than the catalog was written against.

use crate::cache::get_or_compile;
use crate::registry::PatchModule;
use std::path::Path;
use thiserror::Error;

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("module '{module}': pattern #{index} not found: {preview}")]
    PatternNotFound {
        module: String,
        index: usize,
        preview: String,
    },

    #[error("module '{module}': pattern #{index} is invalid ({message}): {preview}")]
    InvalidPattern {
        module: String,
        index: usize,
        preview: String,
        message: String,
    },
}

impl ValidationError {
    pub fn module(&self) -> &str {
        match self {
            ValidationError::PatternNotFound { module, .. }
            | ValidationError::InvalidPattern { module, .. } => module,
        }
    }

    /// Zero-based index of the failing operation.
    pub fn operation_index(&self) -> usize {
        match self {
            ValidationError::PatternNotFound { index, .. }
            | ValidationError::InvalidPattern { index, .. } => *index,
        }
    }
}

/// Check that every pattern of `module` matches somewhere in `content`.
///
/// Matching is unanchored and the content is searched as a single text.
pub fn validate(module: &PatchModule, content: &str) -> Result<(), ValidationError> {
    for (index, op) in module.operations().iter().enumerate() {
        let re = get_or_compile(&op.pattern).map_err(|e| ValidationError::InvalidPattern {
            module: module.name().to_string(),
            index,
            preview: op.pattern_preview(),
            message: e.to_string(),
        })?;

        if !re.is_match(content) {
            tracing::debug!(module = module.name(), index, "pattern not found");
            return Err(ValidationError::PatternNotFound {
                module: module.name().to_string(),
                index,
                preview: op.pattern_preview(),
            });
        }
        tracing::trace!(module = module.name(), index, "pattern found");
    }

    Ok(())
}

/// Validate a module against the file at `path`.
pub fn validate_file(
    module: &PatchModule,
    path: impl AsRef<Path>,
) -> Result<Result<(), ValidationError>, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    Ok(validate(module, &content))
}
