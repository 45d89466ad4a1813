//! Substitution engine: applies a module's operations to an in-memory buffer.
//!
//! Operations run strictly in order and each one sees the output of the
//! previous one. Every operation must change the buffer; the first one that
//! fails aborts the module and the caller keeps its original content. Nothing
//! here touches the file system; committing is the orchestrator's job.

use crate::cache::get_or_compile;
use crate::registry::PatchModule;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubstitutionError {
    #[error("module '{module}': pattern #{index} could not be compiled ({message}): {preview}")]
    Regex {
        module: String,
        index: usize,
        preview: String,
        message: String,
    },

    #[error("module '{module}': pattern #{index} matched nothing, no changes made: {preview}")]
    NoMatch {
        module: String,
        index: usize,
        preview: String,
    },

    #[error(
        "module '{module}': pattern #{index} matched {matches} time(s) but the replacement left the text unchanged: {preview}"
    )]
    Unchanged {
        module: String,
        index: usize,
        preview: String,
        matches: usize,
    },
}

impl SubstitutionError {
    pub fn module(&self) -> &str {
        match self {
            SubstitutionError::Regex { module, .. }
            | SubstitutionError::NoMatch { module, .. }
            | SubstitutionError::Unchanged { module, .. } => module,
        }
    }

    pub fn operation_index(&self) -> usize {
        match self {
            SubstitutionError::Regex { index, .. }
            | SubstitutionError::NoMatch { index, .. }
            | SubstitutionError::Unchanged { index, .. } => *index,
        }
    }
}

/// Progress record for one successfully applied operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationApplied {
    /// Zero-based operation index within the module
    pub index: usize,
    /// Number of non-overlapping matches replaced
    pub matches: usize,
    /// Buffer length before and after the operation
    pub len_before: usize,
    pub len_after: usize,
}

/// Apply every operation of `module` to `content`, returning the new content.
pub fn apply(module: &PatchModule, content: &str) -> Result<String, SubstitutionError> {
    apply_with(module, content, |_| {})
}

/// Like [`apply`], reporting each applied operation to `on_applied`.
pub fn apply_with<F>(
    module: &PatchModule,
    content: &str,
    mut on_applied: F,
) -> Result<String, SubstitutionError>
where
    F: FnMut(OperationApplied),
{
    let mut buffer = content.to_string();

    for (index, op) in module.operations().iter().enumerate() {
        let re = get_or_compile(&op.pattern).map_err(|e| SubstitutionError::Regex {
            module: module.name().to_string(),
            index,
            preview: op.pattern_preview(),
            message: e.to_string(),
        })?;

        let matches = re.find_iter(&buffer).count();
        let replaced = match re.replace_all(&buffer, op.replacement.as_str()) {
            Cow::Borrowed(_) => {
                tracing::warn!(module = module.name(), index, "pattern matched nothing");
                return Err(SubstitutionError::NoMatch {
                    module: module.name().to_string(),
                    index,
                    preview: op.pattern_preview(),
                });
            }
            Cow::Owned(replaced) => replaced,
        };

        if replaced == buffer {
            tracing::warn!(
                module = module.name(),
                index,
                matches,
                "replacement reproduced the matched text"
            );
            return Err(SubstitutionError::Unchanged {
                module: module.name().to_string(),
                index,
                preview: op.pattern_preview(),
                matches,
            });
        }

        tracing::debug!(
            module = module.name(),
            index,
            matches,
            len_before = buffer.len(),
            len_after = replaced.len(),
            "operation applied"
        );
        on_applied(OperationApplied {
            index,
            matches,
            len_before: buffer.len(),
            len_after: replaced.len(),
        });
        buffer = replaced;
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{PatchOperation, Registry};

    fn registry_with(ops: &[(&str, &str)]) -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                "m",
                "",
                ops.iter().map(|(p, r)| PatchOperation::new(*p, *r)).collect(),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_single_replacement() {
        let registry = registry_with(&[(r"foo\(A\)\{return 1\}", "foo(A){return 2}")]);
        let m = registry.lookup("m").unwrap();
        assert_eq!(apply(m, "foo(A){return 1}").unwrap(), "foo(A){return 2}");
    }

    #[test]
    fn test_replaces_all_matches() {
        let registry = registry_with(&[("track\\(\\)", "noop()")]);
        let m = registry.lookup("m").unwrap();
        let mut seen = Vec::new();
        let out = apply_with(m, "track();x;track();", |op| seen.push(op)).unwrap();
        assert_eq!(out, "noop();x;noop();");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].matches, 2);
    }

    #[test]
    fn test_capture_groups() {
        let registry = registry_with(&[(r"timeout:(\d+)", "timeout:${1}0")]);
        let m = registry.lookup("m").unwrap();
        assert_eq!(apply(m, "{timeout:30}").unwrap(), "{timeout:300}");
    }

    #[test]
    fn test_sequential_dependency() {
        let registry = registry_with(&[("original", "MARKER"), ("MARKER", "final")]);
        let m = registry.lookup("m").unwrap();
        assert_eq!(apply(m, "an original text").unwrap(), "an final text");
    }

    #[test]
    fn test_identical_replacement_is_unchanged_error() {
        let registry = registry_with(&[("same", "same")]);
        let m = registry.lookup("m").unwrap();
        let err = apply(m, "the same thing").unwrap_err();
        assert!(matches!(err, SubstitutionError::Unchanged { matches: 1, .. }));
    }

    #[test]
    fn test_no_match_aborts_module() {
        let registry = registry_with(&[("first", "1st"), ("absent", "x"), ("second", "2nd")]);
        let m = registry.lookup("m").unwrap();
        let err = apply(m, "first second").unwrap_err();
        assert_eq!(err.operation_index(), 1);
        assert!(matches!(err, SubstitutionError::NoMatch { .. }));
    }

    #[test]
    fn test_invalid_regex_aborts_module() {
        let registry = registry_with(&[("ok", "fine"), ("[unclosed", "x")]);
        let m = registry.lookup("m").unwrap();
        let err = apply(m, "ok [unclosed").unwrap_err();
        assert!(matches!(err, SubstitutionError::Regex { index: 1, .. }));
        assert_eq!(err.module(), "m");
    }
}
