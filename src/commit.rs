//! Atomic commit of staged content to the target file.
//!
//! The target is never written in place: content goes to a tempfile in the
//! same directory, is fsynced, and is renamed over the target. A reader (or a
//! crash) sees either the old file or the new one, never a mix.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommitError {
    #[error("cannot commit to {0}: path has no parent directory")]
    NoParent(PathBuf),

    #[error("failed to commit {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolve symlinks so writes land on the real file, not on the link.
///
/// Paths that cannot be resolved (typically because they do not exist yet)
/// are returned unchanged and fail later with a precise error.
pub fn resolve_target(path: &Path) -> PathBuf {
    match path.canonicalize() {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::trace!(path = %path.display(), error = %e, "path not resolved");
            path.to_path_buf()
        }
    }
}

/// Replace the contents of `path` with `content` atomically.
///
/// A symlinked `path` is followed and the file it points to is replaced; the
/// link itself is left alone. The existing file's permissions are carried
/// over to the new file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), CommitError> {
    let resolved = resolve_target(path);
    let path = resolved.as_path();
    let io_err = |source: std::io::Error| CommitError::Io {
        path: path.to_path_buf(),
        source,
    };

    // An empty parent means a bare relative filename in the current directory.
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Err(CommitError::NoParent(path.to_path_buf())),
    };

    let permissions = match fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(io_err(e)),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    temp.write_all(content).map_err(io_err)?;
    if let Some(permissions) = permissions {
        temp.as_file().set_permissions(permissions).map_err(io_err)?;
    }
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;

    tracing::debug!(path = %path.display(), bytes = content.len(), "committed");
    Ok(())
}
