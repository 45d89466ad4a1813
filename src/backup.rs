//! Timestamped backups of the target file.
//!
//! Backups live next to the target as `<target>.backup.<YYYYMMDD_HHMMSS>`.
//! A symlinked target is resolved first, so backups sit beside the real file.
//! The timestamp has second resolution and sorts chronologically, so the
//! newest backup is the greatest one. Backups of the same target taken within
//! the same second get a `.1`, `.2`, ... suffix instead of overwriting.

use crate::commit::{atomic_write, resolve_target, CommitError};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::Xxh3;

/// Infix between the target's filename and the timestamp.
pub const BACKUP_INFIX: &str = ".backup.";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Same-second backups tried before giving up.
const MAX_SAME_SECOND: u32 = 100;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("target file not found: {0}")]
    NotFound(PathBuf),

    #[error("backup already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("backup {backup} does not match {original} after copy")]
    Mismatch { original: PathBuf, backup: PathBuf },

    #[error("target path has no file name: {0}")]
    InvalidPath(PathBuf),

    #[error("backup I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Commit(#[from] CommitError),
}

/// Path of the backup for `path` taken at `timestamp`.
pub fn backup_path_for(path: &Path, timestamp: &chrono::DateTime<chrono::Local>) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_INFIX);
    name.push(timestamp.format(TIMESTAMP_FORMAT).to_string());
    PathBuf::from(name)
}

/// Copy `path` to a new timestamped backup and confirm the copy.
///
/// Returns the backup's path. The backup is compared against the source by
/// xxh3 hash before this returns.
pub fn create_backup(path: &Path) -> Result<PathBuf, BackupError> {
    let resolved = resolve_target(path);
    let path = resolved.as_path();
    if !path.is_file() {
        return Err(BackupError::NotFound(path.to_path_buf()));
    }

    let base = backup_path_for(path, &chrono::Local::now());
    let mut backup = base.clone();
    let mut attempt = 0;
    loop {
        match copy_new(path, &backup) {
            Ok(()) => break,
            Err(BackupError::AlreadyExists(_)) if attempt + 1 < MAX_SAME_SECOND => {
                attempt += 1;
                let mut name = base.clone().into_os_string();
                name.push(format!(".{attempt}"));
                backup = PathBuf::from(name);
            }
            Err(e) => return Err(e),
        }
    }

    if hash_file(path)? != hash_file(&backup)? {
        return Err(BackupError::Mismatch {
            original: path.to_path_buf(),
            backup,
        });
    }

    tracing::info!(backup = %backup.display(), "backup created");
    Ok(backup)
}

/// Existing backups of `path`, oldest first.
pub fn list_backups(path: &Path) -> Result<Vec<PathBuf>, BackupError> {
    let resolved = resolve_target(path);
    let path = resolved.as_path();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BackupError::InvalidPath(path.to_path_buf()))?;
    let prefix = format!("{file_name}{BACKUP_INFIX}");

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let entries = fs::read_dir(dir).map_err(|source| BackupError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut backups: Vec<((String, u32), PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| BackupError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(key) = name.strip_prefix(&prefix).and_then(parse_suffix) else {
            continue;
        };
        if entry.path().is_file() {
            backups.push((key, path.with_file_name(name)));
        }
    }

    backups.sort();
    Ok(backups.into_iter().map(|(_, path)| path).collect())
}

/// Most recent backup of `path`, if any.
pub fn latest_backup(path: &Path) -> Result<Option<PathBuf>, BackupError> {
    Ok(list_backups(path)?.pop())
}

/// Atomically restore `backup` over `path`. The backup itself is kept.
///
/// If `path` is a symlink, the file it points to is restored.
pub fn restore(backup: &Path, path: &Path) -> Result<(), BackupError> {
    if !backup.is_file() {
        return Err(BackupError::NotFound(backup.to_path_buf()));
    }
    let content = fs::read(backup).map_err(|source| BackupError::Io {
        path: backup.to_path_buf(),
        source,
    })?;
    atomic_write(path, &content)?;
    tracing::info!(backup = %backup.display(), target = %path.display(), "restored");
    Ok(())
}

/// Parse `YYYYMMDD_HHMMSS` or `YYYYMMDD_HHMMSS.N` into a sort key.
fn parse_suffix(suffix: &str) -> Option<(String, u32)> {
    let (stamp, seq) = match suffix.split_once('.') {
        Some((stamp, seq)) => (stamp, seq.parse().ok()?),
        None => (suffix, 0),
    };
    chrono::NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((stamp.to_string(), seq))
}

/// Copy to a path that must not exist yet.
fn copy_new(from: &Path, to: &Path) -> Result<(), BackupError> {
    let mut dest = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(to)
        .map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                BackupError::AlreadyExists(to.to_path_buf())
            } else {
                BackupError::Io {
                    path: to.to_path_buf(),
                    source,
                }
            }
        })?;
    let mut src = fs::File::open(from).map_err(|source| BackupError::Io {
        path: from.to_path_buf(),
        source,
    })?;

    io::copy(&mut src, &mut dest)
        .and_then(|_| dest.sync_all())
        .map_err(|source| BackupError::Io {
            path: to.to_path_buf(),
            source,
        })
}

fn hash_file(path: &Path) -> Result<u64, BackupError> {
    let io_err = |source: io::Error| BackupError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::open(path).map_err(io_err)?;
    let mut hasher = Xxh3::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.digest())
}
