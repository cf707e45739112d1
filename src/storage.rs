//! File storage and staged commits.
//!
//! All file traffic of an export goes through the [`Storage`] trait:
//! listing source folders, copying assets, moving staged files into place.
//! [`LocalStorage`] is the filesystem implementation.
//!
//! Outputs are never written straight into a target folder. Each export
//! invocation writes into a [`Staging`] directory created *inside* the
//! target folder (so the final move is a same-filesystem rename), and
//! [`Staging::commit`] moves everything across in one batch. Dropping a
//! `Staging` without committing removes it together with its contents,
//! which is how an aborted export leaves the target folder untouched.

use crate::naming::{FileNameMapper, source_stem};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot list {}: {source}", path.display())]
    List {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("cannot {op} {} to {}: {source}", from.display(), to.display())]
    Transfer {
        op: &'static str,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File operations the exporters rely on.
pub trait Storage: Sync {
    /// Regular files directly inside `dir`, sorted by name. A missing
    /// directory lists as empty.
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError>;
    /// Copy a file, creating the destination folder and replacing an
    /// existing destination file.
    fn copy(&self, from: &Path, to: &Path) -> Result<(), StorageError>;
    /// Move a file, replacing an existing destination file.
    fn move_file(&self, from: &Path, to: &Path) -> Result<(), StorageError>;
    fn delete(&self, path: &Path) -> Result<(), StorageError>;
    fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }
}

fn transfer(op: &'static str, from: &Path, to: &Path) -> impl FnOnce(std::io::Error) -> StorageError {
    let (from, to) = (from.to_path_buf(), to.to_path_buf());
    move |source| StorageError::Transfer { op, from, to, source }
}

fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

impl Storage for LocalStorage {
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| StorageError::List {
                path: dir.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        ensure_parent(to)?;
        fs::copy(from, to).map_err(transfer("copy", from, to))?;
        Ok(())
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        ensure_parent(to)?;
        if fs::rename(from, to).is_ok() {
            return Ok(());
        }
        // Cross-device: copy then remove
        fs::copy(from, to).map_err(transfer("move", from, to))?;
        fs::remove_file(from)?;
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<(), StorageError> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

// =============================================================================
// Staging
// =============================================================================

/// Temporary output folder for one export invocation.
pub struct Staging {
    dir: TempDir,
    target: PathBuf,
}

impl Staging {
    /// Create a staging folder inside `target`, creating `target` if needed.
    pub fn new(target: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(target)?;
        let dir = tempfile::Builder::new()
            .prefix(".export-")
            .tempdir_in(target)?;
        debug!(staging = %dir.path().display(), "created staging directory");
        Ok(Self {
            dir,
            target: target.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Path of a staged file.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a staged file and return its path.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf, StorageError> {
        let path = self.file(name);
        fs::write(&path, contents)?;
        debug!(file = name, "staged");
        Ok(path)
    }

    /// Names of the files staged so far, sorted.
    pub fn staged(&self, storage: &dyn Storage) -> Result<Vec<String>, StorageError> {
        Ok(storage
            .list(self.path())?
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect())
    }

    /// Move every staged file into the target folder and remove the
    /// staging folder. Returns the committed paths.
    pub fn commit(self, storage: &dyn Storage) -> Result<Vec<PathBuf>, StorageError> {
        let mut committed = Vec::new();
        for file in storage.list(self.path())? {
            let Some(name) = file.file_name() else {
                continue;
            };
            let dest = self.target.join(name);
            storage.move_file(&file, &dest)?;
            committed.push(dest);
        }
        info!(
            target = %self.target.display(),
            files = committed.len(),
            "committed export"
        );
        Ok(committed)
    }
}

/// Copy the files of `source_dir` whose stem has an export name to
/// `dest_dir` as `{exportName}.{ext}`. Files that are not mapped are skipped.
/// Returns the number of files copied.
pub fn copy_mapped_assets(
    storage: &dyn Storage,
    source_dir: &Path,
    ext: &str,
    mapper: &FileNameMapper,
    dest_dir: &Path,
) -> Result<usize, StorageError> {
    let mut copied = 0;
    for file in storage.list(source_dir)? {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Ok(stem) = source_stem(&name) else {
            warn!(file = %file.display(), "skipping file without extension");
            continue;
        };
        let Some(export_name) = mapper.get(stem) else {
            continue;
        };
        storage.copy(&file, &dest_dir.join(format!("{export_name}.{ext}")))?;
        copied += 1;
    }
    debug!(source = %source_dir.display(), ext, copied, "copied mapped assets");
    Ok(copied)
}
