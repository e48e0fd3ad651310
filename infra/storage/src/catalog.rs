//! Catalog access: listing, reading, and deleting stored files.
//!
//! Nothing is cached; every call reads the directory afresh.

use crate::error::{StorageError, StorageErrorExt};
use crate::security::{self, FileName};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// Outcome of a delete. Deleting something absent is a normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    NotFound,
}

impl Removal {
    #[must_use]
    pub const fn is_deleted(self) -> bool {
        matches!(self, Self::Deleted)
    }
}

/// Names of the stored files in `dir`, sorted. In-flight temporaries and anything
/// that is not a regular file are skipped. A missing directory lists as empty.
pub(crate) async fn list(dir: &Path) -> Result<Vec<String>, StorageError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).context(format!("Failed to list namespace: {}", dir.display()));
        },
    };

    let mut names = Vec::new();
    while let Some(entry) =
        entries.next_entry().await.context(format!("Failed to list namespace: {}", dir.display()))?
    {
        let Ok(name) = entry.file_name().into_string() else { continue };
        if security::is_tmp_name(&name) {
            continue;
        }
        // Entries may vanish between the listing and the type check.
        match entry.file_type().await {
            Ok(kind) if kind.is_file() => names.push(name),
            Ok(_) => {},
            Err(err) if err.kind() == ErrorKind::NotFound => {},
            Err(err) => {
                return Err(err).context(format!("Failed to inspect entry in {}", dir.display()));
            },
        }
    }

    names.sort_unstable();
    Ok(names)
}

/// The quota counter: how many stored files `dir` holds right now.
pub(crate) async fn count(dir: &Path) -> Result<usize, StorageError> {
    list(dir).await.map(|names| names.len())
}

pub(crate) async fn read(dir: &Path, name: &FileName) -> Result<Option<Bytes>, StorageError> {
    let path = dir.join(name);
    match fs::read(&path).await {
        Ok(data) => Ok(Some(Bytes::from(data))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).context(format!("Failed to read: {}", path.display())),
    }
}

pub(crate) async fn delete_one(dir: &Path, name: &FileName) -> Result<Removal, StorageError> {
    let path = dir.join(name);
    match fs::remove_file(&path).await {
        Ok(()) => Ok(Removal::Deleted),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Removal::NotFound),
        Err(err) => Err(err).context(format!("Failed to delete: {}", path.display())),
    }
}

/// Removes the namespace directory with everything inside it.
pub(crate) async fn delete_all(dir: &Path) -> Result<Removal, StorageError> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(Removal::Deleted),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Removal::NotFound),
        Err(err) => Err(err).context(format!("Failed to purge namespace: {}", dir.display())),
    }
}
