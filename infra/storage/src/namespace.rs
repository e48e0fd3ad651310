//! Namespace resolution: one directory per user under the storage root.
//!
//! Directories are provisioned lazily on the first write and never up front.
//! Provisioning is idempotent: losing a creation race to another task is success.

use crate::error::{StorageError, StorageErrorExt};
use crate::security::{self, NamespaceName};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Composes the namespace directory path without touching the filesystem.
pub(crate) fn namespace_path(root: &Path, namespace: &NamespaceName) -> PathBuf {
    root.join(namespace.as_ref())
}

/// Makes sure the namespace directory (and the root above it) exists.
///
/// Safe to call concurrently for the same namespace: `AlreadyExists` from a racing
/// creator counts as success. Only genuine refusals (permissions, full disk, a
/// regular file squatting on the name) surface as [`StorageError::Unavailable`].
pub(crate) async fn ensure_namespace(
    root: &Path,
    namespace: &NamespaceName,
) -> Result<PathBuf, StorageError> {
    let dir = namespace_path(root, namespace);

    match fs::create_dir(&dir).await {
        Ok(()) => info!(namespace = %namespace, "Provisioned namespace directory"),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {},
        Err(err) if err.kind() == ErrorKind::NotFound => {
            // The root itself went missing; recreate it and retry once.
            fs::create_dir_all(root)
                .await
                .context(format!("Failed to recreate storage root: {}", root.display()))?;
            match fs::create_dir(&dir).await {
                Ok(()) => info!(namespace = %namespace, "Provisioned namespace directory"),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {},
                Err(err) => {
                    return Err(err).context(format!("Failed to create namespace: {}", dir.display()));
                },
            }
        },
        Err(err) => {
            return Err(err).context(format!("Failed to create namespace: {}", dir.display()));
        },
    }

    verify_directory(root, &dir).await?;
    Ok(dir)
}

/// Resolves an existing namespace directory for read/list/delete paths.
///
/// Returns `Ok(None)` when the namespace was never provisioned (or was purged).
pub(crate) async fn locate(
    root: &Path,
    namespace: &NamespaceName,
) -> Result<Option<PathBuf>, StorageError> {
    let dir = namespace_path(root, namespace);
    match fs::symlink_metadata(&dir).await {
        Ok(_) => {
            verify_directory(root, &dir).await?;
            Ok(Some(dir))
        },
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(namespace = %namespace, "Namespace not provisioned");
            Ok(None)
        },
        Err(err) => Err(err).context(format!("Failed to inspect namespace: {}", dir.display())),
    }
}

async fn verify_directory(root: &Path, dir: &Path) -> Result<(), StorageError> {
    let canonical = fs::canonicalize(dir)
        .await
        .context(format!("Failed to resolve namespace: {}", dir.display()))?;
    security::validate_canonical(root, &canonical)?;

    let meta = fs::metadata(&canonical)
        .await
        .context(format!("Failed to inspect namespace: {}", dir.display()))?;
    if meta.is_dir() {
        Ok(())
    } else {
        Err(StorageError::Unavailable {
            source: std::io::Error::new(ErrorKind::NotADirectory, "namespace path is not a directory"),
            context: Some(dir.display().to_string().into()),
        })
    }
}
