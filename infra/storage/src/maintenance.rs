use crate::error::StorageError;
use crate::security;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::task::JoinError;
use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

/// Namespace directories sit directly under the root, files directly inside them.
const NAMESPACE_DEPTH: usize = 2;

pub(crate) async fn purge_tmp(root: &Path, max_age: Duration) -> Result<usize, StorageError> {
    let root = root.to_path_buf();
    let now = SystemTime::now();

    let (removed, failed) = tokio::task::spawn_blocking(move || remove_stale(&root, now, max_age))
        .await
        .map_err(worker_failure)?;

    if removed > 0 || failed > 0 {
        info!(removed, failed, "Cleaned up abandoned transfers");
    }
    Ok(removed)
}

fn worker_failure(err: JoinError) -> StorageError {
    StorageError::Internal {
        message: err.to_string().into(),
        context: Some("Temp file cleanup task failed".into()),
    }
}

fn remove_stale(root: &Path, now: SystemTime, max_age: Duration) -> (usize, usize) {
    let mut removed = 0;
    let mut failed = 0;

    WalkDir::new(root)
        .min_depth(NAMESPACE_DEPTH)
        .max_depth(NAMESPACE_DEPTH)
        .into_iter()
        .flatten()
        .filter(|entry| is_tmp(entry) && is_stale(entry, now, max_age))
        .for_each(|entry| match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Failed to remove temporary file");
                failed += 1;
            },
        });

    (removed, failed)
}

fn is_tmp(entry: &DirEntry) -> bool {
    entry.file_type().is_file() && entry.file_name().to_str().is_some_and(security::is_tmp_name)
}

fn is_stale(entry: &DirEntry, now: SystemTime, max_age: Duration) -> bool {
    entry
        .metadata()
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|modified| now.duration_since(modified).ok())
        .is_none_or(|age| age >= max_age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn removes_only_stale_temporaries() {
        let temp = TempDir::new().unwrap();
        let ns = temp.path().join("user_1");
        std::fs::create_dir(&ns).unwrap();
        std::fs::write(ns.join("a.png"), b"kept").unwrap();
        std::fs::write(ns.join(".amoratmp.77-1"), b"abandoned").unwrap();
        std::fs::write(temp.path().join(".root.amoratmp.9"), b"outside namespaces").unwrap();

        assert_eq!(purge_tmp(temp.path(), Duration::ZERO).await.unwrap(), 1);

        assert!(ns.join("a.png").exists());
        assert!(!ns.join(".amoratmp.77-1").exists());
        assert!(temp.path().join(".root.amoratmp.9").exists(), "root level is not a namespace");
    }

    #[tokio::test]
    async fn fresh_temporaries_survive() {
        let temp = TempDir::new().unwrap();
        let ns = temp.path().join("user_1");
        std::fs::create_dir(&ns).unwrap();
        std::fs::write(ns.join(".b.gif.amoratmp.2"), b"in flight").unwrap();

        assert_eq!(purge_tmp(temp.path(), Duration::from_secs(300)).await.unwrap(), 0);

        assert!(ns.join(".b.gif.amoratmp.2").exists());
    }

    #[tokio::test]
    async fn dead_worker_is_an_internal_error() {
        let task: tokio::task::JoinHandle<()> = tokio::spawn(async { panic!("walker died") });
        let err = task.await.unwrap_err();

        let err = worker_failure(err);

        assert!(matches!(err, StorageError::Internal { .. }));
        assert!(err.is_unavailable());
    }
}
