//! Storage backends.
//!
//! [`MediaBackend`] is the capability set the [`Storage`](crate::Storage) facade needs
//! from a place that holds bytes. The built-in local backend keeps one directory per namespace
//! under a canonical root; other backends (object storage) can slot in behind the
//! same trait.

use crate::catalog::{self, Removal};
use crate::error::{StorageError, TransferFailure};
use crate::maintenance;
use crate::namespace;
use crate::security::{FileName, NamespaceName};
use crate::transfer::{self, ByteStream};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::time::Duration;

#[async_trait]
pub trait MediaBackend: Send + Sync + fmt::Debug {
    /// Provisions the namespace if needed. Concurrent calls must all succeed.
    async fn ensure_namespace(&self, namespace: &NamespaceName) -> Result<(), StorageError>;

    /// Counts the stored files of a namespace, fresh from the backing store.
    async fn count_files(&self, namespace: &NamespaceName) -> Result<usize, StorageError>;

    /// Stores `content` under `name`, replacing a same-name file. Failures are per item.
    async fn write_file(
        &self,
        namespace: &NamespaceName,
        name: &FileName,
        content: ByteStream,
        limit: Option<u64>,
    ) -> Result<u64, TransferFailure>;

    async fn list_files(&self, namespace: &NamespaceName) -> Result<Vec<String>, StorageError>;

    async fn read_file(
        &self,
        namespace: &NamespaceName,
        name: &FileName,
    ) -> Result<Option<Bytes>, StorageError>;

    async fn delete_file(
        &self,
        namespace: &NamespaceName,
        name: &FileName,
    ) -> Result<Removal, StorageError>;

    async fn delete_namespace(&self, namespace: &NamespaceName) -> Result<Removal, StorageError>;

    /// Removes leftovers of interrupted transfers older than `max_age` and returns how
    /// many went. Individual removal failures are logged, not returned.
    async fn purge_tmp(&self, _max_age: Duration) -> Result<usize, StorageError> {
        Ok(0)
    }
}

/// Filesystem backend: `<root>/<user id>/<file name>`.
pub(crate) struct LocalBackend {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl LocalBackend {
    /// `root` must already be canonical; see [`StorageBuilder`](crate::StorageBuilder).
    pub(crate) const fn new(root: PathBuf) -> Self {
        Self { root, tmp_counter: AtomicU64::new(1) }
    }

    #[must_use]
    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    async fn existing(&self, namespace: &NamespaceName) -> Result<Option<PathBuf>, StorageError> {
        namespace::locate(&self.root, namespace).await
    }
}

impl fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBackend").field("root", &self.root).finish_non_exhaustive()
    }
}

#[async_trait]
impl MediaBackend for LocalBackend {
    async fn ensure_namespace(&self, namespace: &NamespaceName) -> Result<(), StorageError> {
        namespace::ensure_namespace(&self.root, namespace).await.map(|_| ())
    }

    async fn count_files(&self, namespace: &NamespaceName) -> Result<usize, StorageError> {
        match self.existing(namespace).await? {
            Some(dir) => catalog::count(&dir).await,
            None => Ok(0),
        }
    }

    async fn write_file(
        &self,
        namespace: &NamespaceName,
        name: &FileName,
        content: ByteStream,
        limit: Option<u64>,
    ) -> Result<u64, TransferFailure> {
        let dir = namespace::namespace_path(&self.root, namespace);
        transfer::write_stream(&dir, name, content, limit, &self.tmp_counter).await
    }

    async fn list_files(&self, namespace: &NamespaceName) -> Result<Vec<String>, StorageError> {
        match self.existing(namespace).await? {
            Some(dir) => catalog::list(&dir).await,
            None => Ok(Vec::new()),
        }
    }

    async fn read_file(
        &self,
        namespace: &NamespaceName,
        name: &FileName,
    ) -> Result<Option<Bytes>, StorageError> {
        match self.existing(namespace).await? {
            Some(dir) => catalog::read(&dir, name).await,
            None => Ok(None),
        }
    }

    async fn delete_file(
        &self,
        namespace: &NamespaceName,
        name: &FileName,
    ) -> Result<Removal, StorageError> {
        match self.existing(namespace).await? {
            Some(dir) => catalog::delete_one(&dir, name).await,
            None => Ok(Removal::NotFound),
        }
    }

    async fn delete_namespace(&self, namespace: &NamespaceName) -> Result<Removal, StorageError> {
        match self.existing(namespace).await? {
            Some(dir) => catalog::delete_all(&dir).await,
            None => Ok(Removal::NotFound),
        }
    }

    async fn purge_tmp(&self, max_age: Duration) -> Result<usize, StorageError> {
        maintenance::purge_tmp(&self.root, max_age).await
    }
}
