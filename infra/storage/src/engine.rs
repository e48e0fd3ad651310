//! The [`Storage`] facade: quota-gated saves and catalog access per user.
//!
//! Every operation validates the user id first, then runs against the configured
//! [`MediaBackend`]. Saves go namespace → quota gate → transfer; reads, lists and deletes
//! go straight to the catalog and never provision a namespace.

use crate::backend::MediaBackend;
use crate::builder::StorageBuilder;
use crate::catalog::Removal;
use crate::error::{StorageError, TransferFailure};
use crate::media_type::MediaType;
use crate::quota::{self, Admission, NamespaceLocks, QuotaMode};
use crate::security::{FileName, NamespaceName};
use crate::transfer::{BatchReport, ItemOutcome, Upload};
use bytes::Bytes;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// A stored file returned by [`Storage::read_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub name: String,
    pub bytes: Bytes,
    /// `None` when the extension is not a known image type.
    pub media_type: Option<MediaType>,
}

/// The internal shared state of a [`Storage`] instance.
#[derive(Debug)]
pub struct StorageInner {
    pub(crate) backend: Arc<dyn MediaBackend>,
    /// Maximum number of files a namespace may hold.
    pub(crate) ceiling: usize,
    pub(crate) quota: QuotaMode,
    pub(crate) max_file_bytes: Option<u64>,
    pub(crate) locks: NamespaceLocks,
}

impl StorageInner {
    #[must_use]
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    #[must_use]
    pub const fn quota_mode(&self) -> QuotaMode {
        self.quota
    }
}

/// Thread-safe handle to the media store. Cheap to clone; all clones share one backend.
///
/// # Example
///
/// ```rust
/// use amora_storage::{Storage, StorageError, Upload};
///
/// #[tokio::main]
/// async fn main() -> Result<(), StorageError> {
///     # let tmp = tempfile::tempdir().unwrap();
///     let storage = Storage::builder().root(tmp.path().join("uploads")).max_files(3).connect().await?;
///
///     let outcome = storage.save_one("user_1", Upload::from_bytes("avatar.png", &b"png"[..])).await?;
///     assert!(outcome.is_stored());
///
///     let file = storage.read_file("user_1", "avatar.png").await?.expect("just written");
///     assert_eq!(file.media_type.map(|m| m.as_str()), Some("image/png"));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Storage {
    pub(crate) inner: Arc<StorageInner>,
}

impl Deref for Storage {
    type Target = StorageInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Storage {
    #[must_use = "The storage engine is not initialized until you call .connect()"]
    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    /// Returns a view scoped to one user's namespace.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidName`] when the id is not a plain identifier.
    pub fn user(&self, user_id: &str) -> Result<UserMedia, StorageError> {
        Ok(UserMedia { storage: self.clone(), namespace: NamespaceName::try_from(user_id)? })
    }

    /// Provisions the user's namespace directory if it does not exist yet.
    pub async fn ensure_namespace(&self, user_id: &str) -> Result<(), StorageError> {
        self.user(user_id)?.ensure().await
    }

    /// Provisions the namespace and checks whether `file_count` more files fit.
    ///
    /// Advisory: the answer may be stale by the time a write happens.
    pub async fn ensure_and_admit(
        &self,
        user_id: &str,
        file_count: usize,
    ) -> Result<Admission, StorageError> {
        self.user(user_id)?.ensure_and_admit(file_count).await
    }

    pub async fn save_one(&self, user_id: &str, upload: Upload) -> Result<ItemOutcome, StorageError> {
        self.user(user_id)?.save(upload).await
    }

    pub async fn save_many(
        &self,
        user_id: &str,
        uploads: Vec<Upload>,
    ) -> Result<BatchReport, StorageError> {
        self.user(user_id)?.save_all(uploads).await
    }

    pub async fn list_files(&self, user_id: &str) -> Result<Vec<String>, StorageError> {
        self.user(user_id)?.list().await
    }

    pub async fn read_file(
        &self,
        user_id: &str,
        file_name: &str,
    ) -> Result<Option<MediaFile>, StorageError> {
        self.user(user_id)?.read(file_name).await
    }

    pub async fn delete_file(&self, user_id: &str, file_name: &str) -> Result<Removal, StorageError> {
        self.user(user_id)?.delete(file_name).await
    }

    pub async fn delete_namespace(&self, user_id: &str) -> Result<Removal, StorageError> {
        self.user(user_id)?.delete_all().await
    }

    /// Removes temporaries of interrupted transfers older than `max_age`.
    /// Returns how many were removed.
    ///
    /// # Errors
    /// [`StorageError::Internal`] if the cleanup worker dies.
    pub async fn purge_tmp(&self, max_age: Duration) -> Result<usize, StorageError> {
        self.backend.purge_tmp(max_age).await
    }

    /// Content type for a file name, by extension.
    #[must_use]
    pub fn media_type(file_name: &str) -> Option<MediaType> {
        MediaType::from_file_name(file_name)
    }
}

/// One user's namespace. Obtained from [`Storage::user`].
#[derive(Debug, Clone)]
pub struct UserMedia {
    storage: Storage,
    namespace: NamespaceName,
}

impl UserMedia {
    #[must_use]
    pub const fn namespace(&self) -> &NamespaceName {
        &self.namespace
    }

    pub async fn ensure(&self) -> Result<(), StorageError> {
        self.storage.backend.ensure_namespace(&self.namespace).await
    }

    pub async fn ensure_and_admit(&self, file_count: usize) -> Result<Admission, StorageError> {
        self.ensure().await?;
        self.admission(file_count).await
    }

    /// Stores one file if the namespace has room.
    ///
    /// # Errors
    /// Only namespace-level failures are errors; quota rejection and transfer
    /// problems come back inside the [`ItemOutcome`].
    pub async fn save(&self, upload: Upload) -> Result<ItemOutcome, StorageError> {
        let (name, content) = upload.into_parts();
        let file_name = match FileName::parse(&name) {
            Ok(file_name) => file_name,
            Err(reason) => return Ok(self.refuse_name(name, reason)),
        };

        // Provision under the guard so a concurrent purge cannot slip in between.
        let _guard = self.strict_guard().await;
        self.ensure().await?;

        if !self.admission(1).await?.is_admitted() {
            return Ok(self.over_quota(name));
        }

        Ok(self.transfer(name, &file_name, content).await)
    }

    /// Stores a batch, item by item, in submission order.
    ///
    /// The quota gate is re-evaluated before every item. Once it rejects, every
    /// remaining item fails with [`TransferFailure::QuotaExceeded`] without being
    /// attempted. Item failures never abort the batch.
    ///
    /// # Errors
    /// Fails as a whole only when the namespace cannot be provisioned or when the very
    /// first quota evaluation cannot list it. A listing failure later in the batch
    /// marks the affected and remaining items [`TransferFailure::Unavailable`] and keeps
    /// the outcomes gathered so far.
    pub async fn save_all(&self, uploads: Vec<Upload>) -> Result<BatchReport, StorageError> {
        if uploads.is_empty() {
            debug!(namespace = %self.namespace, "Empty batch submitted");
            return Ok(BatchReport::Empty);
        }

        let _guard = self.strict_guard().await;
        self.ensure().await?;

        let mut outcomes = Vec::with_capacity(uploads.len());
        let mut halted: Option<Halt> = None;

        for (index, upload) in uploads.into_iter().enumerate() {
            let (name, content) = upload.into_parts();

            if let Some(halt) = &halted {
                outcomes.push(ItemOutcome::failed(name, halt.failure(self.ceiling)));
                continue;
            }

            match self.admission(1).await {
                Ok(Admission::Admitted { .. }) => {},
                Ok(Admission::Rejected) => {
                    halted = Some(Halt::Quota);
                    outcomes.push(self.over_quota(name));
                    continue;
                },
                Err(err) if index == 0 => return Err(err),
                Err(err) => {
                    warn!(namespace = %self.namespace, error = %err, "Quota check failed mid-batch");
                    let halt = Halt::Unavailable(err.to_string());
                    outcomes.push(ItemOutcome::failed(name, halt.failure(self.ceiling)));
                    halted = Some(halt);
                    continue;
                },
            }

            match FileName::parse(&name) {
                Ok(file_name) => outcomes.push(self.transfer(name, &file_name, content).await),
                Err(reason) => outcomes.push(self.refuse_name(name, reason)),
            }
        }

        let report = BatchReport::Processed(outcomes);
        info!(
            namespace = %self.namespace,
            submitted = report.outcomes().len(),
            stored = report.stored_count(),
            "Batch upload processed"
        );
        Ok(report)
    }

    pub async fn list(&self) -> Result<Vec<String>, StorageError> {
        self.storage.backend.list_files(&self.namespace).await
    }

    /// Reads a stored file and annotates it with its media type.
    ///
    /// # Errors
    /// [`StorageError::InvalidName`] for names that could never have been stored.
    pub async fn read(&self, file_name: &str) -> Result<Option<MediaFile>, StorageError> {
        let name = FileName::try_from(file_name)?;
        let bytes = self.storage.backend.read_file(&self.namespace, &name).await?;

        Ok(bytes.map(|bytes| MediaFile {
            media_type: MediaType::from_file_name(name.as_str()),
            name: name.as_str().to_owned(),
            bytes,
        }))
    }

    pub async fn delete(&self, file_name: &str) -> Result<Removal, StorageError> {
        let name = FileName::try_from(file_name)?;
        let removal = self.storage.backend.delete_file(&self.namespace, &name).await?;
        match removal {
            Removal::Deleted => info!(namespace = %self.namespace, file = %name, "Deleted file"),
            Removal::NotFound => debug!(namespace = %self.namespace, file = %name, "Nothing to delete"),
        }
        Ok(removal)
    }

    /// Removes the whole namespace. The next save provisions it again.
    pub async fn delete_all(&self) -> Result<Removal, StorageError> {
        let _guard = self.strict_guard().await;
        let removal = self.storage.backend.delete_namespace(&self.namespace).await?;
        if removal.is_deleted() {
            info!(namespace = %self.namespace, "Purged namespace");
        }
        Ok(removal)
    }

    async fn admission(&self, requested: usize) -> Result<Admission, StorageError> {
        let current = self.storage.backend.count_files(&self.namespace).await?;
        let admission = quota::admit(current, self.ceiling, requested);
        debug!(
            namespace = %self.namespace,
            current,
            ceiling = self.ceiling,
            admitted = admission.is_admitted(),
            "Quota evaluated"
        );
        Ok(admission)
    }

    async fn transfer(
        &self,
        name: String,
        file_name: &FileName,
        content: crate::transfer::ByteStream,
    ) -> ItemOutcome {
        match self
            .storage
            .backend
            .write_file(&self.namespace, file_name, content, self.max_file_bytes)
            .await
        {
            Ok(bytes) => {
                info!(namespace = %self.namespace, file = %file_name, bytes, "Stored file");
                ItemOutcome::stored(name, bytes)
            },
            Err(failure) => {
                warn!(
                    namespace = %self.namespace,
                    file = %file_name,
                    reason = failure.kind(),
                    error = %failure,
                    "Transfer failed"
                );
                ItemOutcome::failed(name, failure)
            },
        }
    }

    fn over_quota(&self, name: String) -> ItemOutcome {
        info!(namespace = %self.namespace, file = %name, ceiling = self.ceiling, "Quota exceeded");
        ItemOutcome::failed(name, TransferFailure::QuotaExceeded { ceiling: self.ceiling })
    }

    fn refuse_name(&self, name: String, reason: std::borrow::Cow<'static, str>) -> ItemOutcome {
        warn!(namespace = %self.namespace, file = %name, %reason, "Rejected file name");
        ItemOutcome::failed(name, TransferFailure::InvalidName { reason })
    }

    async fn strict_guard(&self) -> Option<OwnedMutexGuard<()>> {
        match self.quota {
            QuotaMode::Strict => Some(self.storage.locks.acquire(self.namespace.as_ref()).await),
            QuotaMode::Advisory => None,
        }
    }
}

impl Deref for UserMedia {
    type Target = StorageInner;

    fn deref(&self) -> &Self::Target {
        &self.storage.inner
    }
}

/// Why a batch stopped attempting items.
enum Halt {
    Quota,
    Unavailable(String),
}

impl Halt {
    fn failure(&self, ceiling: usize) -> TransferFailure {
        match self {
            Self::Quota => TransferFailure::QuotaExceeded { ceiling },
            Self::Unavailable(message) => TransferFailure::Unavailable { message: message.clone().into() },
        }
    }
}
