use crate::backend::{LocalBackend, MediaBackend};
use crate::engine::{Storage, StorageInner};
use crate::error::{StorageError, StorageErrorExt};
use crate::quota::{NamespaceLocks, QuotaMode};
use private::Sealed;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

/// Files a namespace may hold unless configured otherwise.
pub const DEFAULT_MAX_FILES: usize = 3;
/// Temporaries older than this are treated as abandoned at startup.
pub const DEFAULT_TMP_MAX_AGE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct StorageConfig {
    max_files: usize,
    quota: QuotaMode,
    max_file_bytes: Option<u64>,
    create: bool,
    tmp_max_age: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            quota: QuotaMode::default(),
            max_file_bytes: None,
            create: true,
            tmp_max_age: DEFAULT_TMP_MAX_AGE,
        }
    }
}

#[derive(Debug, Default)]
pub struct NoRoot;
#[derive(Debug)]
pub struct WithRoot(PathBuf);
pub struct WithBackend(Arc<dyn MediaBackend>);

impl fmt::Debug for WithBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WithBackend").field(&self.0).finish()
    }
}

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoRoot {}
impl Sealed for WithRoot {}
impl Sealed for WithBackend {}

#[allow(private_bounds)]
#[derive(Debug, Default)]
pub struct StorageBuilder<S: Sealed = NoRoot> {
    state: S,
    config: StorageConfig,
}

#[allow(private_bounds)]
impl<S: Sealed> StorageBuilder<S> {
    /// Maximum number of stored files per namespace.
    #[must_use = "Sets the per-namespace file ceiling"]
    pub const fn max_files(mut self, ceiling: usize) -> Self {
        self.config.max_files = ceiling;
        self
    }

    #[must_use = "Sets how the file ceiling is enforced under concurrency"]
    pub const fn quota(mut self, mode: QuotaMode) -> Self {
        self.config.quota = mode;
        self
    }

    /// Per-file size cap; `None` disables it.
    #[must_use = "Sets the maximum size of a single stored file"]
    pub const fn max_file_bytes(mut self, limit: Option<u64>) -> Self {
        self.config.max_file_bytes = limit;
        self
    }

    fn transition<N: Sealed>(self, state: N) -> StorageBuilder<N> {
        StorageBuilder { state, config: self.config }
    }

    fn assemble(config: StorageConfig, backend: Arc<dyn MediaBackend>) -> Storage {
        Storage {
            inner: Arc::new(StorageInner {
                backend,
                ceiling: config.max_files,
                quota: config.quota,
                max_file_bytes: config.max_file_bytes,
                locks: NamespaceLocks::default(),
            }),
        }
    }
}

impl StorageBuilder<NoRoot> {
    #[must_use = "Creates a new storage builder with default configuration"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "Sets the root directory that holds one directory per user"]
    pub fn root(self, path: impl Into<PathBuf>) -> StorageBuilder<WithRoot> {
        self.transition(WithRoot(path.into()))
    }

    /// Uses a caller-provided backend instead of the local filesystem.
    #[must_use = "Sets a custom storage backend"]
    pub fn backend(self, backend: Arc<dyn MediaBackend>) -> StorageBuilder<WithBackend> {
        self.transition(WithBackend(backend))
    }
}

impl StorageBuilder<WithRoot> {
    #[must_use = "Sets whether the root directory should be created if it does not exist"]
    pub const fn create(mut self, enable: bool) -> Self {
        self.config.create = enable;
        self
    }

    #[must_use = "Sets the age after which leftover temporaries are purged at startup"]
    pub const fn tmp_max_age(mut self, max_age: Duration) -> Self {
        self.config.tmp_max_age = max_age;
        self
    }

    /// Consumes the configuration and opens the local store.
    ///
    /// Boot sequence:
    /// 1. Creates the root directory if `create(true)` was set.
    /// 2. Canonicalizes the root, so namespace directories can be checked against it.
    /// 3. Removes stale temporaries left behind by interrupted transfers. Cleanup
    ///    failures are logged and never abort startup.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the root does not exist and `create`
    /// is false, or if the process cannot create or resolve it.
    pub async fn connect(self) -> Result<Storage, StorageError> {
        let root = &self.state.0;

        if self.config.create {
            fs::create_dir_all(root)
                .await
                .context(format!("Failed to bootstrap storage root: {}", root.display()))?;
        }

        let canonical = fs::canonicalize(root)
            .await
            .context(format!("Failed to resolve storage root: {}", root.display()))?;

        let backend = LocalBackend::new(canonical);
        if let Err(err) = backend.purge_tmp(self.config.tmp_max_age).await {
            warn!(error = %err, "Startup cleanup of temporaries failed");
        }

        info!(
            path = %backend.root().display(),
            max_files = self.config.max_files,
            quota = ?self.config.quota,
            "Media storage ready"
        );

        Ok(Self::assemble(self.config, Arc::new(backend)))
    }
}

impl StorageBuilder<WithBackend> {
    #[must_use = "The storage engine is not usable until you call .build()"]
    pub fn build(self) -> Storage {
        let StorageBuilder { state: WithBackend(backend), config } = self;
        Self::assemble(config, backend)
    }
}
