//! The transfer engine: streams uploaded payloads into a namespace.
//!
//! Bytes land in a hidden temporary in the same directory first and are renamed over the target only
//! after a full `fsync`, so a same-name overwrite is all-or-nothing. The temporary is
//! owned by a [`TempFile`] guard that unlinks it on every exit path, including the
//! caller dropping the future mid-stream.

use crate::error::TransferFailure;
use crate::security::{FileName, TMP_MARKER};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Inbound file content, delivered chunk by chunk.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// A named payload submitted for storage.
pub struct Upload {
    name: String,
    content: ByteStream,
}

impl Upload {
    /// The name is used verbatim as the storage key; it is validated at transfer time.
    pub fn new(name: impl Into<String>, content: ByteStream) -> Self {
        Self { name: name.into(), content }
    }

    /// Wraps an in-memory payload as a single-chunk stream.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::new(name, stream::once(async move { Ok(bytes) }).boxed())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (String, ByteStream) {
        (self.name, self.content)
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload").field("name", &self.name).finish_non_exhaustive()
    }
}

/// The result of one file of a save request.
#[derive(Debug)]
pub struct ItemOutcome {
    pub name: String,
    /// Bytes stored on success.
    pub result: Result<u64, TransferFailure>,
}

impl ItemOutcome {
    pub(crate) fn stored(name: String, bytes: u64) -> Self {
        Self { name, result: Ok(bytes) }
    }

    pub(crate) fn failed(name: String, failure: TransferFailure) -> Self {
        Self { name, result: Err(failure) }
    }

    #[must_use]
    pub const fn is_stored(&self) -> bool {
        self.result.is_ok()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&TransferFailure> {
        self.result.as_ref().err()
    }
}

/// Outcomes of a multi-file request, in submission order.
#[derive(Debug)]
pub enum BatchReport {
    /// Nothing was submitted. Distinct from a batch in which every item failed.
    Empty,
    Processed(Vec<ItemOutcome>),
}

impl BatchReport {
    #[must_use]
    pub fn outcomes(&self) -> &[ItemOutcome] {
        match self {
            Self::Empty => &[],
            Self::Processed(items) => items,
        }
    }

    #[must_use]
    pub fn stored_count(&self) -> usize {
        self.outcomes().iter().filter(|item| item.is_stored()).count()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Unlinks the temporary file unless the transfer committed it.
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    const fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Failure path only: one unlink of a file this task created. It stays
        // synchronous so the temporary is gone by the time the guard is.
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Discarded unfinished transfer"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {},
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Failed to discard temporary file");
            },
        }
    }
}

/// `.amoratmp.<pid>-<n>`: fixed width overhead, so any valid name can be staged.
fn tmp_path(dir: &Path, counter: &AtomicU64) -> PathBuf {
    let id = counter.fetch_add(1, Ordering::Relaxed);
    dir.join(format!("{TMP_MARKER}{}-{id}", std::process::id()))
}

/// Streams `content` into `dir/name`, replacing any existing file of that name.
///
/// Returns the number of bytes stored. Stream errors that look like a client abort
/// become [`TransferFailure::Cancelled`]; `limit` caps the payload size.
pub(crate) async fn write_stream(
    dir: &Path,
    name: &FileName,
    mut content: ByteStream,
    limit: Option<u64>,
    counter: &AtomicU64,
) -> Result<u64, TransferFailure> {
    let target = dir.join(name);
    let mut temp = TempFile::new(tmp_path(dir, counter));

    let mut written = 0_u64;
    {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp.path)
            .await
            .map_err(|source| TransferFailure::Io { source })?;

        while let Some(chunk) = content.next().await {
            let chunk = chunk.map_err(TransferFailure::from_stream)?;
            written += chunk.len() as u64;
            if let Some(limit) = limit.filter(|&limit| written > limit) {
                return Err(TransferFailure::TooLarge { limit });
            }
            file.write_all(&chunk).await.map_err(|source| TransferFailure::Io { source })?;
        }

        file.flush().await.map_err(|source| TransferFailure::Io { source })?;
        file.sync_all().await.map_err(|source| TransferFailure::Io { source })?;
    }

    fs::rename(&temp.path, &target).await.map_err(|source| TransferFailure::Io { source })?;
    temp.disarm();

    sync_dir(dir).await;
    Ok(written)
}

async fn sync_dir(path: &Path) {
    match fs::File::open(path).await {
        Ok(dir) => {
            if let Err(err) = dir.sync_all().await {
                warn!(path = %path.display(), error = %err, "Directory sync failed");
            }
        },
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Directory open failed");
        },
    }
}
