//! Per-user media storage.
//!
//! Every user gets a lazily created namespace directory. Saves pass a file-count quota
//! gate and are streamed to disk through an atomic temp-then-rename transfer; the
//! catalog lists, reads, and deletes what is stored. All examples use temporary
//! directories.
//!
//! # Core Features
//!
//! - **Lazy Namespaces**: `<root>/<user id>/` is created on the first save, race-free.
//! - **Quota Gate**: a namespace holding `max_files` files admits nothing new, overwrites included.
//! - **Atomic Transfers**: unique temp write + `fsync` + `rename`; a cancelled upload never leaves a partial file.
//! - **Batch Saves**: per-item outcomes in submission order; one failure never aborts its siblings.
//! - **Self-Healing**: stale temporaries from crashed transfers are purged at startup.
//!
//! # Architectural Overview
//!
//! 1.  **[`Storage`]**: the thread-safe handle and entry point.
//! 2.  **[`UserMedia`]**: a view scoped to one validated user id.
//! 3.  **[`StorageBuilder`]**: a type-state builder for the local store or a custom [`MediaBackend`].
//!
//! # Examples
//!
//! ```rust
//! use amora_storage::{Storage, StorageError, TransferFailure, Upload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StorageError> {
//!     # let tmp = tempfile::tempdir().unwrap();
//!     # let root = tmp.path().join("uploads");
//!     let storage = Storage::builder().root(&root).max_files(2).connect().await?;
//!
//!     let report = storage
//!         .save_many("user_1", vec![
//!             Upload::from_bytes("a.png", &b"a"[..]),
//!             Upload::from_bytes("b.gif", &b"b"[..]),
//!             Upload::from_bytes("c.jpg", &b"c"[..]),
//!         ])
//!         .await?;
//!
//!     assert_eq!(report.stored_count(), 2);
//!     assert!(matches!(
//!         report.outcomes()[2].failure(),
//!         Some(TransferFailure::QuotaExceeded { ceiling: 2 })
//!     ));
//!     assert_eq!(storage.list_files("user_1").await?, ["a.png", "b.gif"]);
//!     Ok(())
//! }
//! ```

mod backend;
mod builder;
mod catalog;
mod engine;
mod error;
mod maintenance;
mod media_type;
mod namespace;
mod quota;
mod security;
mod transfer;

pub use backend::MediaBackend;
pub use builder::{DEFAULT_MAX_FILES, DEFAULT_TMP_MAX_AGE, StorageBuilder};
pub use catalog::Removal;
pub use engine::{MediaFile, Storage, StorageInner, UserMedia};
pub use error::{StorageError, StorageErrorExt, TransferFailure};
pub use media_type::MediaType;
pub use quota::{Admission, QuotaMode, admit};
pub use security::{FileName, NamespaceName};
pub use transfer::{BatchReport, ByteStream, ItemOutcome, Upload};
