use amora_storage::*;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

async fn open(temp: &TempDir, max_files: usize) -> Storage {
    Storage::builder().root(temp.path().join("uploads")).max_files(max_files).connect().await.unwrap()
}

fn png(name: &str) -> Upload {
    Upload::from_bytes(name.to_owned(), Bytes::from(format!("payload of {name}")))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ensure_creates_one_directory() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let storage = storage.clone();
            tokio::spawn(async move { storage.ensure_namespace("user_1").await })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let dirs: Vec<_> = std::fs::read_dir(temp.path().join("uploads")).unwrap().collect();
    assert_eq!(dirs.len(), 1);
    assert!(temp.path().join("uploads/user_1").is_dir());
}

#[tokio::test]
async fn test_rejection_at_ceiling_leaves_namespace_untouched() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 2).await;

    for name in ["a.png", "b.png"] {
        assert!(storage.save_one("user_1", png(name)).await.unwrap().is_stored());
    }

    assert_eq!(storage.ensure_and_admit("user_1", 1).await.unwrap(), Admission::Rejected);

    let outcome = storage.save_one("user_1", png("c.png")).await.unwrap();
    assert!(matches!(outcome.failure(), Some(TransferFailure::QuotaExceeded { ceiling: 2 })));

    // Admission does not look at names: an overwrite at the ceiling is refused too.
    let overwrite = storage.save_one("user_1", Upload::from_bytes("a.png", &b"new"[..])).await.unwrap();
    assert!(!overwrite.is_stored());

    assert_eq!(storage.list_files("user_1").await.unwrap(), ["a.png", "b.png"]);
    let kept = storage.read_file("user_1", "a.png").await.unwrap().unwrap();
    assert_eq!(kept.bytes, Bytes::from("payload of a.png"));
}

#[tokio::test]
async fn test_admission_reports_remaining_slots() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;

    assert_eq!(
        storage.ensure_and_admit("user_1", 5).await.unwrap(),
        Admission::Admitted { slots: 3 }
    );
    storage.save_one("user_1", png("a.png")).await.unwrap();
    assert_eq!(
        storage.ensure_and_admit("user_1", 1).await.unwrap(),
        Admission::Admitted { slots: 1 }
    );
}

#[tokio::test]
async fn test_write_then_read_returns_bytes_and_media_type() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;

    let outcome = storage.save_one("user_1", png("photo.jpeg")).await.unwrap();
    assert_eq!(outcome.result.as_ref().ok(), Some(&("payload of photo.jpeg".len() as u64)));

    let file = storage.read_file("user_1", "photo.jpeg").await.unwrap().unwrap();
    assert_eq!(file.name, "photo.jpeg");
    assert_eq!(file.bytes, Bytes::from("payload of photo.jpeg"));
    assert_eq!(file.media_type, Some(MediaType::Jpeg));

    assert!(storage.read_file("user_1", "missing.png").await.unwrap().is_none());
    assert!(storage.read_file("ghost", "photo.jpeg").await.unwrap().is_none());
}

#[tokio::test]
async fn test_streamed_upload_in_chunks() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;

    let chunks = futures::stream::iter(["ab", "cd", "ef"].map(|c| Ok(Bytes::from_static(c.as_bytes()))));
    let outcome = storage.save_one("user_1", Upload::new("seq.gif", chunks.boxed())).await.unwrap();

    assert_eq!(outcome.result.as_ref().ok(), Some(&6));
    let file = storage.read_file("user_1", "seq.gif").await.unwrap().unwrap();
    assert_eq!(file.bytes, Bytes::from_static(b"abcdef"));
}

#[tokio::test]
async fn test_cancelled_transfer_is_reported_and_not_listed() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;

    let broken = futures::stream::iter([
        Ok(Bytes::from_static(b"half")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
    ]);
    let outcome = storage.save_one("user_1", Upload::new("a.png", broken.boxed())).await.unwrap();

    assert!(matches!(outcome.failure(), Some(TransferFailure::Cancelled { .. })));
    assert!(storage.list_files("user_1").await.unwrap().is_empty());
    let leftovers = std::fs::read_dir(temp.path().join("uploads/user_1")).unwrap().count();
    assert_eq!(leftovers, 0, "no temporary may survive a cancelled transfer");
}

#[tokio::test]
async fn test_delete_one_and_missing_file() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;

    storage.save_one("user_1", png("a.png")).await.unwrap();
    storage.save_one("user_1", png("b.png")).await.unwrap();

    assert_eq!(storage.delete_file("user_1", "a.png").await.unwrap(), Removal::Deleted);
    assert_eq!(storage.delete_file("user_1", "a.png").await.unwrap(), Removal::NotFound);
    assert_eq!(storage.delete_file("ghost", "a.png").await.unwrap(), Removal::NotFound);
    assert_eq!(storage.list_files("user_1").await.unwrap(), ["b.png"]);
}

#[tokio::test]
async fn test_delete_namespace_then_recreate_empty() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;

    storage.save_one("user_1", png("a.png")).await.unwrap();
    storage.save_one("user_1", png("b.png")).await.unwrap();

    assert_eq!(storage.delete_namespace("user_1").await.unwrap(), Removal::Deleted);
    assert!(!temp.path().join("uploads/user_1").exists());
    assert_eq!(storage.delete_namespace("user_1").await.unwrap(), Removal::NotFound);

    storage.ensure_namespace("user_1").await.unwrap();
    assert!(temp.path().join("uploads/user_1").is_dir());
    assert!(storage.list_files("user_1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reads_do_not_provision_namespaces() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;

    assert!(storage.list_files("user_9").await.unwrap().is_empty());
    assert!(storage.read_file("user_9", "a.png").await.unwrap().is_none());
    assert!(!temp.path().join("uploads/user_9").exists());
}

#[tokio::test]
async fn test_sequential_saves_stop_at_ceiling() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;

    let mut stored = Vec::new();
    for name in ["f1", "f2", "f3", "f4", "f5"] {
        let outcome = storage.save_one("user_1", png(name)).await.unwrap();
        match outcome.result {
            Ok(_) => stored.push(outcome.name),
            Err(failure) => assert!(matches!(failure, TransferFailure::QuotaExceeded { ceiling: 3 })),
        }
    }

    assert_eq!(stored, ["f1", "f2", "f3"]);
    assert_eq!(storage.list_files("user_1").await.unwrap(), ["f1", "f2", "f3"]);
}

#[tokio::test]
async fn test_batch_stores_first_k_in_order() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;
    storage.save_one("user_1", png("old.png")).await.unwrap();

    let batch = ["a.png", "b.gif", "c.jpg", "d.png"].map(png).into();
    let report = storage.save_many("user_1", batch).await.unwrap();

    let kinds: Vec<_> = report
        .outcomes()
        .iter()
        .map(|item| (item.name.as_str(), item.failure().map(TransferFailure::kind)))
        .collect();
    assert_eq!(
        kinds,
        [
            ("a.png", None),
            ("b.gif", None),
            ("c.jpg", Some("quotaExceeded")),
            ("d.png", Some("quotaExceeded")),
        ]
    );
    assert_eq!(report.stored_count(), 2);
    assert_eq!(storage.list_files("user_1").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_batch_item_failures_do_not_abort_siblings() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 5).await;

    let broken = futures::stream::iter([Err(io::Error::other("disk hiccup"))]).boxed();
    let batch = vec![png("a.png"), png("../escape.png"), Upload::new("b.png", broken), png("c.png")];
    let report = storage.save_many("user_1", batch).await.unwrap();

    let outcomes = report.outcomes();
    assert!(outcomes[0].is_stored());
    assert!(matches!(outcomes[1].failure(), Some(TransferFailure::InvalidName { .. })));
    assert!(matches!(outcomes[2].failure(), Some(TransferFailure::Io { .. })));
    assert!(outcomes[3].is_stored());
    assert_eq!(storage.list_files("user_1").await.unwrap(), ["a.png", "c.png"]);
    assert!(!temp.path().join("uploads/escape.png").exists());
}

#[tokio::test]
async fn test_empty_batch_is_distinct() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;

    let report = storage.save_many("user_1", Vec::new()).await.unwrap();
    assert!(report.is_empty());
    assert!(report.outcomes().is_empty());
    assert!(!temp.path().join("uploads/user_1").exists(), "an empty batch performs no I/O");
}

#[tokio::test]
async fn test_invalid_names_are_rejected() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;

    for user in ["", "..", "a/b", "user 1", "x\0y"] {
        assert!(matches!(
            storage.ensure_namespace(user).await,
            Err(StorageError::InvalidName { .. })
        ));
    }

    for file in ["../etc/passwd", "a/b.png", "..", ".hidden"] {
        assert!(matches!(
            storage.read_file("user_1", file).await,
            Err(StorageError::InvalidName { .. })
        ));
        let outcome = storage.save_one("user_1", png(file)).await.unwrap();
        assert_eq!(outcome.failure().map(TransferFailure::kind), Some("invalidName"));
    }
}

#[tokio::test]
async fn test_too_large_is_discarded() {
    let temp = TempDir::new().unwrap();
    let storage = Storage::builder()
        .root(temp.path())
        .max_file_bytes(Some(4))
        .connect()
        .await
        .unwrap();

    let outcome = storage.save_one("user_1", Upload::from_bytes("big.png", &b"12345"[..])).await.unwrap();
    assert!(matches!(outcome.failure(), Some(TransferFailure::TooLarge { limit: 4 })));
    assert!(storage.list_files("user_1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_without_create_fails_on_missing_root() {
    let temp = TempDir::new().unwrap();
    let result = Storage::builder().root(temp.path().join("absent")).create(false).connect().await;
    assert!(matches!(result, Err(StorageError::Unavailable { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_strict_mode_holds_the_ceiling_under_concurrency() {
    let temp = TempDir::new().unwrap();
    let storage = Storage::builder()
        .root(temp.path())
        .max_files(3)
        .quota(QuotaMode::Strict)
        .connect()
        .await
        .unwrap();

    let tasks: Vec<_> = (0..12)
        .map(|i| {
            let storage = storage.clone();
            tokio::spawn(async move { storage.save_one("user_1", png(&format!("f{i}.png"))).await })
        })
        .collect();

    let mut stored = 0;
    for task in tasks {
        if task.await.unwrap().unwrap().is_stored() {
            stored += 1;
        }
    }

    assert_eq!(stored, 3);
    assert_eq!(storage.list_files("user_1").await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_strict_save_racing_a_purge_recreates_the_namespace() {
    let temp = TempDir::new().unwrap();
    let storage = Storage::builder()
        .root(temp.path())
        .max_files(3)
        .quota(QuotaMode::Strict)
        .connect()
        .await
        .unwrap();

    for round in 0..50 {
        storage.save_one("user_1", png("seed.png")).await.unwrap();

        let saver = storage.clone();
        let save = tokio::spawn(async move { saver.save_one("user_1", png("a.png")).await });
        let purger = storage.clone();
        let purge = tokio::spawn(async move { purger.delete_namespace("user_1").await });

        let outcome = save.await.unwrap().unwrap();
        purge.await.unwrap().unwrap();
        assert!(outcome.is_stored(), "round {round}: {:?}", outcome.failure());
        storage.delete_namespace("user_1").await.unwrap();
    }
}

#[tokio::test]
async fn test_longest_valid_name_round_trips() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;
    let longest = format!("{}.png", "n".repeat(251));
    assert_eq!(longest.len(), 255);

    let outcome = storage.save_one("user_1", png(&longest)).await.unwrap();

    assert!(outcome.is_stored(), "{:?}", outcome.failure());
    assert_eq!(storage.list_files("user_1").await.unwrap(), [longest.clone()]);
    let file = storage.read_file("user_1", &longest).await.unwrap().unwrap();
    assert_eq!(file.media_type, Some(MediaType::Png));
}

#[tokio::test]
async fn test_refused_name_does_not_provision_namespace() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;

    let outcome = storage.save_one("user_2", png("../escape.png")).await.unwrap();

    assert_eq!(outcome.failure().map(TransferFailure::kind), Some("invalidName"));
    assert!(!temp.path().join("uploads/user_2").exists());
}

#[tokio::test]
async fn test_purge_tmp_reports_removed_leftovers() {
    let temp = TempDir::new().unwrap();
    let storage = open(&temp, 3).await;
    storage.ensure_namespace("user_1").await.unwrap();
    let leftover = temp.path().join("uploads/user_1/.amoratmp.1-1");
    std::fs::write(&leftover, b"crashed mid-write").unwrap();

    assert!(storage.list_files("user_1").await.unwrap().is_empty());
    assert_eq!(storage.purge_tmp(std::time::Duration::ZERO).await.unwrap(), 1);
    assert!(!leftover.exists());
}

#[test]
fn test_media_type_resolution() {
    assert_eq!(Storage::media_type("a.png"), Some(MediaType::Png));
    assert_eq!(Storage::media_type("a.PNG"), None);
    assert_eq!(Storage::media_type("noext"), None);
    assert_eq!(Storage::media_type(""), None);
}

/// Backend whose listing breaks after the first quota check.
#[derive(Debug, Default)]
struct FlakyBackend {
    counts: AtomicUsize,
}

#[async_trait]
impl MediaBackend for FlakyBackend {
    async fn ensure_namespace(&self, _: &NamespaceName) -> Result<(), StorageError> {
        Ok(())
    }

    async fn count_files(&self, _: &NamespaceName) -> Result<usize, StorageError> {
        if self.counts.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(0)
        } else {
            Err(io::Error::from(io::ErrorKind::PermissionDenied).into())
        }
    }

    async fn write_file(
        &self,
        _: &NamespaceName,
        _: &FileName,
        mut content: ByteStream,
        _: Option<u64>,
    ) -> Result<u64, TransferFailure> {
        let mut written = 0;
        while let Some(chunk) = content.next().await {
            written += chunk.map_err(|source| TransferFailure::Io { source })?.len() as u64;
        }
        Ok(written)
    }

    async fn list_files(&self, _: &NamespaceName) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }

    async fn read_file(&self, _: &NamespaceName, _: &FileName) -> Result<Option<Bytes>, StorageError> {
        Ok(None)
    }

    async fn delete_file(&self, _: &NamespaceName, _: &FileName) -> Result<Removal, StorageError> {
        Ok(Removal::NotFound)
    }

    async fn delete_namespace(&self, _: &NamespaceName) -> Result<Removal, StorageError> {
        Ok(Removal::NotFound)
    }
}

#[tokio::test]
async fn test_listing_failure_mid_batch_keeps_earlier_outcomes() {
    let storage = Storage::builder().backend(Arc::new(FlakyBackend::default())).build();

    let report = storage.save_many("user_1", vec![png("a.png"), png("b.png"), png("c.png")]).await.unwrap();
    let kinds: Vec<_> = report.outcomes().iter().map(|item| item.failure().map(TransferFailure::kind)).collect();

    assert_eq!(kinds, [None, Some("unavailable"), Some("unavailable")]);
}

#[tokio::test]
async fn test_listing_failure_on_first_check_fails_the_batch() {
    let backend = FlakyBackend::default();
    backend.counts.store(1, Ordering::SeqCst);
    let storage = Storage::builder().backend(Arc::new(backend)).build();

    let result = storage.save_many("user_1", vec![png("a.png")]).await;
    assert!(matches!(result, Err(StorageError::Unavailable { .. })));
}
