//! The quota gate: admission of new files against a per-namespace ceiling.
//!
//! The stored-file count is never cached. Every check re-reads the namespace, so two
//! concurrent admissions can both observe room and both write ([`QuotaMode::Advisory`]).
//! [`QuotaMode::Strict`] closes that window by serializing admission and write per
//! namespace through [`NamespaceLocks`].

use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// There is room; `slots` is how many of the requested files fit right now.
    Admitted { slots: usize },
    /// The namespace already holds `ceiling` files or more.
    Rejected,
}

impl Admission {
    #[must_use]
    pub const fn is_admitted(self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// How strictly the ceiling is enforced under concurrency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuotaMode {
    /// Check-then-write without coordination; concurrent racers may overshoot.
    #[default]
    Advisory,
    /// Admission and write are serialized per namespace; the ceiling is a hard cap
    /// within this process.
    Strict,
}

/// Pure admission rule: reject when `current >= ceiling`.
#[must_use]
pub const fn admit(current: usize, ceiling: usize, requested: usize) -> Admission {
    if current >= ceiling {
        Admission::Rejected
    } else {
        let room = ceiling - current;
        Admission::Admitted { slots: if requested < room { requested } else { room } }
    }
}

/// Per-namespace async locks, held only in [`QuotaMode::Strict`].
///
/// Entries are weak so the table does not grow with every user ever seen;
/// dead entries are pruned whenever a new one is inserted.
#[derive(Debug, Default)]
pub(crate) struct NamespaceLocks {
    table: Mutex<FxHashMap<String, Weak<AsyncMutex<()>>>>,
}

impl NamespaceLocks {
    pub(crate) async fn acquire(&self, namespace: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock();
            if let Some(existing) = table.get(namespace).and_then(Weak::upgrade) {
                existing
            } else {
                table.retain(|_, weak| weak.strong_count() > 0);
                let fresh = Arc::new(AsyncMutex::new(()));
                table.insert(namespace.to_owned(), Arc::downgrade(&fresh));
                fresh
            }
        };

        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn admits_below_ceiling_only() {
        assert_eq!(admit(0, 3, 1), Admission::Admitted { slots: 1 });
        assert_eq!(admit(1, 3, 5), Admission::Admitted { slots: 2 });
        assert_eq!(admit(3, 3, 1), Admission::Rejected);
        assert_eq!(admit(7, 3, 1), Admission::Rejected);
        assert_eq!(admit(0, 0, 1), Admission::Rejected);
    }

    #[tokio::test]
    async fn locks_serialize_same_namespace() {
        let locks = Arc::new(NamespaceLocks::default());
        let guard = locks.acquire("user_1").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("user_1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished(), "second acquire must wait for the first guard");

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn locks_do_not_block_other_namespaces_and_are_pruned() {
        let locks = NamespaceLocks::default();
        let first = locks.acquire("user_1").await;
        let second = locks.acquire("user_2").await;
        assert_eq!(locks.len(), 2);

        drop(first);
        drop(second);
        let _third = locks.acquire("user_3").await;
        assert_eq!(locks.len(), 1, "dead entries are pruned on insert");
    }
}
