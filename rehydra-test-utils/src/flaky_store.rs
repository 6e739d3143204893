//! Snapshot store with switchable failures and an optional persist delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rehydra_core::{PersistResult, Snapshot, SnapshotStore, StorageError};
use rehydra_storage::{InMemorySnapshotStore, StoreStats, StoreStatsSnapshot};

/// Wraps an [`InMemorySnapshotStore`] and fails on demand.
///
/// `attempts()` counts every call, including failed ones; the inner
/// store's stats only count calls that got through.
#[derive(Debug)]
pub struct FlakySnapshotStore<S> {
    inner: InMemorySnapshotStore<S>,
    attempts: StoreStats,
    fail_persist: AtomicBool,
    fail_restore: AtomicBool,
    fail_remove: AtomicBool,
    persist_delay: Option<Duration>,
}

impl<S> FlakySnapshotStore<S> {
    pub fn new() -> Self {
        Self::wrap(InMemorySnapshotStore::new())
    }

    pub fn with_snapshot(snapshot: Snapshot<S>) -> Self {
        Self::wrap(InMemorySnapshotStore::with_snapshot(snapshot))
    }

    fn wrap(inner: InMemorySnapshotStore<S>) -> Self {
        Self {
            inner,
            attempts: StoreStats::new(),
            fail_persist: AtomicBool::new(false),
            fail_restore: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            persist_delay: None,
        }
    }

    /// Sleep this long inside every persist call.
    pub fn with_persist_delay(mut self, delay: Duration) -> Self {
        self.persist_delay = Some(delay);
        self
    }

    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_restore(&self, fail: bool) {
        self.fail_restore.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemorySnapshotStore<S> {
        &self.inner
    }

    pub fn attempts(&self) -> StoreStatsSnapshot {
        self.attempts.snapshot()
    }
}

impl<S> Default for FlakySnapshotStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> SnapshotStore<S> for FlakySnapshotStore<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn persist_snapshot(&self, snapshot: &Snapshot<S>) -> PersistResult<()> {
        self.attempts.persist_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.persist_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed {
                reason: "injected persist failure".to_string(),
            }
            .into());
        }
        self.inner.persist_snapshot(snapshot).await
    }

    async fn restore_snapshot(&self) -> PersistResult<Option<Snapshot<S>>> {
        self.attempts.restore_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_restore.load(Ordering::SeqCst) {
            return Err(StorageError::ReadFailed {
                reason: "injected restore failure".to_string(),
            }
            .into());
        }
        self.inner.restore_snapshot().await
    }

    async fn remove_snapshot(&self) -> PersistResult<()> {
        self.attempts.remove_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(StorageError::RemoveFailed {
                reason: "injected remove failure".to_string(),
            }
            .into());
        }
        self.inner.remove_snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_are_counted_but_not_forwarded() {
        let store = FlakySnapshotStore::<u32>::new();
        store.set_fail_persist(true);

        let snapshot = Snapshot::new(7, "", chrono::DateTime::UNIX_EPOCH);
        assert!(store.persist_snapshot(&snapshot).await.is_err());
        assert_eq!(store.attempts().persist_calls, 1);
        assert_eq!(store.inner().stats().persist_calls, 0);

        store.set_fail_persist(false);
        store.persist_snapshot(&snapshot).await.unwrap();
        assert_eq!(store.inner().peek().await, Some(snapshot));
    }

    #[tokio::test]
    async fn test_remove_failure_keeps_snapshot() {
        let snapshot = Snapshot::new(1u32, "", chrono::DateTime::UNIX_EPOCH);
        let store = FlakySnapshotStore::with_snapshot(snapshot);
        store.set_fail_remove(true);

        let err = store.remove_snapshot().await.unwrap_err();
        assert!(err.is_storage());
        assert!(!store.inner().is_empty().await);
    }
}
