//! In-process snapshot store.
//!
//! Holds the single snapshot slot behind a `tokio::sync::RwLock`. Nothing
//! survives the process, so this is mostly useful in tests and for
//! wiring the protocol up before a durable backend is chosen.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rehydra_core::{PersistResult, Snapshot, SnapshotStore};
use tokio::sync::RwLock;

/// Counters for the three store operations.
#[derive(Debug, Default)]
pub struct StoreStats {
    pub persist_calls: AtomicU64,
    pub restore_calls: AtomicU64,
    pub remove_calls: AtomicU64,
}

impl StoreStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all counters.
    pub fn snapshot(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            persist_calls: self.persist_calls.load(Ordering::Relaxed),
            restore_calls: self.restore_calls.load(Ordering::Relaxed),
            remove_calls: self.remove_calls.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStatsSnapshot {
    pub persist_calls: u64,
    pub restore_calls: u64,
    pub remove_calls: u64,
}

/// Snapshot store kept in memory.
#[derive(Debug)]
pub struct InMemorySnapshotStore<S> {
    slot: RwLock<Option<Snapshot<S>>>,
    stats: StoreStats,
}

impl<S> Default for InMemorySnapshotStore<S> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
            stats: StoreStats::default(),
        }
    }
}

impl<S> InMemorySnapshotStore<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `snapshot` already stored.
    pub fn with_snapshot(snapshot: Snapshot<S>) -> Self {
        Self {
            slot: RwLock::new(Some(snapshot)),
            stats: StoreStats::default(),
        }
    }

    pub fn stats(&self) -> StoreStatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the slot is occupied. Does not count as a restore call.
    pub async fn is_empty(&self) -> bool {
        self.slot.read().await.is_none()
    }
}

impl<S: Clone> InMemorySnapshotStore<S> {
    /// Look at the stored snapshot without counting a restore call.
    pub async fn peek(&self) -> Option<Snapshot<S>> {
        self.slot.read().await.clone()
    }
}

#[async_trait]
impl<S> SnapshotStore<S> for InMemorySnapshotStore<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn persist_snapshot(&self, snapshot: &Snapshot<S>) -> PersistResult<()> {
        self.stats.persist_calls.fetch_add(1, Ordering::Relaxed);
        *self.slot.write().await = Some(snapshot.clone());
        Ok(())
    }

    async fn restore_snapshot(&self) -> PersistResult<Option<Snapshot<S>>> {
        self.stats.restore_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.slot.read().await.clone())
    }

    async fn remove_snapshot(&self) -> PersistResult<()> {
        self.stats.remove_calls.fetch_add(1, Ordering::Relaxed);
        *self.slot.write().await = None;
        Ok(())
    }
}
