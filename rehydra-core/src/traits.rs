//! Collaborator traits: the storage backend and the live cache.
//!
//! REHYDRA owns neither side. A [`SnapshotStore`] keeps exactly one
//! snapshot slot durable; a [`LiveCache`] knows how to turn itself into
//! an opaque state and back, and announces its own mutations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast;

use crate::diagnostics::DiagnosticSink;
use crate::error::PersistResult;
use crate::event::CacheEvent;
use crate::snapshot::Snapshot;

/// Storage backend holding a single snapshot slot.
///
/// # Implementation Requirements
///
/// - `persist_snapshot` overwrites whatever is stored (last write wins)
/// - `restore_snapshot` returns `Ok(None)` when the slot is empty
/// - `remove_snapshot` on an empty slot is not an error
/// - Implementations must be `Send + Sync` so the change watcher can
///   share them with its background task
#[async_trait]
pub trait SnapshotStore<S>: Send + Sync
where
    S: Send + Sync + 'static,
{
    /// Write `snapshot`, replacing the previous one.
    async fn persist_snapshot(&self, snapshot: &Snapshot<S>) -> PersistResult<()>;

    /// Read the stored snapshot, if any.
    async fn restore_snapshot(&self) -> PersistResult<Option<Snapshot<S>>>;

    /// Clear the slot.
    async fn remove_snapshot(&self) -> PersistResult<()>;
}

#[async_trait]
impl<S, T> SnapshotStore<S> for Arc<T>
where
    S: Send + Sync + 'static,
    T: SnapshotStore<S> + ?Sized,
{
    async fn persist_snapshot(&self, snapshot: &Snapshot<S>) -> PersistResult<()> {
        (**self).persist_snapshot(snapshot).await
    }

    async fn restore_snapshot(&self) -> PersistResult<Option<Snapshot<S>>> {
        (**self).restore_snapshot().await
    }

    async fn remove_snapshot(&self) -> PersistResult<()> {
        (**self).remove_snapshot().await
    }
}

/// The in-memory query cache being persisted.
///
/// `State` is never inspected by REHYDRA; it is threaded from
/// [`dehydrate`](LiveCache::dehydrate) into a [`Snapshot`] and back into
/// [`hydrate`](LiveCache::hydrate).
#[async_trait]
pub trait LiveCache: Send + Sync + 'static {
    /// Serializable capture of the whole cache.
    type State: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Passed through untouched to `hydrate`.
    type HydrateOptions: Clone + Default + Send + Sync + 'static;

    /// Passed through untouched to `dehydrate`.
    type DehydrateOptions: Clone + Default + Send + Sync + 'static;

    /// Capture the current contents.
    async fn dehydrate(&self, options: &Self::DehydrateOptions) -> PersistResult<Self::State>;

    /// Replay `state` into the cache in place.
    async fn hydrate(
        &self,
        state: Self::State,
        options: &Self::HydrateOptions,
    ) -> PersistResult<()>;

    /// Start receiving mutation notifications. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<CacheEvent>;

    /// The cache's own logger, if it has one.
    fn diagnostic_sink(&self) -> Option<Arc<dyn DiagnosticSink>> {
        None
    }
}
