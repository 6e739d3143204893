//! Capture the live cache into a fresh snapshot and write it.

use rehydra_core::{LiveCache, PersistResult, Snapshot, SnapshotStore};

use crate::options::PersistOptions;

/// Dehydrate `cache` and overwrite the stored snapshot.
///
/// Errors from dehydrate and from the storage backend are returned as-is.
pub async fn save<C, P>(cache: &C, store: &P, options: &PersistOptions<C>) -> PersistResult<()>
where
    C: LiveCache,
    P: SnapshotStore<C::State> + ?Sized,
{
    let state = cache.dehydrate(&options.dehydrate_options).await?;
    let snapshot = Snapshot::new(state, options.config.buster.clone(), options.now());

    store.persist_snapshot(&snapshot).await?;

    tracing::debug!(
        buster = %snapshot.buster(),
        timestamp = ?snapshot.timestamp(),
        "Persisted snapshot"
    );
    Ok(())
}
