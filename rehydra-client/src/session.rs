//! Startup orchestration: restore once, then watch.

use std::sync::Arc;

use rehydra_core::{LiveCache, SnapshotStore};
use tokio::sync::oneshot;

use crate::options::PersistOptions;
use crate::restore::{restore, RestoreOutcome};
use crate::watch::{watch, SaveWorker, WatchHandle};

/// Restore the stored snapshot into `cache`, then keep storage in sync.
///
/// Returns `None` without touching the cache or the store when
/// persistence is disabled in `options.config`, or when the config fails
/// [`PersistConfig::validate`](rehydra_core::PersistConfig::validate). A
/// validation failure is reported through diagnostics.
pub async fn start<C, P>(
    cache: &Arc<C>,
    store: Arc<P>,
    options: PersistOptions<C>,
) -> Option<WatchHandle>
where
    C: LiveCache,
    P: SnapshotStore<C::State> + ?Sized + 'static,
{
    if !should_start(cache.as_ref(), &options) {
        return None;
    }

    restore(cache.as_ref(), store.as_ref(), &options).await;
    Some(watch(cache, store, options))
}

/// A watcher started without waiting for the restore.
#[derive(Debug)]
pub struct DetachedStart {
    /// Cancels the restore-then-watch sequence at any point.
    pub handle: WatchHandle,
    /// Resolves with the restore outcome. Dropping it is fine.
    pub restored: oneshot::Receiver<RestoreOutcome>,
}

/// Like [`start`], but returns immediately and restores in the background.
///
/// Cancelling the handle before the restore finishes means the
/// subscription is never installed; the restore itself still runs to
/// completion. Must be called from within a tokio runtime.
pub fn start_detached<C, P>(
    cache: &Arc<C>,
    store: Arc<P>,
    options: PersistOptions<C>,
) -> Option<DetachedStart>
where
    C: LiveCache,
    P: SnapshotStore<C::State> + ?Sized + 'static,
{
    if !should_start(cache.as_ref(), &options) {
        return None;
    }

    let (handle, control) = WatchHandle::pair();
    let (restored_tx, restored_rx) = oneshot::channel();
    let cache = Arc::clone(cache);

    tokio::spawn(async move {
        let outcome = restore(cache.as_ref(), store.as_ref(), &options).await;
        let _ = restored_tx.send(outcome);

        if control.is_cancelled() {
            tracing::debug!("Cancelled before restore finished; not subscribing");
            return;
        }

        let events = cache.subscribe();
        let worker = SaveWorker::new(&cache, store, options);
        drop(cache);
        worker.run(events, control).await;
    });

    Some(DetachedStart {
        handle,
        restored: restored_rx,
    })
}

fn should_start<C: LiveCache>(cache: &C, options: &PersistOptions<C>) -> bool {
    if !options.config.enabled {
        tracing::debug!("Persistence disabled; not starting");
        return false;
    }

    if let Err(e) = options.config.validate() {
        tracing::warn!(error = %e, "Invalid persistence config; not starting");
        options.diagnostics(cache).error(&e);
        return false;
    }
    true
}
