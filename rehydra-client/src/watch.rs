//! Change watcher: keep storage in sync with live-cache mutations.
//!
//! [`watch`] subscribes to the cache's notification stream before it
//! returns and hands the stream to a single background worker. The
//! worker coalesces bursts: every notification that arrives while a save
//! is running (or while the throttle window is open) is folded into one
//! follow-up save of the latest state. At most one save is ever in flight
//! per watcher.
//!
//! # Cancellation
//!
//! [`WatchHandle::cancel`] is cooperative. A save already running
//! completes; a save that has not started yet is dropped and no further
//! notifications are processed. Dropping the handle does not cancel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use rehydra_core::{
    CacheEvent, Diagnostics, LiveCache, PersistError, PersistResult, SnapshotStore, WatchError,
};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::{mpsc, oneshot, watch as signal};

use crate::options::PersistOptions;
use crate::save::save;

type FlushRequest = oneshot::Sender<PersistResult<()>>;

// ============================================================================
// STATS
// ============================================================================

/// Counters kept by a watcher worker.
#[derive(Debug, Default)]
pub struct WatchStats {
    /// Notifications received, including ones skipped by channel lag
    pub notifications: AtomicU64,

    /// Saves that reached storage successfully
    pub saves_completed: AtomicU64,

    /// Saves that failed in dehydrate or persist
    pub saves_failed: AtomicU64,

    last_error: Mutex<Option<PersistError>>,
}

impl WatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all counters.
    pub fn snapshot(&self) -> WatchStatsSnapshot {
        WatchStatsSnapshot {
            notifications: self.notifications.load(Ordering::Relaxed),
            saves_completed: self.saves_completed.load(Ordering::Relaxed),
            saves_failed: self.saves_failed.load(Ordering::Relaxed),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    fn record(&self, result: &PersistResult<()>) {
        match result {
            Ok(()) => {
                self.saves_completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.saves_failed.fetch_add(1, Ordering::Relaxed);
                *self
                    .last_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(e.clone());
            }
        }
    }
}

/// Watcher counters at a point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchStatsSnapshot {
    pub notifications: u64,
    pub saves_completed: u64,
    pub saves_failed: u64,
    /// The most recent background save error, if any save has failed
    pub last_error: Option<PersistError>,
}

impl WatchStatsSnapshot {
    pub fn saves_attempted(&self) -> u64 {
        self.saves_completed + self.saves_failed
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// Cancellation and synchronization handle for a running watcher.
///
/// Cloning yields another handle to the same worker.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    shutdown: Arc<signal::Sender<bool>>,
    flush_tx: mpsc::UnboundedSender<FlushRequest>,
    stats: Arc<WatchStats>,
}

/// Worker side of a [`WatchHandle`].
pub(crate) struct WorkerControl {
    shutdown: signal::Receiver<bool>,
    flush_rx: mpsc::UnboundedReceiver<FlushRequest>,
    stats: Arc<WatchStats>,
}

impl WorkerControl {
    pub(crate) fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl WatchHandle {
    pub(crate) fn pair() -> (Self, WorkerControl) {
        let (shutdown_tx, shutdown_rx) = signal::channel(false);
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(WatchStats::new());

        let handle = Self {
            shutdown: Arc::new(shutdown_tx),
            flush_tx,
            stats: Arc::clone(&stats),
        };
        let control = WorkerControl {
            shutdown: shutdown_rx,
            flush_rx,
            stats,
        };
        (handle, control)
    }

    /// Stop the watcher. Idempotent.
    pub fn cancel(&self) {
        if !self.shutdown.send_replace(true) {
            tracing::debug!("Change watcher cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Save any notifications the worker has not yet acted on and wait for
    /// that save.
    ///
    /// Resolves once every notification sent before the call has been
    /// persisted. If the most recent background save failed, that save is
    /// retried even when nothing new is queued. Returns the error of the
    /// save it drove, or [`WatchError::Stopped`] when the watcher is no
    /// longer running.
    pub async fn flush(&self) -> PersistResult<()> {
        if self.is_cancelled() {
            return Err(WatchError::Stopped.into());
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.flush_tx
            .send(reply_tx)
            .map_err(|_| WatchError::Stopped)?;

        reply_rx.await.map_err(|_| WatchError::Stopped)?
    }

    pub fn stats(&self) -> WatchStatsSnapshot {
        self.stats.snapshot()
    }
}

// ============================================================================
// WATCH
// ============================================================================

/// Persist `cache` to `store` after every mutation until cancelled.
///
/// The subscription is installed before this returns, so no mutation made
/// afterwards is missed. Must be called from within a tokio runtime.
pub fn watch<C, P>(cache: &Arc<C>, store: Arc<P>, options: PersistOptions<C>) -> WatchHandle
where
    C: LiveCache,
    P: SnapshotStore<C::State> + ?Sized + 'static,
{
    let events = cache.subscribe();
    let (handle, control) = WatchHandle::pair();
    let worker = SaveWorker::new(cache, store, options);

    tokio::spawn(worker.run(events, control));
    handle
}

// ============================================================================
// WORKER
// ============================================================================

pub(crate) struct SaveWorker<C: LiveCache, P: ?Sized> {
    cache: Weak<C>,
    store: Arc<P>,
    options: PersistOptions<C>,
    diagnostics: Diagnostics,
}

/// Result of emptying the notification buffer without waiting.
#[derive(Debug, Default)]
struct Drained {
    received: u64,
    closed: bool,
}

impl<C, P> SaveWorker<C, P>
where
    C: LiveCache,
    P: SnapshotStore<C::State> + ?Sized + 'static,
{
    pub(crate) fn new(cache: &Arc<C>, store: Arc<P>, options: PersistOptions<C>) -> Self {
        let diagnostics = options.diagnostics(cache);
        Self {
            cache: Arc::downgrade(cache),
            store,
            options,
            diagnostics,
        }
    }

    pub(crate) async fn run(self, mut events: broadcast::Receiver<CacheEvent>, control: WorkerControl) {
        let WorkerControl {
            mut shutdown,
            mut flush_rx,
            stats,
        } = control;
        let mut flush_open = true;
        // Set while the latest save failed; the next flush retries it.
        let mut dirty = false;

        tracing::debug!(
            throttle_ms = self.options.config.throttle.as_millis() as u64,
            "Change watcher started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancelled(&mut shutdown) => break,

                request = flush_rx.recv(), if flush_open => {
                    let Some(reply) = request else {
                        // Every handle is gone; keep saving on notifications.
                        flush_open = false;
                        continue;
                    };

                    let drained = drain(&mut events);
                    stats.notifications.fetch_add(drained.received, Ordering::Relaxed);

                    let result = if drained.received > 0 || dirty {
                        self.save_latest(&stats).await
                    } else {
                        Ok(())
                    };
                    dirty = result.is_err();
                    let stop = drained.closed || result.as_ref().is_err_and(is_stopped);
                    let _ = reply.send(result);
                    if stop {
                        break;
                    }
                }

                event = events.recv() => {
                    match event {
                        Ok(_) => {
                            stats.notifications.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "Change watcher lagged behind notifications");
                            stats.notifications.fetch_add(skipped, Ordering::Relaxed);
                        }
                        Err(RecvError::Closed) => break,
                    }

                    if !self.settle(&mut shutdown).await {
                        break;
                    }

                    let drained = drain(&mut events);
                    stats.notifications.fetch_add(drained.received, Ordering::Relaxed);

                    let result = self.save_latest(&stats).await;
                    dirty = result.is_err();
                    if drained.closed || result.as_ref().is_err_and(is_stopped) {
                        break;
                    }
                }
            }
        }

        let snapshot = stats.snapshot();
        tracing::debug!(
            notifications = snapshot.notifications,
            saves_completed = snapshot.saves_completed,
            saves_failed = snapshot.saves_failed,
            "Change watcher stopped"
        );
    }

    /// Wait out the throttle window. Returns false if cancelled meanwhile.
    async fn settle(&self, shutdown: &mut signal::Receiver<bool>) -> bool {
        let throttle = self.options.config.throttle;
        if throttle.is_zero() {
            return true;
        }

        tokio::select! {
            biased;
            _ = cancelled(shutdown) => false,
            _ = tokio::time::sleep(throttle) => true,
        }
    }

    /// Save the cache as it is now, recording the outcome.
    async fn save_latest(&self, stats: &WatchStats) -> PersistResult<()> {
        let Some(cache) = self.cache.upgrade() else {
            tracing::debug!("Live cache dropped; change watcher exiting");
            return Err(WatchError::Stopped.into());
        };

        let result = save(cache.as_ref(), self.store.as_ref(), &self.options).await;
        stats.record(&result);

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Background snapshot save failed");
            self.diagnostics.error(e);
        }
        result
    }
}

fn is_stopped(error: &PersistError) -> bool {
    matches!(error, PersistError::Watch(WatchError::Stopped))
}

fn drain(events: &mut broadcast::Receiver<CacheEvent>) -> Drained {
    let mut drained = Drained::default();
    loop {
        match events.try_recv() {
            Ok(_) => drained.received += 1,
            Err(TryRecvError::Lagged(skipped)) => drained.received += skipped,
            Err(TryRecvError::Empty) => return drained,
            Err(TryRecvError::Closed) => {
                drained.closed = true;
                return drained;
            }
        }
    }
}

/// Resolves once cancellation is requested. Never resolves if every
/// handle is dropped without cancelling.
async fn cancelled(shutdown: &mut signal::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
