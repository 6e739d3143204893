//! Startup restore: read the stored snapshot, judge it, replay it.
//!
//! Restore never fails from the caller's point of view. Anything that
//! prevents a safe replay (absent timestamp, expiry, buster mismatch, a
//! storage or hydrate error) ends with the stored snapshot removed, as if
//! nothing had been persisted. What happened is reported to the
//! diagnostic sink and returned as a [`RestoreOutcome`].

use std::time::Duration;

use rehydra_core::{Diagnostics, LiveCache, PersistError, PersistResult, SnapshotError, SnapshotStore};

use crate::options::PersistOptions;

/// What a call to [`restore`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// Storage held no snapshot.
    Empty,
    /// The snapshot was hydrated into the cache.
    Restored { age: Duration },
    /// The snapshot was refused and removed; the cache is untouched.
    Discarded { reason: SnapshotError },
    /// Reading or hydrating failed; the snapshot was removed.
    Failed { error: PersistError },
}

impl RestoreOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, Self::Restored { .. })
    }
}

/// Restore the persisted snapshot into `cache`.
///
/// Call once at startup, before any change watcher is installed.
pub async fn restore<C, P>(cache: &C, store: &P, options: &PersistOptions<C>) -> RestoreOutcome
where
    C: LiveCache,
    P: SnapshotStore<C::State> + ?Sized,
{
    let diagnostics = options.diagnostics(cache);

    match try_restore(cache, store, options, &diagnostics).await {
        Ok(outcome) => outcome,
        Err(error) => {
            tracing::debug!(error = %error, "Snapshot restore failed");
            diagnostics.error(&error);
            remove_quietly(store, &diagnostics).await;
            RestoreOutcome::Failed { error }
        }
    }
}

async fn try_restore<C, P>(
    cache: &C,
    store: &P,
    options: &PersistOptions<C>,
    diagnostics: &Diagnostics,
) -> PersistResult<RestoreOutcome>
where
    C: LiveCache,
    P: SnapshotStore<C::State> + ?Sized,
{
    let Some(snapshot) = store.restore_snapshot().await? else {
        tracing::debug!("No persisted snapshot");
        return Ok(RestoreOutcome::Empty);
    };

    let now = options.now();
    if let Err(reason) = snapshot.validate(&options.config.policy(), now) {
        tracing::info!(reason = %reason, "Discarding persisted snapshot");
        diagnostics.warn(&format!("Discarding persisted snapshot: {}", reason));
        remove_quietly(store, diagnostics).await;
        return Ok(RestoreOutcome::Discarded { reason });
    }

    let age = snapshot.age(now).unwrap_or_default();
    cache
        .hydrate(snapshot.into_client_state(), &options.hydrate_options)
        .await?;

    tracing::info!(age_ms = age.as_millis() as u64, "Restored persisted snapshot");
    Ok(RestoreOutcome::Restored { age })
}

/// Remove the stored snapshot, reporting rather than returning a failure.
async fn remove_quietly<S, P>(store: &P, diagnostics: &Diagnostics)
where
    S: Send + Sync + 'static,
    P: SnapshotStore<S> + ?Sized,
{
    if let Err(error) = store.remove_snapshot().await {
        tracing::debug!(error = %error, "Failed to remove persisted snapshot");
        diagnostics.error(&error);
    }
}
