//! Key-value storage adapter.
//!
//! Many durable stores expose a string key-value API (browser-style
//! storage, embedded databases, a directory of files). [`KvSnapshotStore`]
//! turns any [`KeyValueStore`] into a [`SnapshotStore`] by encoding the
//! snapshot under a single key.
//!
//! # Retry
//!
//! A failed write (quota exceeded, value too large) can be retried with a
//! smaller snapshot. A [`PersistRetry`] policy receives the snapshot that
//! failed, the error and the attempt number, and either returns a reduced
//! snapshot to try next or gives up. With no policy the first error is
//! returned.

pub mod file;
pub mod lmdb;
pub mod memory;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use rehydra_core::constants::DEFAULT_STORAGE_KEY;
use rehydra_core::{PersistError, PersistResult, SerializationError, Snapshot, SnapshotStore};
use serde::{de::DeserializeOwned, Serialize};

pub use file::FileKvStore;
pub use lmdb::{LmdbKvStore, LmdbStoreError};
pub use memory::MemoryKvStore;

/// String key-value storage.
///
/// Implementations should treat `remove_item` on a missing key as success.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> PersistResult<Option<String>>;

    async fn set_item(&self, key: &str, value: &str) -> PersistResult<()>;

    async fn remove_item(&self, key: &str) -> PersistResult<()>;
}

#[async_trait]
impl<T> KeyValueStore for Arc<T>
where
    T: KeyValueStore + ?Sized,
{
    async fn get_item(&self, key: &str) -> PersistResult<Option<String>> {
        (**self).get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> PersistResult<()> {
        (**self).set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> PersistResult<()> {
        (**self).remove_item(key).await
    }
}

/// Converts a snapshot to and from its stored string form.
pub trait SnapshotCodec<S>: Send + Sync {
    fn encode(&self, snapshot: &Snapshot<S>) -> PersistResult<String>;

    fn decode(&self, raw: &str) -> PersistResult<Snapshot<S>>;
}

/// JSON via serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<S> SnapshotCodec<S> for JsonCodec
where
    S: Serialize + DeserializeOwned,
{
    fn encode(&self, snapshot: &Snapshot<S>) -> PersistResult<String> {
        serde_json::to_string(snapshot).map_err(|e| {
            SerializationError::Encode {
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn decode(&self, raw: &str) -> PersistResult<Snapshot<S>> {
        serde_json::from_str(raw).map_err(|e| {
            SerializationError::Decode {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Decides whether a failed write is retried, and with what.
pub trait PersistRetry<S>: Send + Sync {
    /// `attempt` starts at 1 for the first failure.
    fn retry(&self, snapshot: &Snapshot<S>, error: &PersistError, attempt: u32)
        -> Option<Snapshot<S>>;
}

/// Never retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl<S> PersistRetry<S> for NoRetry {
    fn retry(&self, _snapshot: &Snapshot<S>, _error: &PersistError, _attempt: u32) -> Option<Snapshot<S>> {
        None
    }
}

impl<S, F> PersistRetry<S> for F
where
    F: Fn(&Snapshot<S>, &PersistError, u32) -> Option<Snapshot<S>> + Send + Sync,
{
    fn retry(&self, snapshot: &Snapshot<S>, error: &PersistError, attempt: u32) -> Option<Snapshot<S>> {
        self(snapshot, error, attempt)
    }
}

/// [`SnapshotStore`] over a [`KeyValueStore`].
///
/// # Example
///
/// ```ignore
/// let store = KvSnapshotStore::new(FileKvStore::new("/var/lib/app/cache"))
///     .with_key("my-app-cache");
/// restore(&cache, &store, &options).await;
/// ```
pub struct KvSnapshotStore<K, S, C = JsonCodec> {
    backend: K,
    key: String,
    codec: C,
    retry: Arc<dyn PersistRetry<S>>,
    _state: PhantomData<fn() -> S>,
}

impl<K, S> KvSnapshotStore<K, S, JsonCodec>
where
    S: 'static,
{
    /// JSON-encoded snapshots under the default key, no retry.
    pub fn new(backend: K) -> Self {
        Self {
            backend,
            key: DEFAULT_STORAGE_KEY.to_string(),
            codec: JsonCodec,
            retry: Arc::new(NoRetry),
            _state: PhantomData,
        }
    }
}

impl<K, S, C> KvSnapshotStore<K, S, C> {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_codec<C2>(self, codec: C2) -> KvSnapshotStore<K, S, C2> {
        KvSnapshotStore {
            backend: self.backend,
            key: self.key,
            codec,
            retry: self.retry,
            _state: PhantomData,
        }
    }

    pub fn with_retry(mut self, retry: impl PersistRetry<S> + 'static) -> Self {
        self.retry = Arc::new(retry);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backend(&self) -> &K {
        &self.backend
    }
}

#[async_trait]
impl<K, S, C> SnapshotStore<S> for KvSnapshotStore<K, S, C>
where
    K: KeyValueStore,
    S: Send + Sync + 'static,
    C: SnapshotCodec<S>,
{
    async fn persist_snapshot(&self, snapshot: &Snapshot<S>) -> PersistResult<()> {
        let mut attempt = 0u32;
        let mut reduced: Option<Snapshot<S>> = None;

        loop {
            let current = reduced.as_ref().unwrap_or(snapshot);
            let result = match self.codec.encode(current) {
                Ok(raw) => self.backend.set_item(&self.key, &raw).await,
                Err(e) => Err(e),
            };

            let error = match result {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            attempt += 1;
            match self.retry.retry(current, &error, attempt) {
                Some(next) => {
                    tracing::debug!(key = %self.key, attempt, error = %error, "Retrying snapshot write");
                    reduced = Some(next);
                }
                None => return Err(error),
            }
        }
    }

    async fn restore_snapshot(&self) -> PersistResult<Option<Snapshot<S>>> {
        match self.backend.get_item(&self.key).await? {
            Some(raw) => self.codec.decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn remove_snapshot(&self) -> PersistResult<()> {
        self.backend.remove_item(&self.key).await
    }
}
