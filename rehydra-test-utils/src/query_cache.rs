//! A small keyed query cache implementing [`LiveCache`].
//!
//! Entries are JSON values under string keys. Every mutation is announced
//! on a broadcast channel, which is what the change watcher listens to.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rehydra_core::{
    CacheEvent, DiagnosticSink, LiveCache, PersistResult, SerializationError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

/// Buffered notifications per subscriber.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One cached query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEntry {
    pub data: Value,
    /// Invalidated but not yet refetched.
    #[serde(default)]
    pub stale: bool,
}

impl QueryEntry {
    pub fn fresh(data: Value) -> Self {
        Self { data, stale: false }
    }
}

/// Dehydrated form of [`MemoryQueryCache`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryCacheState {
    pub queries: BTreeMap<String, QueryEntry>,
}

impl QueryCacheState {
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryHydrateOptions {
    /// Leave out entries that were stale when dehydrated.
    pub skip_stale: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QueryDehydrateOptions {
    /// Only dehydrate keys starting with this prefix.
    pub key_prefix: Option<String>,
}

/// In-memory query cache with failure injection for dehydrate and hydrate.
pub struct MemoryQueryCache {
    queries: RwLock<BTreeMap<String, QueryEntry>>,
    events: broadcast::Sender<CacheEvent>,
    sink: Option<Arc<dyn DiagnosticSink>>,
    fail_dehydrate: AtomicBool,
    fail_hydrate: AtomicBool,
    dehydrate_calls: AtomicU64,
    hydrate_calls: AtomicU64,
}

impl MemoryQueryCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            queries: RwLock::new(BTreeMap::new()),
            events,
            sink: None,
            fail_dehydrate: AtomicBool::new(false),
            fail_hydrate: AtomicBool::new(false),
            dehydrate_calls: AtomicU64::new(0),
            hydrate_calls: AtomicU64::new(0),
        }
    }

    /// Report diagnostics through `sink` (the cache's "own logger").
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Seed entries without emitting notifications.
    pub fn with_queries<I, K>(self, queries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let seeded = queries
            .into_iter()
            .map(|(k, v)| (k.into(), QueryEntry::fresh(v)))
            .collect();
        Self {
            queries: RwLock::new(seeded),
            ..self
        }
    }

    pub async fn set_query(&self, key: impl Into<String>, data: Value) {
        let key = key.into();
        let previous = self
            .queries
            .write()
            .await
            .insert(key.clone(), QueryEntry::fresh(data));

        let event = match previous {
            Some(_) => CacheEvent::updated(key),
            None => CacheEvent::added(key),
        };
        self.notify(event);
    }

    /// Mark an entry stale. Returns false if the key is absent.
    pub async fn invalidate(&self, key: &str) -> bool {
        let found = match self.queries.write().await.get_mut(key) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        };
        if found {
            self.notify(CacheEvent::updated(key));
        }
        found
    }

    pub async fn remove_query(&self, key: &str) -> bool {
        let removed = self.queries.write().await.remove(key).is_some();
        if removed {
            self.notify(CacheEvent::removed(key));
        }
        removed
    }

    pub async fn clear(&self) {
        self.queries.write().await.clear();
        self.notify(CacheEvent::cleared());
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.queries.read().await.get(key).map(|e| e.data.clone())
    }

    pub async fn entry(&self, key: &str) -> Option<QueryEntry> {
        self.queries.read().await.get(key).cloned()
    }

    /// Current contents, independent of dehydrate options and failure injection.
    pub async fn state(&self) -> QueryCacheState {
        QueryCacheState {
            queries: self.queries.read().await.clone(),
        }
    }

    pub async fn len(&self) -> usize {
        self.queries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queries.read().await.is_empty()
    }

    pub fn set_fail_dehydrate(&self, fail: bool) {
        self.fail_dehydrate.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_hydrate(&self, fail: bool) {
        self.fail_hydrate.store(fail, Ordering::SeqCst);
    }

    pub fn dehydrate_calls(&self) -> u64 {
        self.dehydrate_calls.load(Ordering::SeqCst)
    }

    pub fn hydrate_calls(&self) -> u64 {
        self.hydrate_calls.load(Ordering::SeqCst)
    }

    /// Number of live notification receivers.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn notify(&self, event: CacheEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryQueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryQueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryQueryCache")
            .field("subscribers", &self.events.receiver_count())
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LiveCache for MemoryQueryCache {
    type State = QueryCacheState;
    type HydrateOptions = QueryHydrateOptions;
    type DehydrateOptions = QueryDehydrateOptions;

    async fn dehydrate(&self, options: &QueryDehydrateOptions) -> PersistResult<QueryCacheState> {
        self.dehydrate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_dehydrate.load(Ordering::SeqCst) {
            return Err(SerializationError::Dehydrate {
                reason: "injected dehydrate failure".to_string(),
            }
            .into());
        }

        let queries = self
            .queries
            .read()
            .await
            .iter()
            .filter(|(key, _)| match &options.key_prefix {
                Some(prefix) => key.starts_with(prefix.as_str()),
                None => true,
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(QueryCacheState { queries })
    }

    async fn hydrate(
        &self,
        state: QueryCacheState,
        options: &QueryHydrateOptions,
    ) -> PersistResult<()> {
        self.hydrate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_hydrate.load(Ordering::SeqCst) {
            return Err(SerializationError::Hydrate {
                reason: "injected hydrate failure".to_string(),
            }
            .into());
        }

        let mut events = Vec::new();
        {
            let mut queries = self.queries.write().await;
            for (key, entry) in state.queries {
                if options.skip_stale && entry.stale {
                    continue;
                }
                let event = if queries.contains_key(&key) {
                    CacheEvent::updated(key.clone())
                } else {
                    CacheEvent::added(key.clone())
                };
                queries.insert(key, entry);
                events.push(event);
            }
        }

        for event in events {
            self.notify(event);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn diagnostic_sink(&self) -> Option<Arc<dyn DiagnosticSink>> {
        self.sink.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rehydra_core::CacheEventKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_mutations_emit_events() {
        let cache = MemoryQueryCache::new();
        let mut rx = cache.subscribe();

        cache.set_query("todos", json!([1])).await;
        cache.set_query("todos", json!([1, 2])).await;
        assert!(cache.invalidate("todos").await);
        assert!(!cache.invalidate("missing").await);
        assert!(cache.remove_query("todos").await);
        cache.clear().await;

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                CacheEventKind::Added,
                CacheEventKind::Updated,
                CacheEventKind::Updated,
                CacheEventKind::Removed,
                CacheEventKind::Cleared,
            ]
        );
    }

    #[tokio::test]
    async fn test_dehydrate_filters_by_prefix() {
        let cache = MemoryQueryCache::new()
            .with_queries([("user/1", json!("ada")), ("todo/1", json!("write"))]);

        let options = QueryDehydrateOptions {
            key_prefix: Some("user/".to_string()),
        };
        let state = cache.dehydrate(&options).await.unwrap();

        assert_eq!(state.len(), 1);
        assert!(state.queries.contains_key("user/1"));
    }

    #[tokio::test]
    async fn test_hydrate_skips_stale_when_asked() {
        let mut state = QueryCacheState::default();
        state
            .queries
            .insert("fresh".to_string(), QueryEntry::fresh(json!(1)));
        state.queries.insert(
            "old".to_string(),
            QueryEntry {
                data: json!(2),
                stale: true,
            },
        );

        let cache = MemoryQueryCache::new();
        cache
            .hydrate(state, &QueryHydrateOptions { skip_stale: true })
            .await
            .unwrap();

        assert_eq!(cache.get("fresh").await, Some(json!(1)));
        assert_eq!(cache.get("old").await, None);
        assert_eq!(cache.hydrate_calls(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let cache = MemoryQueryCache::new();
        cache.set_fail_dehydrate(true);
        cache.set_fail_hydrate(true);

        let err = cache.dehydrate(&Default::default()).await.unwrap_err();
        assert!(err.is_serialization());

        let err = cache
            .hydrate(QueryCacheState::default(), &Default::default())
            .await
            .unwrap_err();
        assert!(err.is_serialization());
    }
}
