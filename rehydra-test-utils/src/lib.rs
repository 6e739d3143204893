//! REHYDRA Test Utilities
//!
//! Centralized test infrastructure for the REHYDRA workspace:
//! - [`MemoryQueryCache`], a reference [`LiveCache`] implementation
//! - [`FlakySnapshotStore`] for storage failure injection
//! - [`RecordingSink`] to assert on diagnostics
//! - Proptest generators for cache states and snapshots
//! - Fixtures and tracing setup

mod flaky_store;
mod query_cache;

pub use flaky_store::FlakySnapshotStore;
pub use query_cache::{
    MemoryQueryCache, QueryCacheState, QueryDehydrateOptions, QueryEntry, QueryHydrateOptions,
    EVENT_CHANNEL_CAPACITY,
};

// Re-export core types for convenience
pub use rehydra_core::{
    BuildMode, CacheEvent, DiagnosticSink, LiveCache, ManualClock, PersistConfig, PersistError,
    PersistResult, Snapshot, SnapshotError, SnapshotStore, StorageError,
};
pub use rehydra_storage::InMemorySnapshotStore;

use std::sync::{Mutex, Once, PoisonError};

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

// ============================================================================
// DIAGNOSTICS
// ============================================================================

/// Sink that keeps everything it is given.
#[derive(Debug, Default)]
pub struct RecordingSink {
    errors: Mutex<Vec<PersistError>>,
    warnings: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<PersistError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.errors().is_empty() && self.warnings().is_empty()
    }
}

impl DiagnosticSink for RecordingSink {
    fn error(&self, error: &PersistError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.clone());
    }

    fn warn(&self, message: &str) {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

// ============================================================================
// TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to debug output from the rehydra crates.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("warn,rehydra_client=debug,rehydra_storage=debug")
        });
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// FIXTURES
// ============================================================================

/// Instant `ms` milliseconds after the epoch.
pub fn at_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// A small populated cache state.
pub fn sample_state() -> QueryCacheState {
    let mut state = QueryCacheState::default();
    state.queries.insert(
        "todos".to_string(),
        QueryEntry::fresh(json!([{"id": 1, "title": "write tests"}])),
    );
    state.queries.insert(
        "user/42".to_string(),
        QueryEntry::fresh(json!({"name": "Ada", "admin": false})),
    );
    state
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Query keys like `todos` or `user/42/posts`.
pub fn arb_query_key() -> impl Strategy<Value = String> {
    "[a-z]{1,8}(/[a-z0-9]{1,6}){0,2}"
}

pub fn arb_json_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        prop::collection::vec(any::<i32>(), 0..4).prop_map(Value::from),
    ]
}

pub fn arb_query_entry() -> impl Strategy<Value = QueryEntry> {
    (arb_json_value(), any::<bool>()).prop_map(|(data, stale)| QueryEntry { data, stale })
}

pub fn arb_query_cache_state() -> impl Strategy<Value = QueryCacheState> {
    prop::collection::btree_map(arb_query_key(), arb_query_entry(), 0..8)
        .prop_map(|queries| QueryCacheState { queries })
}

pub fn arb_buster() -> impl Strategy<Value = String> {
    "[a-z0-9.]{0,8}"
}

/// Instants between the epoch and 2100.
pub fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800_000).prop_filter_map("representable instant", DateTime::from_timestamp_millis)
}

pub fn arb_snapshot() -> impl Strategy<Value = Snapshot<QueryCacheState>> {
    (arb_query_cache_state(), arb_buster(), arb_timestamp())
        .prop_map(|(state, buster, timestamp)| Snapshot::new(state, buster, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rehydra_storage::{JsonCodec, SnapshotCodec};

    #[test]
    fn test_recording_sink_collects() {
        let sink = RecordingSink::new();
        assert!(sink.is_empty());

        sink.warn("discarded");
        sink.error(&StorageError::LockPoisoned.into());

        assert_eq!(sink.warnings(), vec!["discarded".to_string()]);
        assert_eq!(sink.errors().len(), 1);
    }

    #[test]
    fn test_init_test_tracing_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_generated_snapshots_survive_json(snapshot in arb_snapshot()) {
            let codec = JsonCodec;
            let raw = codec.encode(&snapshot).unwrap();
            let decoded: Snapshot<QueryCacheState> = codec.decode(&raw).unwrap();
            prop_assert_eq!(decoded, snapshot);
        }
    }
}
