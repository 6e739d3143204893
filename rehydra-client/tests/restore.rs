mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{clocked_options, recorded_options, ONE_DAY};
use rehydra_client::{restore, save, PersistOptions, RestoreOutcome};
use rehydra_core::{BuildMode, ManualClock, PersistConfig, PersistError, SnapshotError};
use rehydra_storage::{KeyValueStore, KvSnapshotStore, MemoryKvStore};
use rehydra_test_utils::{
    at_ms, sample_state, FlakySnapshotStore, InMemorySnapshotStore, MemoryQueryCache,
    QueryCacheState, QueryHydrateOptions, QueryEntry, RecordingSink, Snapshot,
};
use serde_json::json;

#[tokio::test]
async fn test_empty_store_is_a_no_op() {
    let cache = MemoryQueryCache::new();
    let store = InMemorySnapshotStore::<QueryCacheState>::new();
    let (options, sink) = recorded_options(PersistConfig::default());

    let outcome = restore(&cache, &store, &options).await;

    assert_eq!(outcome, RestoreOutcome::Empty);
    assert_eq!(cache.hydrate_calls(), 0);
    assert_eq!(store.stats().remove_calls, 0);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_fresh_matching_snapshot_is_hydrated() {
    let clock = ManualClock::new(at_ms(10_000));
    let store = InMemorySnapshotStore::with_snapshot(Snapshot::new(
        sample_state(),
        "v1",
        at_ms(9_000),
    ));
    let cache = MemoryQueryCache::new();
    let (options, sink) = clocked_options(PersistConfig::new().with_buster("v1"), &clock);

    let outcome = restore(&cache, &store, &options).await;

    assert_eq!(
        outcome,
        RestoreOutcome::Restored {
            age: Duration::from_millis(1_000)
        }
    );
    assert_eq!(cache.state().await, sample_state());
    assert!(!store.is_empty().await);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_expired_snapshot_is_removed_without_hydration() {
    let clock = ManualClock::new(at_ms(ONE_DAY.as_millis() as i64 + 1));
    let store = InMemorySnapshotStore::with_snapshot(Snapshot::new(sample_state(), "", at_ms(0)));
    let cache = MemoryQueryCache::new();
    let (options, sink) = clocked_options(PersistConfig::default(), &clock);

    let outcome = restore(&cache, &store, &options).await;

    assert!(matches!(
        outcome,
        RestoreOutcome::Discarded {
            reason: SnapshotError::Expired { .. }
        }
    ));
    assert_eq!(cache.hydrate_calls(), 0);
    assert!(cache.is_empty().await);
    assert!(store.is_empty().await);
    assert_eq!(store.stats().remove_calls, 1);
    assert_eq!(sink.warnings().len(), 1);
}

#[tokio::test]
async fn test_busted_snapshot_is_removed_regardless_of_age() {
    let clock = ManualClock::new(at_ms(5_000));
    let store = InMemorySnapshotStore::with_snapshot(Snapshot::new(
        sample_state(),
        "v2",
        at_ms(5_000),
    ));
    let cache = MemoryQueryCache::new();
    let (options, _sink) = clocked_options(PersistConfig::new().with_buster("v1"), &clock);

    let outcome = restore(&cache, &store, &options).await;

    assert_eq!(
        outcome,
        RestoreOutcome::Discarded {
            reason: SnapshotError::Busted {
                expected: "v1".to_string(),
                found: "v2".to_string(),
            }
        }
    );
    assert_eq!(cache.hydrate_calls(), 0);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_missing_timestamp_is_removed_without_hydration() {
    let store =
        InMemorySnapshotStore::with_snapshot(Snapshot::from_parts(None, "", sample_state()));
    let cache = MemoryQueryCache::new();
    let (options, _sink) = recorded_options(PersistConfig::default());

    let outcome = restore(&cache, &store, &options).await;

    assert!(matches!(
        outcome,
        RestoreOutcome::Discarded {
            reason: SnapshotError::Corrupt { .. }
        }
    ));
    assert_eq!(cache.hydrate_calls(), 0);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_saved_at_zero_restored_at_1500_with_max_age_1000_is_discarded() {
    let clock = ManualClock::new(at_ms(0));
    let store = InMemorySnapshotStore::<QueryCacheState>::new();
    let config = PersistConfig::new().with_max_age(Duration::from_millis(1_000));
    let (options, _sink) = clocked_options(config, &clock);

    let source = MemoryQueryCache::new().with_queries([("todos", json!([1, 2]))]);
    save(&source, &store, &options).await.unwrap();

    clock.set(at_ms(1_500));
    let target = MemoryQueryCache::new();
    let outcome = restore(&target, &store, &options).await;

    assert!(matches!(
        outcome,
        RestoreOutcome::Discarded {
            reason: SnapshotError::Expired { .. }
        }
    ));
    assert!(target.is_empty().await);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_saved_under_v2_restored_under_v1_is_discarded_though_fresh() {
    let clock = ManualClock::new(at_ms(1_000));
    let store = InMemorySnapshotStore::<QueryCacheState>::new();
    let (save_options, _) = clocked_options(PersistConfig::new().with_buster("v2"), &clock);
    let (restore_options, _) = clocked_options(PersistConfig::new().with_buster("v1"), &clock);

    let source = MemoryQueryCache::new().with_queries([("todos", json!("v2 data"))]);
    save(&source, &store, &save_options).await.unwrap();

    let target = MemoryQueryCache::new();
    let outcome = restore(&target, &store, &restore_options).await;

    assert!(!outcome.is_restored());
    assert!(target.is_empty().await);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_zero_max_age_accepts_same_instant_only() {
    let clock = ManualClock::new(at_ms(42));
    let store = InMemorySnapshotStore::with_snapshot(Snapshot::new(sample_state(), "", at_ms(42)));
    let (options, _) = clocked_options(PersistConfig::new().with_max_age(Duration::ZERO), &clock);

    let cache = MemoryQueryCache::new();
    assert!(restore(&cache, &store, &options).await.is_restored());

    clock.advance(Duration::from_millis(1));
    let later = MemoryQueryCache::new();
    assert!(!restore(&later, &store, &options).await.is_restored());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_future_timestamp_counts_as_fresh() {
    let clock = ManualClock::new(at_ms(1_000));
    let store = InMemorySnapshotStore::with_snapshot(Snapshot::new(sample_state(), "", at_ms(60_000)));
    let (options, _) = clocked_options(PersistConfig::default(), &clock);

    let cache = MemoryQueryCache::new();
    let outcome = restore(&cache, &store, &options).await;

    assert_eq!(outcome, RestoreOutcome::Restored { age: Duration::ZERO });
}

#[tokio::test]
async fn test_storage_read_failure_removes_and_reports() {
    let store = FlakySnapshotStore::with_snapshot(Snapshot::new(sample_state(), "", at_ms(0)));
    store.set_fail_restore(true);
    let cache = MemoryQueryCache::new();
    let (options, sink) = recorded_options(PersistConfig::default());

    let outcome = restore(&cache, &store, &options).await;

    assert!(matches!(outcome, RestoreOutcome::Failed { ref error } if error.is_storage()));
    assert_eq!(cache.hydrate_calls(), 0);
    assert_eq!(store.attempts().remove_calls, 1);
    assert!(store.inner().is_empty().await);
    assert_eq!(sink.errors().len(), 1);
}

#[tokio::test]
async fn test_failing_removal_is_only_reported() {
    let store = FlakySnapshotStore::with_snapshot(Snapshot::new(sample_state(), "", at_ms(0)));
    store.set_fail_restore(true);
    store.set_fail_remove(true);
    let cache = MemoryQueryCache::new();
    let (options, sink) = recorded_options(PersistConfig::default());

    let outcome = restore(&cache, &store, &options).await;

    assert!(matches!(outcome, RestoreOutcome::Failed { .. }));
    assert_eq!(store.attempts().remove_calls, 1);
    let errors = sink.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(PersistError::is_storage));
}

#[tokio::test]
async fn test_hydrate_failure_removes_snapshot() {
    let clock = ManualClock::new(at_ms(100));
    let store = InMemorySnapshotStore::with_snapshot(Snapshot::new(sample_state(), "", at_ms(0)));
    let cache = MemoryQueryCache::new();
    cache.set_fail_hydrate(true);
    let (options, sink) = clocked_options(PersistConfig::default(), &clock);

    let outcome = restore(&cache, &store, &options).await;

    assert!(matches!(outcome, RestoreOutcome::Failed { ref error } if error.is_serialization()));
    assert_eq!(cache.hydrate_calls(), 1);
    assert!(store.is_empty().await);
    assert_eq!(sink.errors().len(), 1);
}

#[tokio::test]
async fn test_undecodable_record_is_removed() {
    let backend = Arc::new(MemoryKvStore::new());
    backend
        .set_item("REHYDRA_OFFLINE_CACHE", "{not json")
        .await
        .unwrap();
    let store: KvSnapshotStore<_, QueryCacheState> = KvSnapshotStore::new(Arc::clone(&backend));
    let cache = MemoryQueryCache::new();
    let (options, _) = recorded_options(PersistConfig::default());

    let outcome = restore(&cache, &store, &options).await;

    assert!(matches!(outcome, RestoreOutcome::Failed { ref error } if error.is_serialization()));
    assert!(backend.is_empty().await);
}

#[tokio::test]
async fn test_production_mode_suppresses_diagnostics() {
    let store = FlakySnapshotStore::<QueryCacheState>::new();
    store.set_fail_restore(true);
    let sink = Arc::new(RecordingSink::new());
    let options = PersistOptions::<MemoryQueryCache>::new(
        PersistConfig::new().with_mode(BuildMode::Production),
    )
    .with_sink(sink.clone());

    let outcome = restore(&MemoryQueryCache::new(), &store, &options).await;

    assert!(matches!(outcome, RestoreOutcome::Failed { .. }));
    assert_eq!(store.attempts().remove_calls, 1);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_cache_sink_is_used_when_none_configured() {
    let cache_sink = Arc::new(RecordingSink::new());
    let cache = MemoryQueryCache::new().with_sink(cache_sink.clone());
    let store = InMemorySnapshotStore::with_snapshot(Snapshot::from_parts(None, "", sample_state()));
    let options = PersistOptions::<MemoryQueryCache>::new(
        PersistConfig::new().with_mode(BuildMode::Development),
    );

    restore(&cache, &store, &options).await;

    assert_eq!(cache_sink.warnings().len(), 1);
}

#[tokio::test]
async fn test_hydrate_options_are_passed_through() {
    let clock = ManualClock::new(at_ms(10));
    let mut state = sample_state();
    state.queries.insert(
        "stale".to_string(),
        QueryEntry {
            data: json!(0),
            stale: true,
        },
    );
    let store = InMemorySnapshotStore::with_snapshot(Snapshot::new(state, "", at_ms(0)));
    let (options, _) = clocked_options(PersistConfig::default(), &clock);
    let options = options.with_hydrate_options(QueryHydrateOptions { skip_stale: true });

    let cache = MemoryQueryCache::new();
    assert!(restore(&cache, &store, &options).await.is_restored());

    assert_eq!(cache.len().await, sample_state().len());
    assert!(cache.get("stale").await.is_none());
}
