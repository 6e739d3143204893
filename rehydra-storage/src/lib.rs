//! REHYDRA Storage - Snapshot Store Implementations
//!
//! Storage backends for the single snapshot slot the persistence protocol
//! writes to:
//!
//! - [`InMemorySnapshotStore`] keeps the snapshot as a typed value
//! - [`KvSnapshotStore`] encodes it into any string [`KeyValueStore`]:
//!   [`MemoryKvStore`], [`FileKvStore`] or [`LmdbKvStore`]

pub mod kv;
pub mod memory;

pub use kv::{
    FileKvStore, JsonCodec, KeyValueStore, KvSnapshotStore, LmdbKvStore, LmdbStoreError,
    MemoryKvStore, NoRetry, PersistRetry, SnapshotCodec,
};
pub use memory::{InMemorySnapshotStore, StoreStats, StoreStatsSnapshot};
