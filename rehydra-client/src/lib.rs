//! REHYDRA Client - Persisted Query-Cache Protocol
//!
//! Restores a live query cache from its last snapshot at startup and keeps
//! the snapshot current as the cache changes:
//!
//! - [`restore`] reads, validates and replays the stored snapshot, never failing
//! - [`save`] dehydrates the cache and overwrites the stored snapshot
//! - [`watch`] saves after every mutation through a coalescing worker
//! - [`start`] runs restore then watch; [`start_detached`] does so in the background
//!
//! ```ignore
//! use std::sync::Arc;
//! use rehydra_client::{start, PersistOptions};
//! use rehydra_core::PersistConfig;
//! use rehydra_storage::{FileKvStore, KvSnapshotStore};
//!
//! let store = Arc::new(KvSnapshotStore::new(FileKvStore::new("/var/lib/app/cache")));
//! let options = PersistOptions::new(PersistConfig::from_env()?.with_buster("v2"));
//! let handle = start(&cache, store, options).await;
//! ```

pub mod options;
pub mod restore;
pub mod save;
pub mod session;
pub mod watch;

pub use options::PersistOptions;
pub use restore::{restore, RestoreOutcome};
pub use save::save;
pub use session::{start, start_detached, DetachedStart};
pub use watch::{watch, WatchHandle, WatchStats, WatchStatsSnapshot};

pub use rehydra_storage as storage;
