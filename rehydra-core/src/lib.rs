//! REHYDRA Core - Snapshot Model and Collaborator Traits
//!
//! Defines the persisted [`Snapshot`], its validation policy, the error
//! taxonomy, configuration, and the two traits the persistence protocol
//! is written against: [`SnapshotStore`] and [`LiveCache`].
//! The protocol itself lives in rehydra-client.

pub mod clock;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod snapshot;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BuildMode, PersistConfig};
pub use diagnostics::{DiagnosticSink, Diagnostics, TracingSink};
pub use error::{
    ConfigError, PersistError, PersistResult, SerializationError, SnapshotError, StorageError,
    WatchError,
};
pub use event::{CacheEvent, CacheEventKind};
pub use snapshot::{Snapshot, SnapshotPolicy};
pub use traits::{LiveCache, SnapshotStore};
