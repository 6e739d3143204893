//! Error types for REHYDRA operations

use std::time::Duration;
use thiserror::Error;

/// Reasons a stored snapshot is refused during restore.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Corrupt snapshot: {reason}")]
    Corrupt { reason: String },

    #[error("Expired snapshot: age {age:?} exceeds max age {max_age:?}")]
    Expired { age: Duration, max_age: Duration },

    #[error("Busted snapshot: expected buster {expected:?}, found {found:?}")]
    Busted { expected: String, found: String },
}

/// Storage backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Snapshot read failed: {reason}")]
    ReadFailed { reason: String },

    #[error("Snapshot write failed: {reason}")]
    WriteFailed { reason: String },

    #[error("Snapshot removal failed: {reason}")]
    RemoveFailed { reason: String },

    #[error("Backend {backend} error: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Errors raised while converting cache state to or from its stored form.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SerializationError {
    #[error("Dehydrate failed: {reason}")]
    Dehydrate { reason: String },

    #[error("Hydrate failed: {reason}")]
    Hydrate { reason: String },

    #[error("Snapshot encoding failed: {reason}")]
    Encode { reason: String },

    #[error("Snapshot decoding failed: {reason}")]
    Decode { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Change watcher errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("Change watcher has stopped")]
    Stopped,
}

/// Master error type for all REHYDRA errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistError {
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),
}

impl PersistError {
    /// Whether this error came from the storage backend.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Whether this error came from dehydrate, hydrate or snapshot encoding.
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }
}

/// Result type alias for REHYDRA operations.
pub type PersistResult<T> = Result<T, PersistError>;

// =============================================================================
// TESTS
// =============================================================================
