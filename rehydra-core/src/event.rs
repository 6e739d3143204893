//! Mutation notifications emitted by a live cache.

use serde::{Deserialize, Serialize};

/// What happened to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    Added,
    Updated,
    Removed,
    Cleared,
}

/// A single cache mutation.
///
/// The change watcher treats every event the same way; `kind` and `key`
/// exist for callers that share the notification stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    /// Key of the affected entry, absent for whole-cache events.
    pub key: Option<String>,
}

impl CacheEvent {
    pub fn added(key: impl Into<String>) -> Self {
        Self {
            kind: CacheEventKind::Added,
            key: Some(key.into()),
        }
    }

    pub fn updated(key: impl Into<String>) -> Self {
        Self {
            kind: CacheEventKind::Updated,
            key: Some(key.into()),
        }
    }

    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            kind: CacheEventKind::Removed,
            key: Some(key.into()),
        }
    }

    pub fn cleared() -> Self {
        Self {
            kind: CacheEventKind::Cleared,
            key: None,
        }
    }
}
