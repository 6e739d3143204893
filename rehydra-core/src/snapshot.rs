//! The persisted unit: client state plus the metadata needed to judge it.
//!
//! A [`Snapshot`] is built once by the save path and never mutated; the
//! restore path only reads it. Validation against a [`SnapshotPolicy`]
//! decides whether a stored snapshot may be replayed into the live cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{DEFAULT_BUSTER, DEFAULT_MAX_AGE_MS};
use crate::error::SnapshotError;

/// A point-in-time capture of the whole live cache.
///
/// Wire layout: `{"timestamp": <ms | null>, "buster": "...", "clientState": ...}`.
/// A record without `timestamp` still deserializes so the restore path can
/// recognise and discard it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    buster: String,
    #[serde(rename = "clientState")]
    client_state: S,
}

impl<S> Snapshot<S> {
    /// Capture `client_state` at `timestamp` under `buster`.
    pub fn new(client_state: S, buster: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
            buster: buster.into(),
            client_state,
        }
    }

    /// Reassemble a snapshot from stored parts, including ones with no timestamp.
    pub fn from_parts(
        timestamp: Option<DateTime<Utc>>,
        buster: impl Into<String>,
        client_state: S,
    ) -> Self {
        Self {
            timestamp,
            buster: buster.into(),
            client_state,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn buster(&self) -> &str {
        &self.buster
    }

    pub fn client_state(&self) -> &S {
        &self.client_state
    }

    /// Consume the snapshot and hand over the client state for hydration.
    pub fn into_client_state(self) -> S {
        self.client_state
    }

    /// Age of the snapshot as of `now`.
    ///
    /// Returns `None` when the timestamp is missing. A timestamp in the
    /// future (clock skew) counts as age zero.
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.timestamp.map(|ts| {
            now.signed_duration_since(ts)
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }

    /// Check the snapshot against `policy`.
    ///
    /// Missing timestamp is reported first, then expiry, then a buster
    /// mismatch.
    pub fn validate(&self, policy: &SnapshotPolicy, now: DateTime<Utc>) -> Result<(), SnapshotError> {
        let age = self.age(now).ok_or_else(|| SnapshotError::Corrupt {
            reason: "missing timestamp".to_string(),
        })?;

        if age > policy.max_age {
            return Err(SnapshotError::Expired {
                age,
                max_age: policy.max_age,
            });
        }

        if self.buster != policy.buster {
            return Err(SnapshotError::Busted {
                expected: policy.buster.clone(),
                found: self.buster.clone(),
            });
        }

        Ok(())
    }
}

/// What a stored snapshot must satisfy to be restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// Buster the snapshot must carry.
    pub buster: String,
    /// Oldest acceptable snapshot.
    pub max_age: Duration,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            buster: DEFAULT_BUSTER.to_string(),
            max_age: Duration::from_millis(DEFAULT_MAX_AGE_MS),
        }
    }
}

impl SnapshotPolicy {
    pub fn new(buster: impl Into<String>, max_age: Duration) -> Self {
        Self {
            buster: buster.into(),
            max_age,
        }
    }
}
