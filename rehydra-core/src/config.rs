//! Configuration types

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BUSTER, DEFAULT_MAX_AGE_MS, DEFAULT_THROTTLE_MS, ENV_BUSTER, ENV_ENABLED,
    ENV_ENVIRONMENT, ENV_MAX_AGE_MS, ENV_THROTTLE_MS,
};
use crate::error::{ConfigError, PersistResult};
use crate::snapshot::SnapshotPolicy;

/// Build/runtime mode. Diagnostics are only emitted outside production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Development,
    Production,
}

impl BuildMode {
    /// Development for debug builds, Production for release builds.
    pub fn from_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl Default for BuildMode {
    fn default() -> Self {
        Self::from_build()
    }
}

impl FromStr for BuildMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "test" => Ok(Self::Development),
            other => Err(ConfigError::InvalidValue {
                field: ENV_ENVIRONMENT.to_string(),
                value: other.to_string(),
                reason: "expected production or development".to_string(),
            }),
        }
    }
}

/// Persistence settings shared by restore, save and watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistConfig {
    /// Snapshots saved under a different buster are discarded on restore.
    pub buster: String,
    /// Snapshots older than this are discarded on restore.
    pub max_age: Duration,
    /// Trailing delay the change watcher waits before saving.
    pub throttle: Duration,
    /// Gates diagnostic reporting.
    pub mode: BuildMode,
    /// When false, `start` neither restores nor subscribes.
    pub enabled: bool,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            buster: DEFAULT_BUSTER.to_string(),
            max_age: Duration::from_millis(DEFAULT_MAX_AGE_MS),
            throttle: Duration::from_millis(DEFAULT_THROTTLE_MS),
            mode: BuildMode::default(),
            enabled: true,
        }
    }
}

impl PersistConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buster(mut self, buster: impl Into<String>) -> Self {
        self.buster = buster.into();
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The restore-time acceptance policy derived from this config.
    pub fn policy(&self) -> SnapshotPolicy {
        SnapshotPolicy::new(self.buster.clone(), self.max_age)
    }

    /// Reject values the snapshot arithmetic cannot represent.
    pub fn validate(&self) -> PersistResult<()> {
        if chrono::Duration::from_std(self.max_age).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "max_age".to_string(),
                value: format!("{:?}", self.max_age),
                reason: "exceeds the representable millisecond range".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Create PersistConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `REHYDRA_BUSTER`: buster token (default: empty)
    /// - `REHYDRA_MAX_AGE_MS`: max snapshot age (default: 86400000)
    /// - `REHYDRA_THROTTLE_MS`: watcher save delay (default: 0)
    /// - `REHYDRA_ENVIRONMENT`: `production` or `development` (default: build mode)
    /// - `REHYDRA_ENABLED`: `false`/`0` disables persistence (default: true)
    pub fn from_env() -> PersistResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> PersistResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let buster = lookup(ENV_BUSTER).unwrap_or(defaults.buster);
        let max_age = match lookup(ENV_MAX_AGE_MS) {
            Some(raw) => Duration::from_millis(parse_millis(ENV_MAX_AGE_MS, &raw)?),
            None => defaults.max_age,
        };
        let throttle = match lookup(ENV_THROTTLE_MS) {
            Some(raw) => Duration::from_millis(parse_millis(ENV_THROTTLE_MS, &raw)?),
            None => defaults.throttle,
        };
        let mode = match lookup(ENV_ENVIRONMENT) {
            Some(raw) => raw.parse::<BuildMode>()?,
            None => defaults.mode,
        };
        let enabled = lookup(ENV_ENABLED)
            .map(|s| {
                let s = s.trim().to_lowercase();
                s != "false" && s != "0"
            })
            .unwrap_or(defaults.enabled);

        let config = Self {
            buster,
            max_age,
            throttle,
            mode,
            enabled,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_millis(field: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
