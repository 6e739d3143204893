//! Constants for REHYDRA
//!
//! Default values shared by the configuration layer and the storage adapters.

// ============================================================================
// SNAPSHOT VALIDATION
// ============================================================================

/// Default maximum snapshot age in milliseconds (24 hours)
pub const DEFAULT_MAX_AGE_MS: u64 = 86_400_000;

/// Default buster token; only matches snapshots saved without a buster
pub const DEFAULT_BUSTER: &str = "";

// ============================================================================
// CHANGE WATCHER
// ============================================================================

/// Default trailing delay before a notification-triggered save (disabled)
pub const DEFAULT_THROTTLE_MS: u64 = 0;

// ============================================================================
// KEY-VALUE STORAGE
// ============================================================================

/// Default key under which key-value backends store the snapshot
pub const DEFAULT_STORAGE_KEY: &str = "REHYDRA_OFFLINE_CACHE";

// ============================================================================
// ENVIRONMENT VARIABLES
// ============================================================================

pub const ENV_BUSTER: &str = "REHYDRA_BUSTER";
pub const ENV_MAX_AGE_MS: &str = "REHYDRA_MAX_AGE_MS";
pub const ENV_THROTTLE_MS: &str = "REHYDRA_THROTTLE_MS";
pub const ENV_ENVIRONMENT: &str = "REHYDRA_ENVIRONMENT";
pub const ENV_ENABLED: &str = "REHYDRA_ENABLED";
