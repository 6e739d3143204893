//! LMDB-backed key-value store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep snapshots in a
//! memory-mapped, crash-safe environment on local disk.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get_item`
//! - Write transactions for `set_item` and `remove_item`
//!
//! A single writer is serialised by LMDB itself, which is what gives the
//! snapshot slot its last-write-wins behaviour across concurrent saves.
//!
//! Transactions run inline on the calling task rather than on the blocking
//! pool. Each one touches a single small value, and a write waits on
//! LMDB's writer lock only while another write to the same environment is
//! committing. Callers sharing one environment between many heavy writers
//! should move calls onto `tokio::task::spawn_blocking`.

use std::path::Path;

use async_trait::async_trait;
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions};
use rehydra_core::{PersistError, PersistResult, StorageError};

use super::KeyValueStore;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbStoreError to PersistError.
impl From<LmdbStoreError> for PersistError {
    fn from(e: LmdbStoreError) -> Self {
        PersistError::Storage(StorageError::Backend {
            backend: "lmdb".to_string(),
            reason: e.to_string(),
        })
    }
}

/// LMDB key-value store with a single unnamed database.
///
/// # Example
///
/// ```ignore
/// use rehydra_storage::kv::{KvSnapshotStore, LmdbKvStore};
///
/// let backend = LmdbKvStore::new("/var/lib/app/rehydra", 16)?;
/// let store = KvSnapshotStore::new(backend);
/// ```
pub struct LmdbKvStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Str, Str>,
}

impl LmdbKvStore {
    /// Create a new LMDB key-value store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per directory by this
        // process; LMDB forbids opening the same path twice concurrently.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    /// Number of keys currently stored.
    pub fn entry_count(&self) -> Result<u64, LmdbStoreError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        self.db
            .len(&rtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for LmdbKvStore {
    async fn get_item(&self, key: &str) -> PersistResult<Option<String>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let value = self
            .db
            .get(&rtxn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?
            .map(str::to_string);

        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> PersistResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key, value)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(())
    }

    async fn remove_item(&self, key: &str) -> PersistResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let deleted = self
            .db
            .delete(&mut wtxn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        if !deleted {
            tracing::trace!(key, "Remove of absent LMDB key");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbKvStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbKvStore::new(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (store, _dir) = create_test_store();
        assert!(store.get_item("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let (store, _dir) = create_test_store();
        store.set_item("slot", "first").await.unwrap();
        store.set_item("slot", "second").await.unwrap();

        assert_eq!(store.get_item("slot").await.unwrap().as_deref(), Some("second"));
        assert_eq!(store.entry_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_then_missing() {
        let (store, _dir) = create_test_store();
        store.set_item("slot", "value").await.unwrap();
        store.remove_item("slot").await.unwrap();
        store.remove_item("slot").await.unwrap();

        assert!(store.get_item("slot").await.unwrap().is_none());
        assert_eq!(store.entry_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store = LmdbKvStore::new(temp_dir.path(), 10).expect("open");
            store.set_item("slot", "durable").await.unwrap();
        }
        let reopened = LmdbKvStore::new(temp_dir.path(), 10).expect("reopen");
        assert_eq!(
            reopened.get_item("slot").await.unwrap().as_deref(),
            Some("durable")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_writers_serialise() {
        let (store, _dir) = create_test_store();
        let store = std::sync::Arc::new(store);

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move { store.set_item("slot", &format!("v{}", i)).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let value = store.get_item("slot").await.unwrap().expect("value");
        assert!(value.starts_with('v'));
        assert_eq!(store.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_error_converts_to_storage_backend() {
        let err: PersistError = LmdbStoreError::Transaction("boom".to_string()).into();
        assert!(matches!(
            err,
            PersistError::Storage(StorageError::Backend { ref backend, .. }) if backend == "lmdb"
        ));
    }
}
