//! Directory-backed key-value store.
//!
//! Each key maps to one JSON file named after the hex-encoded key, so any
//! key is a safe file name. Writes go to a uniquely named temp file that
//! is synced and then renamed over the target, so a reader sees either the
//! old value or the new one, never a torn write. On Unix the directory is
//! synced after the rename so the new entry survives a power loss.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rehydra_core::{PersistResult, StorageError};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::KeyValueStore;

/// One file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where `key` is stored.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(key)))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!(".{}.{}.tmp", hex::encode(key), Uuid::now_v7()))
    }
}

#[async_trait]
impl KeyValueStore for FileKvStore {
    async fn get_item(&self, key: &str) -> PersistResult<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFailed {
                reason: format!("{}: {}", path.display(), e),
            }
            .into()),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> PersistResult<()> {
        let write_failed = |path: &Path, e: std::io::Error| StorageError::WriteFailed {
            reason: format!("{}: {}", path.display(), e),
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| write_failed(&self.dir, e))?;

        let target = self.path_for(key);
        let temp = self.temp_path_for(key);

        if let Err(e) = write_synced(&temp, &target, value).await {
            if let Err(cleanup) = tokio::fs::remove_file(&temp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    tracing::debug!(path = %temp.display(), error = %cleanup, "Failed to remove temp file");
                }
            }
            return Err(write_failed(&target, e).into());
        }

        Ok(())
    }

    async fn remove_item(&self, key: &str) -> PersistResult<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemoveFailed {
                reason: format!("{}: {}", path.display(), e),
            }
            .into()),
        }
    }
}

async fn write_synced(temp: &Path, target: &Path, value: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(temp).await?;
    file.write_all(value.as_bytes()).await?;
    file.sync_all().await?;
    tokio::fs::rename(temp, target).await?;
    sync_parent(target).await
}

/// Persist the directory entry created by the rename.
#[cfg(unix)]
async fn sync_parent(target: &Path) -> std::io::Result<()> {
    match target.parent() {
        Some(dir) => tokio::fs::File::open(dir).await?.sync_all().await,
        None => Ok(()),
    }
}

#[cfg(not(unix))]
async fn sync_parent(_target: &Path) -> std::io::Result<()> {
    Ok(())
}
