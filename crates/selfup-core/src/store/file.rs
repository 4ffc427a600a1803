// # File Key-Value Store
//
// JSON-file implementation of KeyValueStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write to `<path>.tmp`, then rename over `<path>`
// - Backup: the previous file is copied to `<path>.backup` before each write
// - Recovery: a file that fails to parse is replaced by its backup
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "entries": {
//     "UpdateData": { "ignore_versions": ["2.0.0"] }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::KeyValueStore;

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based key-value store
///
/// Every `save`/`delete` is written through to disk immediately. Memory
/// only changes once the write succeeded, so a failed write leaves the
/// previous value visible.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: Arc<RwLock<Entries>>,
}

type Entries = HashMap<String, serde_json::Value>;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    entries: HashMap<String, serde_json::Value>,
}

/// Why a store file could not be loaded
enum LoadError {
    /// File exists but is not a valid store file
    Corrupt(String),
    /// File could not be read at all
    Io(Error),
}

impl FileKeyValueStore {
    /// Create or load a file store at `path`
    ///
    /// Parent directories are created as needed. A corrupted file is
    /// recovered from its backup; if the backup is unusable too the store
    /// starts empty.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let entries = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<HashMap<String, serde_json::Value>, Error> {
        match Self::load(path).await {
            Ok(entries) => {
                tracing::debug!("Loaded store from {}: {} keys", path.display(), entries.len());
                Ok(entries)
            }
            Err(LoadError::Io(e)) => Err(e),
            Err(LoadError::Corrupt(reason)) => {
                tracing::warn!(
                    "Store file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    reason
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty store.");
                    return Ok(HashMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(entries) => {
                        tracing::info!("Recovered store from backup: {} keys", entries.len());
                        if let Err(e) = fs::copy(&backup_path, path).await {
                            tracing::error!("Failed to restore store file from backup: {}", e);
                        }
                        Ok(entries)
                    }
                    Err(_) => {
                        tracing::error!("Backup also unusable. Starting with empty store.");
                        Ok(HashMap::new())
                    }
                }
            }
        }
    }

    async fn load(path: &Path) -> Result<HashMap<String, serde_json::Value>, LoadError> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Io(Error::store(format!(
                "Failed to read store file {}: {}",
                path.display(),
                e
            )))
        })?;

        let file: StoreFileFormat =
            serde_json::from_str(&content).map_err(|e| LoadError::Corrupt(e.to_string()))?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.entries)
    }

    /// Write `entries` to disk atomically
    ///
    /// Callers hold the write lock so writes never interleave.
    async fn write(&self, entries: &Entries) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(&StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            entries: entries.clone(),
        })?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!("Failed to create {}: {}", temp_path.display(), e))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!("Failed to write {}: {}", temp_path.display(), e))
            })?;
            file.flush().await.map_err(|e| {
                Error::store(format!("Failed to flush {}: {}", temp_path.display(), e))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create store backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, Error> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: serde_json::Value) -> Result<(), Error> {
        let mut entries = self.entries.write().await;
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value);
        self.write(&updated).await?;
        *entries = updated;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut updated = entries.clone();
        updated.remove(key);
        self.write(&updated).await?;
        *entries = updated;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let entries = self.entries.write().await;
        self.write(&entries).await
    }
}
