// # Key-Value Store Trait
//
// Defines the interface for generic persisted records.
//
// ## Purpose
//
// The orchestrator persists a single record, `UpdateData` (the set of
// versions the user chose to ignore), under a fixed key. The store itself
// knows nothing about updates: it maps string keys to JSON values.
//
// ## Implementations
//
// - `MemoryKeyValueStore`: tests and ephemeral deployments
// - `FileKeyValueStore`: JSON file with atomic writes and backup recovery
//
// ## Usage
//
// ```rust,ignore
// use selfup_core::traits::{KeyValueStore, KeyValueStoreExt};
// use selfup_core::model::{UpdateData, UPDATE_DATA_KEY};
//
// let data: Option<UpdateData> = store.get_as(UPDATE_DATA_KEY).await?;
// store.save_as(UPDATE_DATA_KEY, &data.unwrap_or_default()).await?;
// ```

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Error;

/// Trait for key-value store implementations
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the raw value stored under `key`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))`: The stored value
    /// - `Ok(None)`: Nothing stored under this key
    /// - `Err(Error)`: Storage error
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, Error>;

    /// Store `value` under `key`, replacing any previous value
    async fn save(&self, key: &str, value: serde_json::Value) -> Result<(), Error>;

    /// Delete the value under `key` (no error if it didn't exist)
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// List all keys in the store
    async fn keys(&self) -> Result<Vec<String>, Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), Error>;
}

/// Typed access on top of [`KeyValueStore`]
///
/// Blanket-implemented for every store, including trait objects.
#[async_trait]
pub trait KeyValueStoreExt: KeyValueStore {
    /// Get and deserialize the value under `key`
    async fn get_as<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                Error::store(format!("Stored value under '{}' has unexpected shape: {}", key, e))
            }),
            None => Ok(None),
        }
    }

    /// Serialize and save `value` under `key`
    async fn save_as<T>(&self, key: &str, value: &T) -> Result<(), Error>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)?;
        self.save(key, value).await
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
