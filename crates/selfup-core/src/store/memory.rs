// # Memory Key-Value Store
//
// In-memory implementation of KeyValueStore.
//
// Nothing survives a restart: ignored versions are forgotten and the user
// will be notified about them again. Useful for tests and for deployments
// where the outer application owns persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::KeyValueStore;

/// In-memory key-value store
///
/// # Example
///
/// ```rust,no_run
/// use selfup_core::store::MemoryKeyValueStore;
/// use selfup_core::traits::KeyValueStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryKeyValueStore::new();
///     store.save("UpdateData", serde_json::json!({ "ignore_versions": [] })).await?;
///     assert!(store.get("UpdateData").await?.is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    inner: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl MemoryKeyValueStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of keys in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Remove every key
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, Error> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: serde_json::Value) -> Result<(), Error> {
        self.inner.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.inner.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.inner.read().await.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}
