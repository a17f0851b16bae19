//! Key/value persistence for control-plane objects.

pub mod client;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Ordered key/value store. Keys are `/`-separated paths.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store a value under the given key.
    async fn put(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    /// Retrieve the value for a key, or `None` if it does not exist.
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// List all key-value pairs whose keys start with `prefix`, in key order.
    async fn list_prefix(&self, prefix: &str) -> anyhow::Result<Vec<(String, Vec<u8>)>>;
}

/// Read and decode a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> anyhow::Result<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode and store a JSON value.
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> anyhow::Result<()> {
    let data = serde_json::to_vec(value)?;
    store.put(key, &data).await
}
