//! Key-value store used for subscription records and cached artifacts.
//!
//! Values are opaque strings. Each entry may carry a JSON metadata blob and
//! an expiry; expired entries are invisible to every read operation.

pub mod config;
mod filesystem;
mod memory;

pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt store entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("key must not be empty")]
    EmptyKey,
}

/// A value together with the metadata it was written with.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredValue {
    pub value: String,
    pub metadata: Option<Value>,
}

#[derive(Clone, Debug, Default)]
pub struct PutOptions {
    pub metadata: Option<Value>,
    /// Entry disappears this long after the write.
    pub expiration_ttl: Option<Duration>,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get_with_metadata(&self, key: &str) -> Result<Option<StoredValue>, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_with_metadata(key).await?.map(|stored| stored.value))
    }

    /// Last writer wins.
    async fn put(&self, key: &str, value: String, options: PutOptions) -> Result<(), StoreError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Live keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Used by the readiness probe.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn check_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::EmptyKey);
    }
    Ok(())
}

/// Builds the backend selected in config.
pub fn from_config(config: &config::StoreConfig) -> Arc<dyn KvStore> {
    match config {
        config::StoreConfig::Memory => {
            tracing::warn!("using the in-memory store, records are lost on restart");
            Arc::new(MemoryStore::new())
        }
        config::StoreConfig::Filesystem { path } => Arc::new(FilesystemStore::new(path)),
    }
}
