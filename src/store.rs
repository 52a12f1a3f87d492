//! KeyValueStore trait - the raw persistence backend for settings.
//!
//! Values are opaque bytes; typing and defaults live one layer up in
//! [`KeyedDefaults`](crate::KeyedDefaults). Backends publish a
//! [`WatchEvent`](crate::WatchEvent) for every successful write or delete.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::{Result, StateError};
use crate::watch::WatchStream;

/// Maximum key length in bytes.
pub const MAX_KEY_LENGTH: usize = 1024;

/// A stored value with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
    /// Monotonically increasing version (per key).
    pub version: u64,
    pub updated_at: SystemTime,
}

/// Validate that a key is well-formed.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StateError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(StateError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if !key.starts_with('/') {
        return Err(StateError::InvalidKey(
            "key must start with '/'".to_string(),
        ));
    }
    Ok(())
}

/// Persistent key-value backend.
///
/// Writes are complete when the returned future resolves; nothing is queued
/// behind the caller's back.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read an entry. `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Entry>>;

    /// Write a value, returning the key's new version.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<u64>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys starting with `prefix`, in lexicographic order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove every key starting with `prefix`.
    async fn clear(&self, prefix: &str) -> Result<usize> {
        let keys = self.list(prefix).await?;
        for key in &keys {
            self.delete(key).await?;
        }
        Ok(keys.len())
    }

    /// Watch an exact key, or a prefix when the pattern ends with `*`.
    fn watch(&self, pattern: &str) -> Result<WatchStream>;

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
