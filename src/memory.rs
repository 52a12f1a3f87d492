//! In-memory key-value backend.
//!
//! Not durable: data is lost on process exit. Used by tests and by
//! previews that should not touch the user's stored settings.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::error::Result;
use crate::store::{validate_key, Entry, KeyValueStore};
use crate::watch::{WatchEvent, WatchSender, WatchStream};

/// In-memory implementation of [`KeyValueStore`].
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Entry>>,
    watcher: WatchSender,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a store whose change channel holds `watch_capacity` events.
    pub fn with_capacity(watch_capacity: usize) -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            watcher: WatchSender::new(watch_capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        validate_key(key)?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        validate_key(key)?;

        // The write lock is held while publishing so events leave in write order.
        let mut data = self.data.write();
        let previous = data.get(key).map(|e| e.version);
        let new_version = previous.map_or(1, |v| v + 1);

        data.insert(
            key.to_string(),
            Entry {
                key: key.to_string(),
                value: value.clone(),
                version: new_version,
                updated_at: SystemTime::now(),
            },
        );

        let event = match previous {
            Some(_) => WatchEvent::updated(key, value, new_version),
            None => WatchEvent::created(key, value, new_version),
        };
        self.watcher.send(event);

        Ok(new_version)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let mut data = self.data.write();
        if data.remove(key).is_some() {
            self.watcher.send(WatchEvent::deleted(key));
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let data = self.data.read();
        Ok(data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn watch(&self, pattern: &str) -> Result<WatchStream> {
        Ok(self.watcher.subscribe(pattern))
    }
}
