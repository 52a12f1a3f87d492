//! Typed access to a [`KeyValueStore`] with per-read defaults.
//!
//! Values are stored as JSON under `namespace + key`. Reads never fail: an
//! absent key, an unreachable backend or a value that no longer decodes
//! all yield the caller's default.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_stream::Stream;
use tracing::warn;

use crate::error::Result;
use crate::store::KeyValueStore;
use crate::watch::WatchStream;

/// Default namespace for settings keys.
pub const DEFAULT_NAMESPACE: &str = "/settings/";

/// Typed reads and writes over a shared backend.
#[derive(Clone)]
pub struct KeyedDefaults {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl KeyedDefaults {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_namespace(store, DEFAULT_NAMESPACE)
    }

    /// `namespace` must start and end with `/`.
    pub fn with_namespace(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    fn path(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Read `key`, falling back to `default`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let path = self.path(key);
        match self.store.get(&path).await {
            Ok(Some(entry)) => match serde_json::from_slice(&entry.value) {
                Ok(value) => value,
                Err(err) => {
                    warn!(key = %path, error = %err, "stored value does not decode, using default");
                    default
                }
            },
            Ok(None) => default,
            Err(err) => {
                warn!(key = %path, error = %err, "settings backend unavailable, using default");
                default
            }
        }
    }

    /// Persist `value` under `key` and notify subscribers.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store.set(&self.path(key), bytes).await?;
        Ok(())
    }

    /// Remove `key`; later reads return their default.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.delete(&self.path(key)).await
    }

    /// Values written to `key` after this call.
    ///
    /// A [`KeyChange::Lagged`] item stands in for writes the subscriber
    /// missed; the stored value may differ from the last one seen.
    pub fn changes<T: DeserializeOwned>(&self, key: &str) -> Result<KeyChanges<T>> {
        let path = self.path(key);
        let events = self.store.watch(&path)?;
        Ok(KeyChanges {
            events,
            _marker: PhantomData,
        })
    }
}

/// One item of a [`KeyChanges`] stream.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyChange<T> {
    /// A newly written value.
    Value(T),
    /// Some writes were missed.
    Lagged,
}

/// Decoded change stream for one key.
///
/// Deletions and values that fail to decode are skipped.
pub struct KeyChanges<T> {
    events: WatchStream,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Stream for KeyChanges<T> {
    type Item = KeyChange<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<KeyChange<T>>> {
        loop {
            let event = match Pin::new(&mut self.events).poll_next(cx) {
                Poll::Ready(Some(event)) => event,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            };
            if event.is_lagged() {
                return Poll::Ready(Some(KeyChange::Lagged));
            }
            let Some(raw) = event.new_value else {
                continue;
            };
            match serde_json::from_slice(&raw) {
                Ok(value) => return Poll::Ready(Some(KeyChange::Value(value))),
                Err(err) => {
                    warn!(key = %event.key, error = %err, "skipping undecodable change");
                }
            }
        }
    }
}
