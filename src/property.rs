//! A single persisted, observable setting.
//!
//! A [`Property`] mirrors one key of a [`KeyedDefaults`] store in memory.
//! Two one-way flows keep them in sync:
//!
//! - local → store: [`Property::set`] updates memory, then persists;
//! - store → local: [`Property::spawn_mirror`] follows writes made by anyone
//!   else (another handle, a direct store write) and applies them.
//!
//! The property's own writes come back through the store's change stream.
//! Those echoes are recognised and dropped, so a burst of local writes never
//! gets rolled back by a late notification.

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::keyed::{KeyChange, KeyedDefaults};

/// Bounds every property value satisfies.
pub trait PropertyValue:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> PropertyValue for T where
    T: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

const CHANGE_CAPACITY: usize = 64;

pub struct Property<T> {
    key: &'static str,
    default: T,
    current: RwLock<T>,
    changes: broadcast::Sender<T>,
    store: KeyedDefaults,
    // Values written locally whose store notification has not come back yet.
    echoes: Mutex<VecDeque<T>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl<T: PropertyValue> Property<T> {
    /// Load the property, seeding it from the store.
    pub async fn load(store: KeyedDefaults, key: &'static str, default: T) -> Self {
        let value = store.get(key, default.clone()).await;
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            key,
            default,
            current: RwLock::new(value),
            changes,
            store,
            echoes: Mutex::new(VecDeque::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// The last known value.
    pub fn get(&self) -> T {
        self.current.read().clone()
    }

    /// Update the value and persist it.
    ///
    /// Writing the current value again does nothing. A failed write is
    /// logged; the in-memory value stays updated.
    pub async fn set(&self, value: T) {
        let _write = self.write_lock.lock().await;
        {
            let mut current = self.current.write();
            if !self.assign(&mut current, value.clone()) {
                return;
            }
            // Recorded before the value lock is released, so the mirror
            // never sees the new value without its pending echo.
            self.echoes.lock().push_back(value.clone());
        }

        if let Err(err) = self.store.set(self.key, &value).await {
            warn!(key = self.key, error = %err, "failed to persist setting");
            self.echoes.lock().pop_back();
        }
    }

    /// Restore the default value.
    pub async fn reset(&self) {
        self.set(self.default.clone()).await;
    }

    /// Values this property takes after the call. The current value is not
    /// replayed.
    pub fn subscribe(&self) -> PropertyChanges<T> {
        PropertyChanges {
            key: self.key,
            inner: BroadcastStream::new(self.changes.subscribe()),
        }
    }

    /// Follow writes made to the store by others.
    ///
    /// The task holds only a weak reference and exits once the property is
    /// dropped or the store's change stream ends.
    pub fn spawn_mirror(self: &Arc<Self>) -> crate::Result<JoinHandle<()>> {
        let mut external = self.store.changes::<T>(self.key)?;
        let this: Weak<Self> = Arc::downgrade(self);
        let key = self.key;

        Ok(tokio::spawn(async move {
            while let Some(change) = external.next().await {
                let Some(property) = this.upgrade() else {
                    break;
                };
                match change {
                    KeyChange::Value(value) => property.apply_external(value),
                    KeyChange::Lagged => property.resync().await,
                }
            }
            debug!(key, "settings mirror stopped");
        }))
    }

    fn apply_external(&self, value: T) {
        let mut current = self.current.write();
        {
            let mut echoes = self.echoes.lock();
            if let Some(front) = echoes.front() {
                // Store events arrive in write order, so anything ahead of
                // a pending echo was overwritten by that local write.
                if *front == value {
                    echoes.pop_front();
                } else {
                    debug!(key = self.key, "external write superseded by local write");
                }
                return;
            }
        }
        if self.assign(&mut current, value) {
            debug!(key = self.key, "setting changed externally");
        }
    }

    /// Re-read the stored value after missed notifications.
    ///
    /// Echoes still queued may belong to the missed events and would never
    /// be matched, so they are dropped.
    async fn resync(&self) {
        let _write = self.write_lock.lock().await;
        let stored = self.store.get(self.key, self.default.clone()).await;

        let mut current = self.current.write();
        let dropped = {
            let mut echoes = self.echoes.lock();
            let dropped = echoes.len();
            echoes.clear();
            dropped
        };
        warn!(key = self.key, dropped, "setting mirror lagged, resynced from store");
        self.assign(&mut current, stored);
    }

    /// Swap in `value` and broadcast it. Returns false if nothing changed.
    ///
    /// Callers hold the value lock, so broadcasts follow assignment order.
    fn assign(&self, current: &mut T, value: T) -> bool {
        if *current == value {
            return false;
        }
        *current = value.clone();
        let _ = self.changes.send(value);
        true
    }
}

impl<T: Debug> Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("key", &self.key)
            .field("current", &*self.current.read())
            .finish()
    }
}

/// Change stream of a [`Property`].
pub struct PropertyChanges<T> {
    key: &'static str,
    inner: BroadcastStream<T>,
}

impl<T: Clone + Send + 'static> Stream for PropertyChanges<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(value))) => return Poll::Ready(Some(value)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(key = self.key, skipped, "setting subscriber lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
