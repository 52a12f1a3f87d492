//! Cache lifecycle collaborator and the maintenance actions built on it.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::Result;

/// The app's caches, as seen from settings.
#[async_trait]
pub trait CacheLifecycle: Send + Sync {
    /// Drop everything computed in memory so it is rebuilt on next use.
    fn reset_memory_data(&self);

    /// Clear all persisted caches. Resolves once the data is gone.
    async fn reset_all_data(&self) -> Result<()>;

    /// Bytes currently used by persisted caches, if known.
    async fn cache_size(&self) -> Result<Option<u64>>;
}

/// Format a byte count for display, using decimal units up to megabytes.
pub fn format_byte_count(bytes: u64) -> String {
    const KB: u64 = 1_000;
    const MB: u64 = 1_000_000;

    match bytes {
        1 => "1 byte".to_string(),
        b if b < KB => format!("{} bytes", b),
        b if b < MB => format!("{} KB", (b + KB / 2) / KB),
        b => format!("{:.1} MB", b as f64 / MB as f64),
    }
}

/// "Reset all caches" and the displayed storage size.
pub struct CacheMaintenance {
    lifecycle: Arc<dyn CacheLifecycle>,
    storage_size: watch::Sender<Option<String>>,
}

impl CacheMaintenance {
    pub fn new(lifecycle: Arc<dyn CacheLifecycle>) -> Self {
        let (storage_size, _) = watch::channel(None);
        Self {
            lifecycle,
            storage_size,
        }
    }

    /// Formatted storage size; `None` while unknown or being recomputed.
    pub fn storage_size(&self) -> Option<String> {
        self.storage_size.borrow().clone()
    }

    pub fn subscribe_storage_size(&self) -> watch::Receiver<Option<String>> {
        self.storage_size.subscribe()
    }

    /// Recompute the displayed storage size.
    pub async fn update_storage_size(&self) {
        let label = match self.lifecycle.cache_size().await {
            Ok(size) => size.map(format_byte_count),
            Err(err) => {
                warn!(error = %err, "failed to measure cache size");
                None
            }
        };
        self.storage_size.send_replace(label);
    }

    /// Clear persisted caches, then refresh the storage size.
    ///
    /// The size reads `None` for the duration.
    pub async fn reset_all_caches(&self) -> Result<()> {
        self.storage_size.send_replace(None);
        info!("clearing all cached data");
        let result = self.lifecycle.reset_all_data().await;
        self.update_storage_size().await;
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::StateError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records calls; reports `size` bytes until cleared.
    #[derive(Default)]
    pub(crate) struct RecordingLifecycle {
        pub memory_resets: AtomicUsize,
        pub size: Mutex<Option<u64>>,
        pub fail_clear: bool,
    }

    #[async_trait]
    impl CacheLifecycle for RecordingLifecycle {
        fn reset_memory_data(&self) {
            self.memory_resets.fetch_add(1, Ordering::SeqCst);
        }

        async fn reset_all_data(&self) -> Result<()> {
            if self.fail_clear {
                return Err(StateError::StorageUnavailable("read-only".to_string()));
            }
            *self.size.lock() = Some(0);
            Ok(())
        }

        async fn cache_size(&self) -> Result<Option<u64>> {
            Ok(*self.size.lock())
        }
    }

    #[test]
    fn test_format_byte_count() {
        assert_eq!(format_byte_count(0), "0 bytes");
        assert_eq!(format_byte_count(1), "1 byte");
        assert_eq!(format_byte_count(999), "999 bytes");
        assert_eq!(format_byte_count(1_000), "1 KB");
        assert_eq!(format_byte_count(12_600), "13 KB");
        assert_eq!(format_byte_count(2_500_000), "2.5 MB");
    }

    #[tokio::test]
    async fn test_update_storage_size() {
        let lifecycle = Arc::new(RecordingLifecycle::default());
        *lifecycle.size.lock() = Some(4_200_000);
        let maintenance = CacheMaintenance::new(lifecycle);

        assert_eq!(maintenance.storage_size(), None);
        maintenance.update_storage_size().await;
        assert_eq!(maintenance.storage_size().as_deref(), Some("4.2 MB"));
    }

    #[tokio::test]
    async fn test_reset_all_caches() {
        let lifecycle = Arc::new(RecordingLifecycle::default());
        *lifecycle.size.lock() = Some(4_200_000);
        let maintenance = CacheMaintenance::new(lifecycle.clone());
        maintenance.update_storage_size().await;

        let mut sizes = maintenance.subscribe_storage_size();
        maintenance.reset_all_caches().await.unwrap();

        assert_eq!(maintenance.storage_size().as_deref(), Some("0 bytes"));
        assert!(sizes.has_changed().unwrap());
        assert_eq!(lifecycle.memory_resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_failure_still_refreshes_size() {
        let lifecycle = Arc::new(RecordingLifecycle {
            fail_clear: true,
            ..Default::default()
        });
        *lifecycle.size.lock() = Some(5_000);
        let maintenance = CacheMaintenance::new(lifecycle);

        assert!(maintenance.reset_all_caches().await.is_err());
        assert_eq!(maintenance.storage_size().as_deref(), Some("5 KB"));
    }
}
