//! SQLite key-value backend.
//!
//! The durable home of user settings: a single database file in WAL mode.
//! Watch notifications are in-process only.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Result, StateError};
use crate::store::{validate_key, Entry, KeyValueStore};
use crate::watch::{WatchEvent, WatchSender, WatchStream};

/// SQLite implementation of [`KeyValueStore`].
pub struct SqliteStore {
    pool: SqlitePool,
    watcher: WatchSender,
    // Serializes write + publish so subscribers see events in write order.
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Open or create a store at the given path with default settings.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let config = StoreConfig {
            path: Some(path.as_ref().to_path_buf()),
            ..StoreConfig::default()
        };
        Self::from_config(&config).await
    }

    /// Open the store described by `config`.
    ///
    /// A config without a path yields an in-memory database.
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let Some(path) = &config.path else {
            return Self::in_memory_with_capacity(config.watch_capacity).await;
        };
        info!("Opening settings store at {:?}", path);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| StateError::StorageUnavailable(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StateError::StorageUnavailable(e.to_string()))?;

        Self::with_pool(pool, config.watch_capacity).await
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self> {
        Self::in_memory_with_capacity(StoreConfig::default().watch_capacity).await
    }

    async fn in_memory_with_capacity(watch_capacity: usize) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StateError::StorageUnavailable(e.to_string()))?;

        // A memory database lives exactly as long as its one connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StateError::StorageUnavailable(e.to_string()))?;

        Self::with_pool(pool, watch_capacity).await
    }

    async fn with_pool(pool: SqlitePool, watch_capacity: usize) -> Result<Self> {
        let store = Self {
            pool,
            watcher: WatchSender::new(watch_capacity),
            write_lock: Mutex::new(()),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings_kv (
                key TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("settings schema initialized");
        Ok(())
    }

    /// Close the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn millis_to_system_time(millis: i64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        validate_key(key)?;

        let row: Option<(String, Vec<u8>, i64, i64)> = sqlx::query_as(
            "SELECT key, value, version, updated_at FROM settings_kv WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(key, value, version, updated_at)| Entry {
            key,
            value,
            version: version as u64,
            updated_at: Self::millis_to_system_time(updated_at),
        }))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        validate_key(key)?;

        let _write = self.write_lock.lock().await;
        let (version,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO settings_kv (key, value, version, updated_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                version = settings_kv.version + 1,
                updated_at = excluded.updated_at
            RETURNING version
            "#,
        )
        .bind(key)
        .bind(&value)
        .bind(Self::now_millis())
        .fetch_one(&self.pool)
        .await?;

        let version = version as u64;
        let event = if version == 1 {
            WatchEvent::created(key, value, version)
        } else {
            WatchEvent::updated(key, value, version)
        };
        self.watcher.send(event);

        Ok(version)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let _write = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM settings_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            self.watcher.send(WatchEvent::deleted(key));
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT key FROM settings_kv WHERE substr(key, 1, ?) = ? ORDER BY key")
                .bind(prefix.chars().count() as i64)
                .bind(prefix)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    fn watch(&self, pattern: &str) -> Result<WatchStream> {
        Ok(self.watcher.subscribe(pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_sqlite_set_and_get() {
        let store = SqliteStore::in_memory().await.unwrap();

        let version = store.set("/settings/sort", b"value".to_vec()).await.unwrap();
        assert_eq!(version, 1);

        let entry = store.get("/settings/sort").await.unwrap().unwrap();
        assert_eq!(entry.key, "/settings/sort");
        assert_eq!(entry.value, b"value");
        assert_eq!(entry.version, 1);
    }

    #[tokio::test]
    async fn test_sqlite_version_increment() {
        let store = SqliteStore::in_memory().await.unwrap();

        let v1 = store.set("/key", b"v1".to_vec()).await.unwrap();
        let v2 = store.set("/key", b"v2".to_vec()).await.unwrap();
        assert_eq!((v1, v2), (1, 2));
    }

    #[tokio::test]
    async fn test_sqlite_delete_and_list() {
        let store = SqliteStore::in_memory().await.unwrap();

        store.set("/settings/a", b"1".to_vec()).await.unwrap();
        store.set("/settings/b", b"2".to_vec()).await.unwrap();
        store.set("/settings_x/c", b"3".to_vec()).await.unwrap();

        let keys = store.list("/settings/").await.unwrap();
        assert_eq!(keys, vec!["/settings/a".to_string(), "/settings/b".to_string()]);

        store.delete("/settings/a").await.unwrap();
        assert!(!store.exists("/settings/a").await.unwrap());

        assert_eq!(store.clear("/settings/").await.unwrap(), 1);
        assert!(store.exists("/settings_x/c").await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_watch() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut stream = store.watch("/settings/mrgPart").unwrap();

        store.set("/settings/mrgPart", b"false".to_vec()).await.unwrap();
        store.delete("/settings/mrgPart").await.unwrap();

        let event = stream.next().await.unwrap();
        assert_eq!(event.new_value, Some(b"false".to_vec()));
        let event = stream.next().await.unwrap();
        assert!(event.new_value.is_none());
    }

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.set("/settings/source", b"\"jp\"".to_vec()).await.unwrap();
            store.close().await;
        }

        let store = SqliteStore::open(&path).await.unwrap();
        let entry = store.get("/settings/source").await.unwrap().unwrap();
        assert_eq!(entry.value, b"\"jp\"");
    }
}
