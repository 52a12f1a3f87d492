//! # starswings-state
//!
//! Reactive data access for remote, cacheable entities and persisted user
//! settings.
//!
//! - **Fetch-once entities**: [`FetchableEntity`] runs at most one fetch at a
//!   time and reports progress as a [`State`]: `Ready`, `Loading`,
//!   `Loaded(T)` or `Failed(error)`. Failures never escape as errors; they
//!   become `Failed`.
//! - **Projections**: [`MapDataExt::map_data`] turns a stream of `State<T>`
//!   into a stream of `State<U>` without touching the other variants.
//! - **Settings**: [`Settings`] is a fixed set of typed [`Property`] values
//!   on a [`KeyedDefaults`] store, with change streams and a debounced
//!   cache reset when `merge_parts` changes.
//!
//! ## Backends
//!
//! - [`SqliteStore`]: Embedded SQLite database (durable)
//! - [`MemoryStore`]: In-memory store (testing and previews)
//!
//! ## Entities
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use starswings_state::{DataSource, FetchableEntity, MapDataExt, Result};
//! use tokio_stream::StreamExt;
//!
//! struct Api;
//!
//! #[async_trait]
//! impl DataSource for Api {
//!     type Payload = String;
//!
//!     async fn fetch(&self, id: &str, context_id: &str) -> Result<String> {
//!         Ok(format!("{context_id}/{id}"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let entity = Arc::new(FetchableEntity::new("rathalos", "mhw", Arc::new(Api), |raw: String| {
//!         Ok(raw.len())
//!     }));
//!
//!     let mut labels = entity.subscribe().map_data(|len| format!("{len} bytes"));
//!     entity.fetch_if_needed();
//!     entity.fetch_if_needed(); // no-op: already loading
//!
//!     while let Some(state) = labels.next().await {
//!         println!("{:?}", state);
//!     }
//! }
//! ```
//!
//! ## Settings
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use starswings_state::{KeyedDefaults, Settings, SqliteStore, Sort};
//!
//! #[tokio::main]
//! async fn main() -> starswings_state::Result<()> {
//!     let store = Arc::new(SqliteStore::open("settings.db").await?);
//!     let settings = Settings::load(KeyedDefaults::new(store)).await?;
//!
//!     settings.sort().set(Sort::Name { reversed: false }).await;
//!     println!("merge parts: {}", settings.merge_parts().get());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod debounce;
pub mod entity;
pub mod error;
pub mod keyed;
pub mod memory;
pub mod options;
pub mod projection;
pub mod property;
pub mod registry;
pub mod settings;
pub mod sqlite;
pub mod state;
pub mod store;
pub mod view;
pub mod watch;

// Re-export main types
pub use cache::{format_byte_count, CacheLifecycle, CacheMaintenance};
pub use config::StoreConfig;
pub use debounce::Debouncer;
pub use entity::{DataSource, FetchableEntity, Mapper, StateStream};
pub use error::{Result, StateError};
pub use keyed::{KeyChange, KeyChanges, KeyedDefaults};
pub use memory::MemoryStore;
pub use options::{GroupOption, KeyboardDismissMode, Sort, SwipeAction, WeaknessDisplayMode};
pub use projection::{MapData, MapDataExt, TryMapData};
pub use property::{Property, PropertyChanges, PropertyValue};
pub use registry::EntityRegistry;
pub use settings::{spawn_settled_trigger, Settings, DEFAULT_RESET_DEBOUNCE};
pub use sqlite::SqliteStore;
pub use state::{State, StateKind};
pub use store::{Entry, KeyValueStore, MAX_KEY_LENGTH};
pub use view::EntityView;
pub use watch::{EventType, WatchEvent, WatchStream};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::entity::{DataSource, FetchableEntity};
    pub use crate::error::{Result, StateError};
    pub use crate::keyed::KeyedDefaults;
    pub use crate::projection::MapDataExt;
    pub use crate::settings::Settings;
    pub use crate::state::State;
    pub use crate::store::KeyValueStore;
}
