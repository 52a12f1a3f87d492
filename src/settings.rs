//! The settings aggregate.
//!
//! A fixed set of typed [`Property`] values sharing one [`KeyedDefaults`]
//! store. Keys are part of the persisted format: renaming one without a
//! migration silently resets the user's choice to the default.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::cache::CacheLifecycle;
use crate::config::StoreConfig;
use crate::debounce::Debouncer;
use crate::error::Result;
use crate::keyed::KeyedDefaults;
use crate::options::{GroupOption, KeyboardDismissMode, Sort, SwipeAction, WeaknessDisplayMode};
use crate::property::{Property, PropertyValue};
use crate::store::KeyValueStore;

/// Default quiet period before a merge-parts change resets cached data.
pub const DEFAULT_RESET_DEBOUNCE: Duration = Duration::from_secs(2);

macro_rules! settings {
    ($( $(#[$doc:meta])* $name:ident: $ty:ty = ($key:literal, $default:expr), )*) => {
        /// User settings, loaded from and persisted to a shared store.
        pub struct Settings {
            store: KeyedDefaults,
            mirrors: Vec<JoinHandle<()>>,
            reset_window: Duration,
            $( $name: Arc<Property<$ty>>, )*
        }

        impl Settings {
            /// Persistence keys, in declaration order.
            pub const KEYS: &'static [&'static str] = &[$($key),*];

            /// Load every property and start following external writes.
            ///
            /// Must be called from within a tokio runtime.
            pub async fn load(store: KeyedDefaults) -> Result<Self> {
                Self::load_with_window(store, DEFAULT_RESET_DEBOUNCE).await
            }

            async fn load_with_window(
                store: KeyedDefaults,
                reset_window: Duration,
            ) -> Result<Self> {
                let mut mirrors = Vec::with_capacity(Self::KEYS.len());
                $(
                    let $name = Arc::new(Property::load(store.clone(), $key, $default).await);
                    mirrors.push($name.spawn_mirror()?);
                )*
                debug!(count = Self::KEYS.len(), "settings loaded");
                Ok(Self { store, mirrors, reset_window, $($name,)* })
            }

            $(
                $(#[$doc])*
                pub fn $name(&self) -> &Arc<Property<$ty>> {
                    &self.$name
                }
            )*
        }
    };
}

settings! {
    /// Whether onboarding has not been completed yet.
    first_time: bool = ("fsttm", true),
    trailing_swipe_action: SwipeAction = ("trgSwipe", SwipeAction::None),
    includes_favorite_group_in_search_result: bool = ("favInSearch", false),
    show_physical_attack: bool = ("phys", false),
    element_display: WeaknessDisplayMode = ("elem", WeaknessDisplayMode::Sign),
    /// Merge body parts with identical weaknesses. Changing it invalidates
    /// computed data; see [`Settings::spawn_merge_parts_reset`].
    merge_parts: bool = ("mrgPart", true),
    keyboard_dismiss_mode: KeyboardDismissMode = ("kbdDismiss", KeyboardDismissMode::Button),
    /// Preferred data source identifier; empty for the default.
    source: String = ("source", String::new()),
    sort: Sort = ("sort", Sort::InGame { reversed: false }),
    group_option: GroupOption = ("group", GroupOption::None),
    selected_master_or_g: bool = ("selMaster", true),
    /// Artificially delay network requests (developer setting).
    delay_network_request: bool = ("delayReq", false),
    show_internal_information: bool = ("intlInfo", false),
    monster_row_style: String = ("_t", "A".to_string()),
}

impl Settings {
    /// Load settings from `store` using the namespace and reset window in
    /// `config`.
    pub async fn from_config(store: Arc<dyn KeyValueStore>, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let store = KeyedDefaults::with_namespace(store, config.settings_namespace.clone());
        Self::load_with_window(store, config.reset_debounce()).await
    }

    pub fn store(&self) -> &KeyedDefaults {
        &self.store
    }

    /// Quiet period used by [`spawn_merge_parts_reset`](Self::spawn_merge_parts_reset).
    pub fn reset_window(&self) -> Duration {
        self.reset_window
    }

    /// Reset memory caches whenever `merge_parts` settles on a new value.
    pub fn spawn_merge_parts_reset(&self, lifecycle: Arc<dyn CacheLifecycle>) -> JoinHandle<()> {
        spawn_settled_trigger(&self.merge_parts, self.reset_window, move |merge_parts| {
            info!(merge_parts, "merge parts changed, resetting memory data");
            lifecycle.reset_memory_data();
        })
    }
}

impl Drop for Settings {
    fn drop(&mut self) {
        for mirror in &self.mirrors {
            mirror.abort();
        }
    }
}

/// Call `on_settle` for each settled, distinct value of `property`.
///
/// The property's value at the time of the call is the first input and
/// never fires itself. Later values fire after `window` of quiet, unless
/// they equal the previous settled value. The task ends when the property
/// is dropped.
pub fn spawn_settled_trigger<T, F>(
    property: &Arc<Property<T>>,
    window: Duration,
    on_settle: F,
) -> JoinHandle<()>
where
    T: PropertyValue,
    F: Fn(T) + Send + 'static,
{
    let mut changes = property.subscribe();
    let initial = property.get();
    let key = property.key();

    tokio::spawn(async move {
        let mut debouncer = Debouncer::new(window);
        debouncer.push(initial, Instant::now());

        loop {
            tokio::select! {
                next = changes.next() => match next {
                    Some(value) => debouncer.push(value, Instant::now()),
                    None => break,
                },
                _ = sleep_until(debouncer.deadline()) => {
                    if let Some(value) = debouncer.poll(Instant::now()) {
                        debug!(key, ?value, "setting settled");
                        on_settle(value);
                    }
                }
            }
        }
    })
}

fn sleep_until(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
