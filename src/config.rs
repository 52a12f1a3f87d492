//! Store and settings configuration.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StateError};

/// Configuration for the settings backend and the reset trigger.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. `None` opens an in-memory database.
    pub path: Option<PathBuf>,
    /// Maximum pooled connections for a file-backed database.
    pub max_connections: u32,
    /// SQLite busy timeout, in seconds.
    pub busy_timeout_secs: u64,
    /// Capacity of each change broadcast channel.
    pub watch_capacity: usize,
    /// Prefix under which settings keys are stored.
    pub settings_namespace: String,
    /// Quiet period before a merge-parts change triggers a cache reset.
    pub reset_debounce_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
            busy_timeout_secs: 30,
            watch_capacity: 1024,
            settings_namespace: "/settings/".to_string(),
            reset_debounce_ms: 2000,
        }
    }
}

impl StoreConfig {
    /// Parse a config from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(StateError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.watch_capacity == 0 {
            return Err(StateError::Config(
                "watch_capacity must be at least 1".to_string(),
            ));
        }
        if !self.settings_namespace.starts_with('/') || !self.settings_namespace.ends_with('/') {
            return Err(StateError::Config(format!(
                "settings_namespace must start and end with '/': {:?}",
                self.settings_namespace
            )));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }

    pub fn reset_debounce(&self) -> Duration {
        Duration::from_millis(self.reset_debounce_ms)
    }
}
