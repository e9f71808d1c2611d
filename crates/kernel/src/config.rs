use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors from loading a [`ManagerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Manager tuning, usually the `[manager]` table of the server config.
///
/// Every field has a default, so an empty table is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Upper bound for a single engine call, in milliseconds. 0 waits forever.
    pub engine_timeout_ms: u64,
    /// Fallback evacuation target when an unloading world has no loaded
    /// respawn world.
    pub default_world: Option<String>,
    /// Load every world with `autoLoad` set after restoring from the store.
    pub auto_load_on_start: bool,
    /// Commands that change a world save it right away.
    pub save_on_change: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            engine_timeout_ms: 30_000,
            default_world: None,
            auto_load_on_start: true,
            save_on_change: true,
        }
    }
}

impl ManagerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// `None` when engine calls are not bounded.
    pub fn engine_timeout(&self) -> Option<Duration> {
        (self.engine_timeout_ms > 0).then(|| Duration::from_millis(self.engine_timeout_ms))
    }
}
