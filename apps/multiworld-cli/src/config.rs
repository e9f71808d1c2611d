use std::path::{Path, PathBuf};

use anyhow::Context;
use multiworld_kernel::ManagerConfig;
use serde::{Deserialize, Serialize};

/// Contents of the console's TOML config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where world records are saved.
    pub store_dir: PathBuf,
    /// Parent directory of the world directories.
    pub worlds_dir: PathBuf,
    pub manager: ManagerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("multiworld-data"),
            worlds_dir: PathBuf::from("worlds"),
            manager: ManagerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
