//! Top-level settings for linuxmodmanager.
//!
//! Per-game and per-profile documents are *not* part of this struct; they
//! live under the config root as YAML, owned by the game/profile stores
//! (see [`crate::games`] and [`crate::profiles`]).

mod paths;

pub use paths::Paths;

use crate::deploy::LinkMethod;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default link method for games that don't specify one.
    pub default_link_method: LinkMethod,

    /// Maximum number of downloads to run concurrently.
    pub download_concurrency: usize,

    /// Number of download attempts before giving up (§4.4).
    pub download_retries: u32,

    /// Default hook timeout in seconds (§4.9).
    pub hook_timeout_secs: u64,

    /// Paths configuration (derived, not persisted).
    #[serde(skip)]
    pub paths: Paths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_link_method: LinkMethod::Symlink,
            download_concurrency: 3,
            download_retries: 3,
            hook_timeout_secs: 60,
            paths: Paths::new(),
        }
    }
}

impl Config {
    pub async fn load() -> Result<Self> {
        let paths = Paths::new();
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .await
                .context("failed to read config file")?;
            toml::from_str(&content).context("failed to parse config file")?
        } else {
            let config = Config::default();
            config.save().await?;
            config
        };

        config.paths = paths;
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        let config_path = self.paths.config_file();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(&config_path, content)
            .await
            .context("failed to write config file")?;

        Ok(())
    }
}
