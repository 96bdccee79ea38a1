//! TOML configuration.
//!
//! Stored in the OS config directory (`~/.config/if-radio/config.toml` on
//! Linux). Every field has a default, so a partial file is fine and a missing
//! file means "all defaults".

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::station::{default_stations, Station};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ordered station list; position N is bound to key N+1
    pub stations: Vec<Station>,

    pub resolver: ResolverConfig,

    pub player: PlayerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stations: default_stations(),
            resolver: ResolverConfig::default(),
            player: PlayerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Maximum number of redirects followed before giving up
    pub max_redirects: usize,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Upper bound on one whole resolution, all hops included
    pub resolve_timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_redirects: 10,
            connect_timeout_secs: 10,
            request_timeout_secs: 15,
            resolve_timeout_secs: 20,
        }
    }
}

impl ResolverConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// "auto", "ffplay", "mpv" or "afplay"
    pub preferred: String,
    /// 0-100
    pub volume: u32,
    /// How long the player process must stay alive to count as prepared
    pub prepare_grace_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            preferred: "auto".to_string(),
            volume: 70,
            prepare_grace_ms: 400,
        }
    }
}

impl PlayerConfig {
    pub fn prepare_grace(&self) -> Duration {
        Duration::from_millis(self.prepare_grace_ms)
    }
}

/// Default config file location
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("if-radio").join("config.toml"))
}

/// Load config from `path`. A missing file yields defaults.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let mut config: Config =
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;

    if config.stations.is_empty() {
        tracing::warn!("Config {:?} has no stations, using built-in list", path);
        config.stations = default_stations();
    }
    config.player.volume = config.player.volume.min(100);

    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Load config from the default location.
///
/// Never fails: unreadable or unparsable files are logged and replaced by
/// defaults.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}
