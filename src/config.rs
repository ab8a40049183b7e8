//! File-based configuration for the layout manager and CLI.
//!
//! ```toml
//! data_dir = "/home/me/.local/share/layouts"
//! start_online = true
//!
//! [remote]
//! server_url = "https://layouts.example.com"
//! workspace = "team"
//! token = "secret"
//!
//! [sync]
//! mode = "periodic"
//! interval_secs = 300
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::FileLayoutStorage;
use crate::sync::SchedulerConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config directory not found")]
    ConfigDirNotFound,
    #[error("Data directory not found")]
    DataDirNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LayoutsConfig {
    /// Where cached layouts are stored (default: platform data dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Initial connectivity state of the manager
    #[serde(default = "default_start_online")]
    pub start_online: bool,
    /// Remote layout server; shared layouts are unavailable without it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub sync: SchedulerConfig,
}

impl Default for LayoutsConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            start_online: default_start_online(),
            remote: None,
            sync: SchedulerConfig::default(),
        }
    }
}

fn default_start_online() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RemoteConfig {
    pub server_url: String,
    pub workspace: String,
    /// Bearer token sent with every request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl LayoutsConfig {
    /// Default location: `<config dir>/layouts/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("layouts").join("config.toml"))
            .ok_or(ConfigError::ConfigDirNotFound)
    }

    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Configured data directory, falling back to the platform default
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => FileLayoutStorage::default_data_dir().map_err(|_| ConfigError::DataDirNotFound),
        }
    }
}
