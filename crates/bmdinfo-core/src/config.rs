//! Client configuration management.
//!
//! This module handles loading the client configuration: the
//! auth server base URL, request timeout, and the login/home route paths.
//!
//! Configuration is stored at `~/.config/bmdinfo/config.json`; session
//! storage lives under the platform data directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "bmdinfo";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Overrides `api_base_url`
pub const API_URL_ENV: &str = "BMDINFO_API_URL";

/// Overrides the session storage directory
pub const STORAGE_DIR_ENV: &str = "BMDINFO_STORAGE_DIR";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/auth";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub login_path: String,
    pub home_path: String,
    pub storage_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            login_path: "/login".to_string(),
            home_path: "/dashboard".to_string(),
            storage_dir: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults if absent), then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(API_URL_ENV).filter(|v| !v.is_empty()) {
            self.api_base_url = url;
        }
        if let Some(dir) = var(STORAGE_DIR_ENV).filter(|v| !v.is_empty()) {
            self.storage_dir = Some(PathBuf::from(dir));
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding durable session storage.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
