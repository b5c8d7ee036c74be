//! Configuration loader with file and environment variable support

use crate::{ConfigError, ConsoleConfig};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "storefront.toml",
    "config.toml",
    "./config/storefront.toml",
    "/etc/storefront/storefront.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<ConsoleConfig, ConfigError> {
        let mut config = ConsoleConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = ConsoleConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!(?path, "Configured file does not exist, searching defaults");
        }

        if let Ok(path) = env::var("STOREFRONT_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `STOREFRONT_*` overrides using `lookup` to read variables.
pub(crate) fn apply_overrides<F>(config: &mut ConsoleConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // API
    if let Some(val) = lookup("STOREFRONT_API_BASE_URL") {
        config.api.base_url = val.trim_end_matches('/').to_string();
    }
    if let Some(val) = lookup("STOREFRONT_API_TIMEOUT_MS") {
        match val.parse() {
            Ok(timeout) => config.api.timeout_ms = timeout,
            Err(_) => warn!(value = %val, "Ignoring invalid STOREFRONT_API_TIMEOUT_MS"),
        }
    }
    if let Some(val) = lookup("STOREFRONT_API_USER_AGENT") {
        config.api.user_agent = val;
    }

    // Storage
    if let Some(val) = lookup("STOREFRONT_STORAGE_BACKEND") {
        config.storage.backend = val.to_ascii_lowercase();
    }
    if let Some(val) = lookup("STOREFRONT_DATA_DIR") {
        config.storage.data_dir = val;
    }

    // Routes
    if let Some(val) = lookup("STOREFRONT_ROUTE_LOGIN") {
        config.routes.login = val;
    }
    if let Some(val) = lookup("STOREFRONT_ROUTE_HOME") {
        config.routes.home = val;
    }
}
