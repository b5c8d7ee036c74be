//! Storefront Console Configuration
//!
//! TOML-based configuration with environment variable overrides.

use serde::{Deserialize, Serialize};
use sf_common::Role;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub routes: RouteConfig,
}

/// Commerce API connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every request path is appended to
    pub base_url: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout_ms: 30_000,
            user_agent: format!("Storefront-Console/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Where the credential slots are kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `file` (survives restarts) or `memory` (process lifetime only)
    pub backend: String,
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

/// Navigation entry points used by the route guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Unauthenticated entry point (login form)
    pub login: String,
    /// Public home view; role mismatches land here
    pub home: String,
    pub landing: LandingConfig,
}

impl RouteConfig {
    /// Default view for an authenticated session with the given role.
    pub fn landing_for(&self, role: Role) -> &str {
        match role {
            Role::User => &self.landing.user,
            Role::Vendor => &self.landing.vendor,
            Role::Support => &self.landing.support,
            Role::Admin => &self.landing.admin,
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            home: "/".to_string(),
            landing: LandingConfig::default(),
        }
    }
}

/// Per-role landing views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandingConfig {
    pub user: String,
    pub vendor: String,
    pub support: String,
    pub admin: String,
}

impl Default for LandingConfig {
    fn default() -> Self {
        Self {
            user: "/".to_string(),
            vendor: "/vendor".to_string(),
            support: "/support".to_string(),
            admin: "/admin".to_string(),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ConsoleConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from the standard locations with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Check values that would otherwise fail at first use
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = &self.api.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                base
            )));
        }
        if self.api.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "api.timeout_ms must be greater than zero".to_string(),
            ));
        }
        match self.storage.backend.as_str() {
            "file" | "memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "storage.backend must be 'file' or 'memory', got '{}'",
                    other
                )))
            }
        }

        let routes = [
            ("routes.login", &self.routes.login),
            ("routes.home", &self.routes.home),
            ("routes.landing.user", &self.routes.landing.user),
            ("routes.landing.vendor", &self.routes.landing.vendor),
            ("routes.landing.support", &self.routes.landing.support),
            ("routes.landing.admin", &self.routes.landing.admin),
        ];
        for (name, value) in routes {
            if !value.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be an absolute path, got '{}'",
                    name, value
                )));
            }
        }

        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Storefront Console Configuration
# STOREFRONT_* environment variables override these settings

[api]
base_url = "http://localhost:3000/api"
timeout_ms = 30000

[storage]
backend = "file"  # file, memory
data_dir = "./data"

[routes]
login = "/login"
home = "/"

[routes.landing]
user = "/"
vendor = "/vendor"
support = "/support"
admin = "/admin"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConsoleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.routes.login, "/login");
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_example_toml_parses_to_defaults() {
        let parsed: ConsoleConfig = toml::from_str(&ConsoleConfig::example_toml()).unwrap();
        let defaults = ConsoleConfig::default();
        assert_eq!(parsed.storage, defaults.storage);
        assert_eq!(parsed.routes, defaults.routes);
        assert_eq!(parsed.api.base_url, defaults.api.base_url);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api]\nbase_url = \"https://shop.example.com/api\"").unwrap();

        let config = ConsoleConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api.base_url, "https://shop.example.com/api");
        assert_eq!(config.api.timeout_ms, 30_000);
        assert_eq!(config.storage.backend, "file");
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api\nbase_url = ").unwrap();
        assert!(matches!(
            ConsoleConfig::from_file(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ConsoleConfig::default();
        config.api.base_url = "localhost:3000".to_string();
        assert!(config.validate().is_err());

        let mut config = ConsoleConfig::default();
        config.storage.backend = "redis".to_string();
        assert!(config.validate().is_err());

        let mut config = ConsoleConfig::default();
        config.routes.landing.admin = "admin".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_landing_for_role() {
        let routes = RouteConfig::default();
        assert_eq!(routes.landing_for(Role::Admin), "/admin");
        assert_eq!(routes.landing_for(Role::User), "/");
    }
}
