//! Configuration management for the sync daemon.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Carrier name kept as a skill tag when the order's ship method matches it.
pub const DEFAULT_PREFERRED_CARRIER: &str = "Courier Express";

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_TRACKING_BASE_URL: &str = "https://track.example.com/t";

const DEFAULT_DISPATCH_BATCH_SIZE: usize = 40;
const DEFAULT_BUILD_BATCH_SIZE: usize = 25;
const DEFAULT_APPLY_BATCH_SIZE: usize = 25;

const DEFAULT_BUILD_INTERVAL_SECS: u64 = 15;
const DEFAULT_DISPATCH_INTERVAL_SECS: u64 = 15;
const DEFAULT_APPLY_INTERVAL_SECS: u64 = 10;

/// Which courier environment the daemon talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Sandbox,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Sandbox => "sandbox",
        }
    }
}

/// API credentials for one courier environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierCredentials {
    /// Task API base URL.
    pub base_url: String,
    /// API key sent as `Authorization: ApiKey <key>`.
    pub api_key: String,
}

impl Default for CourierCredentials {
    fn default() -> Self {
        Self {
            base_url: "https://api.courier.example.com/v2".to_string(),
            api_key: String::new(),
        }
    }
}

/// Per-environment credential pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub production: CourierCredentials,
    #[serde(default)]
    pub sandbox: CourierCredentials,
}

/// Main daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Which credential pair to use.
    #[serde(default = "default_environment")]
    pub environment: Environment,
    /// Per-environment courier API credentials.
    #[serde(default)]
    pub credentials: Credentials,
    /// Shared secret expected in the webhook `x-api-key` header.
    #[serde(default)]
    pub webhook_secret: String,
    /// Address the webhook HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Base URL for customer tracking links.
    #[serde(default = "default_tracking_base_url")]
    pub tracking_base_url: String,
    /// Ship method name that maps to the carrier skill tag.
    #[serde(default = "default_preferred_carrier")]
    pub preferred_carrier: String,
    /// Swap pickup/delivery locations for return authorizations.
    #[serde(default)]
    pub swap_return_locations: bool,
    /// Max entries per dispatch pass.
    #[serde(default = "default_dispatch_batch_size")]
    pub dispatch_batch_size: usize,
    /// Max entries per builder pass.
    #[serde(default = "default_build_batch_size")]
    pub build_batch_size: usize,
    /// Max entries per apply pass.
    #[serde(default = "default_apply_batch_size")]
    pub apply_batch_size: usize,
    /// Seconds between builder passes.
    #[serde(default = "default_build_interval_secs")]
    pub build_interval_secs: u64,
    /// Seconds between dispatch passes.
    #[serde(default = "default_dispatch_interval_secs")]
    pub dispatch_interval_secs: u64,
    /// Seconds between apply passes.
    #[serde(default = "default_apply_interval_secs")]
    pub apply_interval_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> Environment {
    Environment::Sandbox
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_tracking_base_url() -> String {
    DEFAULT_TRACKING_BASE_URL.to_string()
}

fn default_preferred_carrier() -> String {
    DEFAULT_PREFERRED_CARRIER.to_string()
}

fn default_dispatch_batch_size() -> usize {
    DEFAULT_DISPATCH_BATCH_SIZE
}

fn default_build_batch_size() -> usize {
    DEFAULT_BUILD_BATCH_SIZE
}

fn default_apply_batch_size() -> usize {
    DEFAULT_APPLY_BATCH_SIZE
}

fn default_build_interval_secs() -> u64 {
    DEFAULT_BUILD_INTERVAL_SECS
}

fn default_dispatch_interval_secs() -> u64 {
    DEFAULT_DISPATCH_INTERVAL_SECS
}

fn default_apply_interval_secs() -> u64 {
    DEFAULT_APPLY_INTERVAL_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            environment: default_environment(),
            credentials: Credentials::default(),
            webhook_secret: String::new(),
            listen_addr: default_listen_addr(),
            tracking_base_url: default_tracking_base_url(),
            preferred_carrier: default_preferred_carrier(),
            swap_return_locations: false,
            dispatch_batch_size: default_dispatch_batch_size(),
            build_batch_size: default_build_batch_size(),
            apply_batch_size: default_apply_batch_size(),
            build_interval_secs: default_build_interval_secs(),
            dispatch_interval_secs: default_dispatch_interval_secs(),
            apply_interval_secs: default_apply_interval_secs(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from a file, falling back to defaults, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("COURIER_SYNC_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(env) = std::env::var("COURIER_SYNC_ENV") {
            match env.to_ascii_lowercase().as_str() {
                "prod" | "production" => self.environment = Environment::Production,
                "sandbox" => self.environment = Environment::Sandbox,
                _ => {}
            }
        }
        if let Ok(secret) = std::env::var("COURIER_SYNC_WEBHOOK_SECRET") {
            self.webhook_secret = secret;
        }
        if let Ok(key) = std::env::var("COURIER_SYNC_API_KEY") {
            match self.environment {
                Environment::Production => self.credentials.production.api_key = key,
                Environment::Sandbox => self.credentials.sandbox.api_key = key,
            }
        }
    }

    /// Credentials for the active environment.
    pub fn active_credentials(&self) -> &CourierCredentials {
        match self.environment {
            Environment::Production => &self.credentials.production,
            Environment::Sandbox => &self.credentials.sandbox,
        }
    }

    /// Get the active courier base URL as a parsed URL.
    pub fn courier_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.active_credentials().base_url).map_err(CoreError::from)
    }

    /// Validate the fields the daemon cannot run without.
    pub fn validate(&self) -> CoreResult<()> {
        if self.active_credentials().api_key.is_empty() {
            return Err(CoreError::Config(format!(
                "missing courier API key for {} environment",
                self.environment.as_str()
            )));
        }
        if self.webhook_secret.is_empty() {
            return Err(CoreError::Config("missing webhook_secret".to_string()));
        }
        self.courier_base_url()?;
        Url::parse(&self.tracking_base_url).map_err(CoreError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.environment, Environment::Sandbox);
        assert_eq!(config.dispatch_batch_size, 40);
        assert_eq!(config.build_batch_size, 25);
        assert_eq!(config.apply_batch_size, 25);
        assert!(!config.swap_return_locations);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "environment": "production",
            "credentials": {
                "production": {
                    "base_url": "https://api.courier.example.com/v2",
                    "api_key": "prod-key"
                }
            },
            "webhook_secret": "hook-secret"
        }"#;

        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.active_credentials().api_key, "prod-key");
        assert_eq!(config.webhook_secret, "hook-secret");
        // Unset fields fall back to defaults.
        assert_eq!(config.dispatch_batch_size, 40);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.log_level = "trace".to_string();
        config.credentials.sandbox.api_key = "sandbox-key".to_string();

        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.log_level, "trace");
        assert_eq!(loaded.active_credentials().api_key, "sandbox-key");
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.environment, Environment::Sandbox);
    }

    #[test]
    fn test_active_credentials_follows_environment() {
        let mut config = Config::default();
        config.credentials.production.api_key = "p".to_string();
        config.credentials.sandbox.api_key = "s".to_string();

        config.environment = Environment::Sandbox;
        assert_eq!(config.active_credentials().api_key, "s");
        config.environment = Environment::Production;
        assert_eq!(config.active_credentials().api_key, "p");
    }

    #[test]
    fn test_validate_rejects_missing_api_key() {
        let mut config = Config::default();
        config.webhook_secret = "secret".to_string();

        let result = config.validate();
        assert!(result.is_err());

        config.credentials.sandbox.api_key = "key".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_invalid_base_url() {
        let mut config = Config::default();
        config.webhook_secret = "secret".to_string();
        config.credentials.sandbox.api_key = "key".to_string();
        config.credentials.sandbox.base_url = "not a valid url".to_string();

        assert!(config.validate().is_err());
    }
}
