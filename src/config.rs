//! Configuration loading and validation.
//!
//! The proxy is configured from a YAML file. Loading and validation are
//! deliberately kept outside the core data-plane modules, but both still
//! live in this repo so it runs end to end.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::constants;

fn default_port() -> u16 {
    constants::DEFAULT_PORT
}

fn default_strategy() -> String {
    "round_robin".to_string()
}

fn default_database_path() -> String {
    "./tollgate.db".to_string()
}

fn default_health_check_secs() -> u64 {
    constants::DEFAULT_HEALTH_CHECK_INTERVAL.as_secs()
}

fn default_sync_secs() -> u64 {
    constants::DEFAULT_SYNC_INTERVAL.as_secs()
}

fn default_replenish_secs() -> u64 {
    constants::DEFAULT_REPLENISH_INTERVAL.as_secs()
}

fn default_cleanup_secs() -> u64 {
    constants::DEFAULT_CLEANUP_INTERVAL.as_secs()
}

fn default_inactive_secs() -> u64 {
    constants::DEFAULT_INACTIVE_AFTER.as_secs()
}

/// Raw configuration as deserialized from YAML, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_strategy")]
    pub strategy: String,

    #[serde(default)]
    pub backends: Vec<String>,

    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_health_check_secs")]
    pub health_check_interval_secs: u64,

    #[serde(default = "default_sync_secs")]
    pub sync_interval_secs: u64,

    #[serde(default = "default_replenish_secs")]
    pub replenish_interval_secs: u64,

    #[serde(default = "default_cleanup_secs")]
    pub cleanup_interval_secs: u64,

    #[serde(default = "default_inactive_secs")]
    pub inactive_after_secs: u64,
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid YAML.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Validate the configuration, turning it into the immutable
    /// [`ValidatedConfig`] the rest of the process consumes.
    ///
    /// Validation failures are always fatal at startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is out of `[1, 65535]`, the backend list
    /// is empty, or any backend entry is not a parsable absolute URL.
    pub fn validate(self) -> Result<ValidatedConfig> {
        let mut errors = Vec::new();

        if self.port == 0 {
            errors.push("port must be between 1 and 65535, got 0".to_string());
        }

        if self.backends.is_empty() {
            errors.push("at least one backend must be configured".to_string());
        }

        let mut backends = Vec::with_capacity(self.backends.len());
        for raw in &self.backends {
            match Url::parse(raw) {
                Ok(url) if url.host().is_some() => backends.push(url),
                Ok(_) => errors.push(format!("backend URL {raw:?} has no host")),
                Err(e) => errors.push(format!("invalid backend URL {raw:?}: {e}")),
            }
        }

        if !errors.is_empty() {
            anyhow::bail!("configuration validation failed:\n  - {}", errors.join("\n  - "));
        }

        Ok(ValidatedConfig {
            port: self.port,
            strategy: self.strategy,
            backends,
            database_path: self.database_path,
            health_check_interval: Duration::from_secs(self.health_check_interval_secs),
            sync_interval: Duration::from_secs(self.sync_interval_secs),
            replenish_interval: Duration::from_secs(self.replenish_interval_secs),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
            inactive_after: Duration::from_secs(self.inactive_after_secs),
        })
    }
}

/// Configuration after validation; the surface the rest of the crate consumes.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub port: u16,
    pub strategy: String,
    pub backends: Vec<Url>,
    pub database_path: String,
    pub health_check_interval: Duration,
    pub sync_interval: Duration,
    pub replenish_interval: Duration,
    pub cleanup_interval: Duration,
    pub inactive_after: Duration,
}
