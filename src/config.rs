//! Configuration loading from TOML.
//!
//! Reads `config.toml` (or the file named by `RISKPULSE_CONFIG`) and
//! deserializes it into strongly-typed structs. Every field has a default,
//! so a partial file, or none at all, still yields a usable config.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::engine::poller::{
    EngineConfig, DEFAULT_INTERVAL_SECS, DEFAULT_RISKS_URL, DEFAULT_SIGNALS_URL,
};
use crate::fetch::http::DEFAULT_USER_AGENT;
use crate::fetch::{RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};

/// Default config file path.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the config path.
pub const CONFIG_PATH_ENV: &str = "RISKPULSE_CONFIG";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    pub http: HttpConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub risks_url: String,
    pub signals_url: String,
    pub interval_secs: u64,
    /// Skip a tick while the previous cycle is still running.
    pub single_flight: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            risks_url: DEFAULT_RISKS_URL.to_string(),
            signals_url: DEFAULT_SIGNALS_URL.to_string(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            single_flight: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    ///
    /// The flag in the result says whether the file was found.
    pub fn load_or_default(path: &str) -> Result<(Self, bool)> {
        if !Path::new(path).exists() {
            return Ok((Self::default(), false));
        }
        Ok((Self::load(path)?, true))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// The config path to use: `RISKPULSE_CONFIG` if set, else `config.toml`.
    pub fn resolve_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.risks_url.trim().is_empty() {
            bail!("sync.risks_url must not be empty");
        }
        if self.sync.signals_url.trim().is_empty() {
            bail!("sync.signals_url must not be empty");
        }
        if self.sync.interval_secs == 0 {
            bail!("sync.interval_secs must be > 0");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be >= 1");
        }
        if self.http.timeout_secs == 0 {
            bail!("http.timeout_secs must be > 0");
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            risks_url: self.sync.risks_url.clone(),
            signals_url: self.sync.signals_url.clone(),
            interval: Duration::from_secs(self.sync.interval_secs),
            single_flight: self.sync.single_flight,
            retry: RetryPolicy {
                max_attempts: self.retry.max_attempts,
                base_delay: Duration::from_millis(self.retry.base_delay_ms),
            },
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}
