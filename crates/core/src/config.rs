//! Configuration management
//!
//! This module handles the fetch options applied to every locator and the
//! optional TOML file that provides their defaults. The file is stored at
//! `<config_dir>/arl/config.toml`, or under `$ARL_CONFIG_DIR` when set.
//!
//! PROTECTED FILE: Changes to schema_version require migration support.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current configuration schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Default worker-pool bound for multi-object fetches
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Spooled buffers stay in memory up to this many bytes
pub const DEFAULT_SPOOL_THRESHOLD: usize = 512 * 1024;

const DEFAULT_API_KEY_HEADER: &str = "X-Api-Key";

const DEFAULT_REPOSITORY_API_URL: &str = "https://api.github.com";

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "ARL_CONFIG_DIR";

/// Options applied while resolving a locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Byte ceiling per logical resource
    pub max_size: Option<u64>,
    /// Upper bound on concurrent downloads
    pub max_concurrent: usize,
    /// Per-download deadline inside a parallel batch
    pub item_timeout: Option<Duration>,
    /// Header carrying the payload for `api-key-header` auth
    pub api_key_header: String,
    /// Base URL of the repository contents API
    pub repository_api_url: String,
    /// In-memory size of a spooled buffer before it spills to disk
    pub spool_threshold: usize,
}

impl FetchOptions {
    /// Check option invariants
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::Config("max_concurrent must be at least 1".into()));
        }
        if self.api_key_header.trim().is_empty() {
            return Err(Error::Config("api_key_header cannot be empty".into()));
        }
        url::Url::parse(&self.repository_api_url)?;
        Ok(())
    }

    pub fn with_max_size(mut self, max_size: Option<u64>) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_item_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn with_repository_api_url(mut self, url: impl Into<String>) -> Self {
        self.repository_api_url = url.into();
        self
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Defaults::default().to_options()
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Default fetch settings
    #[serde(default)]
    pub defaults: Defaults,
}

/// Default fetch settings as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-download timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    #[serde(default = "default_repository_api_url")]
    pub repository_api_url: String,

    #[serde(default = "default_spool_threshold")]
    pub spool_threshold: usize,
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_api_key_header() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

fn default_repository_api_url() -> String {
    DEFAULT_REPOSITORY_API_URL.to_string()
}

fn default_spool_threshold() -> usize {
    DEFAULT_SPOOL_THRESHOLD
}

impl Defaults {
    /// Convert stored defaults into runtime options
    pub fn to_options(&self) -> FetchOptions {
        FetchOptions {
            max_size: self.max_size,
            max_concurrent: self.max_concurrent,
            item_timeout: self.timeout_secs.map(Duration::from_secs),
            api_key_header: self.api_key_header.clone(),
            repository_api_url: self.repository_api_url.clone(),
            spool_threshold: self.spool_threshold,
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            max_size: None,
            max_concurrent: default_max_concurrent(),
            timeout_secs: None,
            api_key_header: default_api_key_header(),
            repository_api_url: default_repository_api_url(),
            spool_threshold: default_spool_threshold(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
        }
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join("arl"),
        };
        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    /// Create a ConfigManager with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, returns a default configuration.
    /// If the schema version doesn't match, attempts migration.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            config = self.migrate(config)?;
        } else if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade arl.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist.
    /// Sets file permissions to 600 (owner read/write only).
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.config_path, permissions)?;
        }

        Ok(())
    }

    /// Migrate configuration from older schema version
    fn migrate(&self, config: Config) -> Result<Config> {
        let mut config = config;
        config.schema_version = SCHEMA_VERSION;
        Ok(config)
    }
}
