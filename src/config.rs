// Configuration loading.
// Reads TOML settings for the downstream service, cache window, deadline, worker pool, and logging.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::downstream::SINGLE_MONEY_PATH;
use crate::error::ConfigError;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub downstream: DownstreamConfig,
    pub cache: CacheConfig,
    pub resolve: ResolveConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

/// Where the money service lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Base URI, e.g. "http://localhost:82/project-b".
    pub base_url: String,
    /// Path template of the single-money endpoint.
    pub single_money_path: String,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:82/project-b".to_string(),
            single_money_path: SINGLE_MONEY_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 15 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Deadline for bounded resolves; 0 waits without bound.
    pub deadline_secs: u64,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self { deadline_secs: 100 }
    }
}

impl ResolveConfig {
    pub fn deadline(&self) -> Option<Duration> {
        (self.deadline_secs > 0).then(|| Duration::from_secs(self.deadline_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads for network I/O and observer callbacks.
    pub worker_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { worker_threads: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when RUST_LOG is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "monofetch=info".to_string(),
        }
    }
}

impl Config {
    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Platform config file location (~/.config/monofetch/config.toml on Linux).
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "monofetch").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load `explicit` if given, else the platform file if it exists, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.downstream.base_url).map_err(|e| {
            ConfigError::Invalid(format!(
                "downstream.base_url {:?}: {}",
                self.downstream.base_url, e
            ))
        })?;

        if self.runtime.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "runtime.worker_threads must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
