//! Configuration loading and management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Executor backend settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Orchestration timing settings
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
}

impl Config {
    /// Load configuration from file or default locations
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(|| {
                // Try .foreman/config.toml in current directory
                let local = PathBuf::from(".foreman/config.toml");
                if local.exists() {
                    return Some(local);
                }

                // Try ~/.foreman/config.toml
                dirs::home_dir().map(|h| h.join(".foreman/config.toml"))
            });

        match config_path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(&p)?;
                let config: Config = toml::from_str(&content)?;
                Ok(config)
            }
            _ => Ok(Config::default()),
        }
    }
}

/// Executor backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Base URL of the agent backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Orchestration timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Fixed interval between task status polls
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Cool-down before a rejected workflow resets to idle
    #[serde(default = "default_reject_reset", with = "humantime_serde")]
    pub reject_reset: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(2000)
}

fn default_reject_reset() -> Duration {
    Duration::from_millis(2000)
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            reject_reset: default_reject_reset(),
        }
    }
}

/// Initialize the .foreman directory with a default config
pub fn init(force: bool) -> Result<PathBuf> {
    let foreman_dir = PathBuf::from(".foreman");

    if !foreman_dir.exists() {
        std::fs::create_dir_all(&foreman_dir)?;
    }

    let config_path = foreman_dir.join("config.toml");
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        )));
    }

    let default_config = Config::default();
    let config_str =
        toml::to_string_pretty(&default_config).map_err(|e| Error::Config(e.to_string()))?;
    std::fs::write(&config_path, config_str)?;

    Ok(config_path)
}

// Custom serde module for Duration using humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
