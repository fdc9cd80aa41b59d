//! Configuration management for Crosspost

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::PlatformKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Posts per hour allowed for each platform; platforms not listed are unlimited
    #[serde(default)]
    pub rate_limits: HashMap<String, u32>,
    #[serde(default)]
    pub platforms: HashMap<String, PlatformEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
    pub max_retries: u32,
    pub call_timeout_secs: u64,
    pub max_concurrent_posts: usize,
    /// Base delay before a retried post is attempted again; 0 retries on the next tick
    pub retry_delay_secs: u64,
    pub max_retry_delay_secs: u64,
    /// Mark a post failed immediately when every platform rejected the content itself
    pub fail_fast_on_invalid_input: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            max_retries: 3,
            call_timeout_secs: 30,
            max_concurrent_posts: 4,
            retry_delay_secs: 0,
            max_retry_delay_secs: 3600,
            fail_fast_on_invalid_input: false,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(invalid("scheduler.poll_interval_secs", "must be at least 1"));
        }
        if self.call_timeout_secs == 0 {
            return Err(invalid("scheduler.call_timeout_secs", "must be at least 1"));
        }
        if self.max_concurrent_posts == 0 {
            return Err(invalid("scheduler.max_concurrent_posts", "must be at least 1"));
        }
        if self.max_retry_delay_secs < self.retry_delay_secs {
            return Err(invalid(
                "scheduler.max_retry_delay_secs",
                "must not be smaller than retry_delay_secs",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> crate::CrosspostError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// API endpoint override for a platform adapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformEndpoint {
    pub api_base: String,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.scheduler.validate()?;
        for name in config.rate_limits.keys().chain(config.platforms.keys()) {
            name.parse::<PlatformKind>().map_err(|_| ConfigError::InvalidValue {
                field: name.clone(),
                reason: "not a supported platform".to_string(),
            })?;
        }
        if config.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/crosspost/posts.db".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            rate_limits: HashMap::new(),
            platforms: HashMap::new(),
        }
    }

    /// Hourly post limits keyed by platform
    pub fn rate_limits(&self) -> HashMap<PlatformKind, u32> {
        self.rate_limits
            .iter()
            .filter_map(|(name, limit)| name.parse().ok().map(|kind| (kind, *limit)))
            .collect()
    }

    /// API base URL for a platform, falling back to the public endpoint
    pub fn api_base(&self, platform: PlatformKind) -> String {
        self.platforms
            .get(platform.as_str())
            .map(|endpoint| endpoint.api_base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| default_api_base(platform).to_string())
    }
}

pub fn default_api_base(platform: PlatformKind) -> &'static str {
    match platform {
        PlatformKind::Facebook | PlatformKind::Instagram => "https://graph.facebook.com/v19.0",
        PlatformKind::Youtube => "https://www.googleapis.com/youtube/v3",
        PlatformKind::Twitter => "https://api.twitter.com",
        PlatformKind::Mastodon => "https://mastodon.social",
        PlatformKind::Telegram => "https://api.telegram.org",
    }
}

/// Resolve the configuration file path following the XDG base directory layout
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}
