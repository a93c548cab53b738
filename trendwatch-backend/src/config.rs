use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::source::DEFAULT_BASE_URL;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendwatchConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u64,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Trending site root, without the `/trending` path
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_refresh_interval_hours")]
    pub refresh_interval_hours: u64,

    /// Upper bound for one whole refresh cycle
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,

    /// Refresh once right away when the scheduler starts
    #[serde(default = "default_initial_refresh")]
    pub initial_refresh: bool,

    /// Fail extraction when an item has no star count
    #[serde(default)]
    pub require_stars: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8099
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u64 {
    3
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/trendwatch.redb")
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("Mozilla/5.0 trendwatch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_refresh_interval_hours() -> u64 {
    4
}

fn default_refresh_timeout_secs() -> u64 {
    15 * 60
}

fn default_initial_refresh() -> bool {
    true
}

impl Default for TrendwatchConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            log_retention_days: default_log_retention_days(),
            db_path: default_db_path(),
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            http_timeout_secs: default_http_timeout_secs(),
            refresh_interval_hours: default_refresh_interval_hours(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
            initial_refresh: default_initial_refresh(),
            require_stars: false,
        }
    }
}

impl TrendwatchConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read `path` if it exists, otherwise fall back to defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_hours.max(1) * 60 * 60)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}
