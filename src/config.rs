//! Configuration loader and validator for the CloudMailing console.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::poller::{FailurePolicy, PollConfig};

/// Environment variable overriding `server.base_url`.
pub const BASE_URL_ENV: &str = "CM_BASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub server: Server,
    #[serde(default)]
    pub polling: Polling,
    #[serde(default)]
    pub tables: Tables,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    /// Where the login credential is persisted.
    pub data_dir: String,
}

/// Master API endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_user_agent() -> String {
    "cm-admin/0.1".into()
}

fn default_timeout() -> u64 {
    30
}

/// Refresh cadence of every dashboard widget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Polling {
    pub dashboard_seconds: u64,
    pub active_mailings_seconds: u64,
    pub hourly_stats_seconds: u64,
    pub realtime_seconds: u64,
    pub disk_seconds: u64,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    pub max_backoff_seconds: u64,
}

impl Default for Polling {
    fn default() -> Self {
        Self {
            dashboard_seconds: 600,
            active_mailings_seconds: 60,
            hourly_stats_seconds: 30,
            realtime_seconds: 5,
            disk_seconds: 600,
            on_failure: FailurePolicy::Retry,
            max_backoff_seconds: 300,
        }
    }
}

impl Polling {
    pub fn poll_config(&self, interval_seconds: u64) -> PollConfig {
        PollConfig::every(Duration::from_secs(interval_seconds)).with_policy(
            self.on_failure,
            Duration::from_secs(self.max_backoff_seconds),
        )
    }
}

/// Default page sizes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tables {
    pub mailings_per_page: u64,
    pub recipients_per_page: u64,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            mailings_per_page: 25,
            recipients_per_page: 100,
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - `CM_BASE_URL` overrides `server.base_url`.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    if let Ok(url) = std::env::var(BASE_URL_ENV) {
        if !url.trim().is_empty() {
            cfg.server.base_url = url;
        }
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    let base = cfg.server.base_url.trim();
    if base.is_empty() {
        return Err(ConfigError::Invalid("server.base_url must be non-empty"));
    }
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ConfigError::Invalid(
            "server.base_url must start with http:// or https://",
        ));
    }
    if cfg.server.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("server.timeout_seconds must be > 0"));
    }

    let p = &cfg.polling;
    if p.dashboard_seconds == 0 {
        return Err(ConfigError::Invalid("polling.dashboard_seconds must be > 0"));
    }
    if p.active_mailings_seconds == 0 {
        return Err(ConfigError::Invalid("polling.active_mailings_seconds must be > 0"));
    }
    if p.hourly_stats_seconds == 0 {
        return Err(ConfigError::Invalid("polling.hourly_stats_seconds must be > 0"));
    }
    if p.realtime_seconds == 0 {
        return Err(ConfigError::Invalid("polling.realtime_seconds must be > 0"));
    }
    if p.disk_seconds == 0 {
        return Err(ConfigError::Invalid("polling.disk_seconds must be > 0"));
    }
    // max_backoff_seconds == 0 means uncapped

    if cfg.tables.mailings_per_page == 0 {
        return Err(ConfigError::Invalid("tables.mailings_per_page must be > 0"));
    }
    if cfg.tables.recipients_per_page == 0 {
        return Err(ConfigError::Invalid("tables.recipients_per_page must be > 0"));
    }

    Ok(())
}

/// Returns the sample YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

server:
  base_url: "http://localhost:33610"
  user_agent: "cm-admin/0.1"
  timeout_seconds: 30

polling:
  dashboard_seconds: 600
  active_mailings_seconds: 60
  hourly_stats_seconds: 30
  realtime_seconds: 5
  disk_seconds: 600
  on_failure: retry
  max_backoff_seconds: 300

tables:
  mailings_per_page: 25
  recipients_per_page: 100
"#
}
