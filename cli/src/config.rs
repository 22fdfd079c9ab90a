//! Configuration management for the CLI.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_DATA_DIR: &str = ".ferry";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// CLI configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the task server
    pub server_url: String,
    /// Directory holding the outbox, identity map and cache
    pub data_dir: PathBuf,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Values given on the command line; each wins over its environment variable.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub token: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server_url = lookup("FERRY_SERVER_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        let data_dir = lookup("FERRY_DATA_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let token = lookup("FERRY_TOKEN").filter(|token| !token.is_empty());

        let timeout_secs = match lookup("FERRY_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Self {
            server_url,
            data_dir,
            token,
            timeout: Duration::from_secs(timeout_secs),
        }
        .validated()
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self, ConfigError> {
        if let Some(url) = overrides.server_url {
            self.server_url = url;
        }
        if let Some(dir) = overrides.data_dir {
            self.data_dir = dir;
        }
        if let Some(token) = overrides.token {
            self.token = Some(token);
        }
        if let Some(secs) = overrides.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        self.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("0".into()));
        }
        Ok(self)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid FERRY_TIMEOUT_SECS value: {0} (expected a positive number of seconds)")]
    InvalidTimeout(String),
}
