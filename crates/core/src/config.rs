// crates/core/src/config.rs
//! Client configuration: backend location, credentials and poll policy.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_AUTO_MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            request_timeout_secs: 30,
            username: None,
            password: None,
        }
    }
}

/// What a poll loop does when a status fetch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// The first failure ends the job with a transport error.
    FailFast,
    /// Log and keep polling; give up after `max_consecutive` failures in a row.
    Retry { max_consecutive: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    /// Ceiling on a job's lifetime. `0` or `None` polls until the backend
    /// reports a terminal state.
    pub timeout_secs: Option<u64>,
    pub manual_on_error: ErrorPolicy,
    pub auto_on_error: ErrorPolicy,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_secs: Some(DEFAULT_POLL_TIMEOUT_SECS),
            manual_on_error: ErrorPolicy::FailFast,
            auto_on_error: ErrorPolicy::Retry {
                max_consecutive: DEFAULT_AUTO_MAX_CONSECUTIVE_FAILURES,
            },
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location if that file exists,
    /// then apply `POSBOARD_*` environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(p) if path.is_some() || p.exists() => Self::from_file(&p)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| e.to_string())
    }

    /// Apply overrides through `lookup` so tests need not touch the process env.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("POSBOARD_BASE_URL").filter(|v| !v.is_empty()) {
            self.backend.base_url = url;
        }
        if let Some(user) = lookup("POSBOARD_USERNAME").filter(|v| !v.is_empty()) {
            self.backend.username = Some(user);
        }
        if let Some(pass) = lookup("POSBOARD_PASSWORD") {
            self.backend.password = Some(pass);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.base_url is empty".into()));
        }
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::Invalid("polling.interval_ms must be > 0".into()));
        }
        for (name, policy) in [
            ("manual_on_error", self.polling.manual_on_error),
            ("auto_on_error", self.polling.auto_on_error),
        ] {
            if policy == (ErrorPolicy::Retry { max_consecutive: 0 }) {
                return Err(ConfigError::Invalid(format!(
                    "polling.{name}.max_consecutive must be > 0"
                )));
            }
        }
        Ok(())
    }

    /// Credentials, when both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.backend.username, &self.backend.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

/// `$POSBOARD_CONFIG`, else `<config_dir>/posboard/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("POSBOARD_CONFIG") {
        if !p.is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    dirs::config_dir().map(|d| d.join("posboard").join("config.toml"))
}
