//! Application configuration module
//!
//! Provides the configuration types shared by the sync engine, the capture
//! pipeline and the binary. Values come from built-in defaults, an optional
//! TOML file and a handful of environment overrides, in that order.
//!
//! ```toml
//! server_url = "https://api.example.com"
//! detection_timeout_ms = 7000
//!
//! [retry]
//! base_delay_ms = 1000
//! max_attempts = 5
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default backend URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_DETECTION_TIMEOUT: Duration = Duration::from_millis(7_000);
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Backend base URL
    pub server_url: String,
    /// Directory holding the local database
    pub data_dir: PathBuf,
    /// Per-request timeout for backend calls
    pub request_timeout: Duration,
    /// Safety window for one in-page detection pass
    pub detection_timeout: Duration,
    /// Age after which cached collections are refreshed on screen focus
    pub stale_after: Duration,
    /// Automatic sync retry settings
    pub retry: RetrySettings,
}

/// Backoff settings for automatic sync retries
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
    /// Consecutive failures after which automatic retries stop
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            jitter: 0.1,
            max_attempts: 5,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            data_dir: default_data_dir(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            detection_timeout: DEFAULT_DETECTION_TIMEOUT,
            stale_after: DEFAULT_STALE_AFTER,
            retry: RetrySettings::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
    path.push("wardrobe");
    path
}

/// On-disk representation; every field is optional so partial files work.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    server_url: Option<String>,
    data_dir: Option<PathBuf>,
    request_timeout_ms: Option<u64>,
    detection_timeout_ms: Option<u64>,
    stale_after_secs: Option<u64>,
    #[serde(default)]
    retry: FileRetry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileRetry {
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    jitter: Option<f64>,
    max_attempts: Option<u32>,
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw)?;
        let mut builder = Self::builder();
        if let Some(url) = file.server_url {
            builder = builder.server_url(url);
        }
        if let Some(dir) = file.data_dir {
            builder = builder.data_dir(dir);
        }
        if let Some(ms) = file.request_timeout_ms {
            builder = builder.request_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = file.detection_timeout_ms {
            builder = builder.detection_timeout(Duration::from_millis(ms));
        }
        if let Some(secs) = file.stale_after_secs {
            builder = builder.stale_after(Duration::from_secs(secs));
        }

        let mut retry = RetrySettings::default();
        if let Some(ms) = file.retry.base_delay_ms {
            retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.retry.max_delay_ms {
            retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(jitter) = file.retry.jitter {
            retry.jitter = jitter;
        }
        if let Some(attempts) = file.retry.max_attempts {
            retry.max_attempts = attempts;
        }
        builder.retry(retry).build()
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)?.with_env_overrides()
    }

    /// Apply `WARDROBE_*` environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(url) = std::env::var("WARDROBE_API_URL") {
            self.server_url = url;
        }
        if let Ok(dir) = std::env::var("WARDROBE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(ms) = std::env::var("WARDROBE_DETECTION_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| ConfigError::InvalidValue("WARDROBE_DETECTION_TIMEOUT_MS", ms))?;
            self.detection_timeout = Duration::from_millis(ms);
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.server_url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingValue("server_url"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("request_timeout", "0".to_string()));
        }
        if self.detection_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("detection_timeout", "0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::InvalidValue("retry.jitter", self.retry.jitter.to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue("retry.max_attempts", "0".to_string()));
        }
        Ok(())
    }

    /// Path of the SQLite file under `data_dir`
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("local.db")
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    server_url: Option<String>,
    data_dir: Option<PathBuf>,
    request_timeout: Option<Duration>,
    detection_timeout: Option<Duration>,
    stale_after: Option<Duration>,
    retry: Option<RetrySettings>,
}

impl AppConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn detection_timeout(mut self, timeout: Duration) -> Self {
        self.detection_timeout = Some(timeout);
        self
    }

    pub fn stale_after(mut self, age: Duration) -> Self {
        self.stale_after = Some(age);
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            server_url: self
                .server_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.server_url),
            data_dir: self.data_dir.unwrap_or(defaults.data_dir),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            detection_timeout: self.detection_timeout.unwrap_or(defaults.detection_timeout),
            stale_after: self.stale_after.unwrap_or(defaults.stale_after),
            retry: self.retry.unwrap_or(defaults.retry),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
