//! Tap Iterable Configuration
//!
//! Loads the tap configuration from a JSON file (the usual Singer
//! `config.json`) or a TOML file, fills in defaults and validates the result.
//! Only `api_key` and `start_date` are required.
//!
//! # Parsing
//!
//! ```
//! use tap_iterable_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str(
//!     "api_key = \"secret\"\nstart_date = \"2024-01-01T00:00:00Z\"",
//! )
//! .unwrap();
//! assert_eq!(config.api_window_in_days, 30);
//! ```
//!
//! # Example JSON Config
//!
//! ```json
//! {
//!   "api_key": "xxxxxxxx",
//!   "start_date": "2024-01-01T00:00:00Z",
//!   "api_window_in_days": 30
//! }
//! ```

mod datetime;
mod error;
mod logging;

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub use datetime::parse_datetime;
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};

/// Iterable API root
pub const DEFAULT_BASE_URL: &str = "https://api.iterable.com/api/";

/// Default export window (days per bulk export request)
pub const DEFAULT_API_WINDOW_IN_DAYS: u32 = 30;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default attempt cap for rate-limited requests (initial request included)
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default first backoff delay after a 429
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Iterable API key, sent as the `api_key` query parameter
    pub api_key: String,

    /// Bookmark used for streams with no saved state (ISO datetime)
    pub start_date: String,

    /// Size of a bulk export window in days
    pub api_window_in_days: u32,

    /// API root, overridable for testing against a proxy
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum attempts for a rate-limited request
    pub max_retries: u32,

    /// First backoff delay in milliseconds (doubles every attempt)
    pub retry_base_delay_ms: u64,

    /// Stop reading a streamed response after this many bytes (unbounded if unset)
    pub max_stream_bytes: Option<u64>,

    /// User agent sent with every request
    pub user_agent: String,

    /// Directory holding `<stream>.json` schema overrides
    pub schema_dir: Option<PathBuf>,

    /// Logging configuration
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            start_date: String::new(),
            api_window_in_days: DEFAULT_API_WINDOW_IN_DAYS,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_stream_bytes: None,
            user_agent: concat!("tap-iterable/", env!("CARGO_PKG_VERSION")).to_string(),
            schema_dir: None,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    ///
    /// Files ending in `.toml` are parsed as TOML, everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, does not parse, or fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_str(&contents)
        } else {
            Self::from_json(&contents)
        }
    }

    /// Parse configuration from a JSON string
    pub fn from_json(s: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::missing_field("api_key"));
        }
        if self.start_date.trim().is_empty() {
            return Err(ConfigError::missing_field("start_date"));
        }
        if parse_datetime(&self.start_date).is_none() {
            return Err(ConfigError::invalid_value(
                "start_date",
                format!("not a datetime: '{}'", self.start_date),
            ));
        }
        if self.api_window_in_days == 0 {
            return Err(ConfigError::invalid_value(
                "api_window_in_days",
                "must be at least 1",
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::invalid_value("max_retries", "must be at least 1"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::invalid_value(
                "base_url",
                format!("expected an http(s) URL, got '{}'", self.base_url),
            ));
        }
        Ok(())
    }

    /// The configured start date as UTC
    ///
    /// Always `Some` for a validated config.
    pub fn start_date_utc(&self) -> Option<DateTime<Utc>> {
        parse_datetime(&self.start_date)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
api_key = "key-123"
start_date = "2024-01-01T00:00:00Z"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_str(MINIMAL_TOML).unwrap();
        assert_eq!(config.api_key, "key-123");
        assert_eq!(config.api_window_in_days, 30);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.retry_base_delay_ms, 1000);
        assert!(config.max_stream_bytes.is_none());
        assert!(config.schema_dir.is_none());
    }

    #[test]
    fn test_json_config() {
        let config = Config::from_json(
            r#"{"api_key": "abc", "start_date": "2023-06-01", "api_window_in_days": 7}"#,
        )
        .unwrap();
        assert_eq!(config.api_window_in_days, 7);
        assert_eq!(
            config.start_date_utc().unwrap().to_rfc3339(),
            "2023-06-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_missing_api_key() {
        let err = Config::from_json(r#"{"start_date": "2023-06-01"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "api_key" }));
    }

    #[test]
    fn test_missing_start_date() {
        let err = Config::from_json(r#"{"api_key": "abc"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "start_date" }));
    }

    #[test]
    fn test_invalid_start_date() {
        let err = Config::from_json(r#"{"api_key": "abc", "start_date": "last week"}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "start_date", .. }
        ));
    }

    #[test]
    fn test_export_style_start_date_accepted() {
        let config = Config::from_json(
            r#"{"api_key": "abc", "start_date": "2021-01-01 00:00:00 +00:00"}"#,
        )
        .unwrap();
        assert_eq!(
            config.start_date_utc().unwrap().to_rfc3339(),
            "2021-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = Config::from_json(
            r#"{"api_key": "abc", "start_date": "2023-06-01", "api_window_in_days": 0}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "api_window_in_days", .. }
        ));
    }

    #[test]
    fn test_start_date_formats() {
        let expected = "2021-01-01T00:00:00+00:00";
        for value in [
            "2021-01-01T00:00:00Z",
            "2021-01-01T00:00:00+00:00",
            "2021-01-01T00:00:00",
            "2021-01-01 00:00:00",
            "2021-01-01 00:00:00 +00:00",
            "2021-01-01 02:00:00 +02:00",
            "2021-01-01 00:00:00 UTC",
            "2021-01-01",
        ] {
            let parsed = parse_datetime(value).unwrap();
            assert_eq!(parsed.to_rfc3339(), expected, "format: {value}");
        }
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("config.toml");
        std::fs::File::create(&toml_path)
            .unwrap()
            .write_all(MINIMAL_TOML.as_bytes())
            .unwrap();
        assert_eq!(Config::from_file(&toml_path).unwrap().api_key, "key-123");

        let json_path = dir.path().join("config.json");
        std::fs::write(
            &json_path,
            r#"{"api_key": "json-key", "start_date": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(Config::from_file(&json_path).unwrap().api_key, "json-key");
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/nonexistent/tap-config.json").unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }

    #[test]
    fn test_log_to_stdout_rejected() {
        let err = Config::from_json(
            r#"{"api_key": "abc", "start_date": "2024-01-01", "log": {"output": "stdout"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("reserved for Singer messages"));
    }

    #[test]
    fn test_log_section() {
        let config = Config::from_str(&format!("{MINIMAL_TOML}\n[log]\nlevel = \"debug\"\n"))
            .unwrap();
        assert_eq!(config.log.level, LogLevel::Debug);
    }
}
