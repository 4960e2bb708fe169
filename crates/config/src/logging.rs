//! Logging settings
//!
//! Stdout carries Singer messages, so logs go to stderr or to a file. A
//! config that points logs at stdout is rejected when it is loaded.
//!
//! ```toml
//! [log]
//! level = "WARNING"
//! format = "json"
//! output = "/var/log/tap-iterable.log"
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// HTTP stack crates capped at `warn` when the tap logs at info or debug
const NOISY_TARGETS: [&str; 4] = ["hyper", "hyper_util", "reqwest", "rustls"];

/// Verbosity of the tap's own events
///
/// Parsing is case-insensitive and also takes the Python logging names
/// (`WARNING`, `CRITICAL`) that Singer runners pass through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// `EnvFilter` directive for this level
    ///
    /// At info and debug the HTTP stack stays at warn; trace lets everything
    /// through.
    pub fn filter_directive(self) -> String {
        match self {
            Self::Info | Self::Debug => {
                let mut directive = self.as_str().to_string();
                for target in NOISY_TARGETS {
                    directive.push_str(&format!(",{target}=warn"));
                }
                directive
            }
            _ => self.as_str().to_string(),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "critical" => Ok(Self::Error),
            other => Err(ConfigError::invalid_value(
                "log.level",
                format!("unknown level '{other}'"),
            )),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, <LogLevel as TryFrom<String>>::Error> {
        value.parse()
    }
}

/// Line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    #[serde(alias = "text")]
    Console,
    Json,
}

/// Where log lines are written
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LogOutput {
    #[default]
    Stderr,
    /// Appended to, created if missing
    File(PathBuf),
}

impl TryFrom<String> for LogOutput {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("stderr") {
            return Ok(Self::Stderr);
        }
        if value.is_empty() || value == "-" || value.eq_ignore_ascii_case("stdout") {
            return Err(ConfigError::invalid_value(
                "log.output",
                "stdout is reserved for Singer messages; use stderr or a file path",
            ));
        }
        Ok(Self::File(PathBuf::from(value)))
    }
}

/// The `[log]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
}

impl LogConfig {
    /// Colour only human-readable output on stderr
    pub fn ansi(&self) -> bool {
        self.format == LogFormat::Console && self.output == LogOutput::Stderr
    }
}
