//! Engine configuration
//!
//! Settings are layered: built-in defaults, then an optional JSON file,
//! then `H2DASH_*` environment variables. Command-line flags are applied
//! on top by the front end.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::gauge::{GaugeError, GradientSelector};
use crate::protocol::{DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// Default poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "H2DASH_";

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The settings file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that was requested
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON for [`EngineConfig`]
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// A setting has an unusable value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// Setting name
        field: String,
        /// What is wrong with it
        message: String,
    },
}

fn default_port() -> String {
    if cfg!(windows) {
        "COM4".to_string()
    } else {
        "/dev/ttyACM0".to_string()
    }
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Serial device path or name
    pub port: String,

    /// Baud rate
    pub baud_rate: u32,

    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,

    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Initial gradient (index or name)
    pub gradient: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            gradient: "Blue-Black".to_string(),
        }
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            field: field.to_string(),
            message: e.to_string(),
        })
}

impl EngineConfig {
    /// Read settings from a JSON file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Defaults, then the file (if any), then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `H2DASH_*` overrides from an environment listing
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match name {
                "PORT" => self.port = value.trim().to_string(),
                "BAUD_RATE" => self.baud_rate = parse_field("baud_rate", value)?,
                "READ_TIMEOUT_MS" => {
                    self.read_timeout_ms = parse_field("read_timeout_ms", value)?
                }
                "POLL_INTERVAL_MS" => {
                    self.poll_interval_ms = parse_field("poll_interval_ms", value)?
                }
                "GRADIENT" => self.gradient = value.trim().to_string(),
                _ => tracing::debug!("Ignoring unknown setting {}", key.as_ref()),
            }
        }
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.to_string(),
        };
        if self.port.trim().is_empty() {
            return Err(invalid("port", "must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(invalid("baud_rate", "must be greater than zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be greater than zero"));
        }
        self.gradient_selector()
            .map_err(|e: GaugeError| invalid("gradient", &e.to_string()))?;
        Ok(())
    }

    /// Read timeout as a [`Duration`]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The configured initial gradient, checked against the presets
    pub fn gradient_selector(&self) -> Result<GradientSelector, GaugeError> {
        let selector: GradientSelector = self.gradient.parse()?;
        selector.resolve()?;
        Ok(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.read_timeout(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "port": "COM7", "baud_rate": 115200 }}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config,
            EngineConfig {
                port: "COM7".to_string(),
                baud_rate: 115200,
                ..EngineConfig::default()
            }
        );
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_file("/nonexistent/h2dash.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ port: ").unwrap();
        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_validates_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "gradient": "Green-Yellow" }}"#).unwrap();
        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.gradient, "Green-Yellow");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "baud_rate": 0 }}"#).unwrap();
        assert!(matches!(
            EngineConfig::load(Some(file.path())),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::default();
        config
            .apply_env([
                ("H2DASH_PORT", "/dev/ttyUSB3"),
                ("H2DASH_BAUD_RATE", "57600"),
                ("H2DASH_POLL_INTERVAL_MS", "250"),
                ("H2DASH_GRADIENT", "2"),
                ("PATH", "/usr/bin"),
            ])
            .unwrap();

        assert_eq!(config.port, "/dev/ttyUSB3");
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.gradient, "2");
        assert_eq!(config.read_timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_env_bad_number() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_env([("H2DASH_BAUD_RATE", "fast")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "baud_rate"));
    }

    #[test]
    fn test_validate_rejects() {
        let config = EngineConfig {
            poll_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            gradient: "rainbow".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            port: "  ".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
