//! Service configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! [`Overrides`] from the command line or environment.

use std::net::SocketAddr;
use std::time::Duration;

use api_client::uri::{IntoUri as _, ParseUriError};
use axum::http::Uri;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::aggregate::DEFAULT_CONCURRENCY;

/// Registry used when none is configured.
pub const DEFAULT_REGISTRY_URL: &str = "http://registry:5000";

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("reading {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The configuration file is not valid.
    #[error("parsing configuration: {0}")]
    Parse(#[from] toml_edit::de::Error),

    /// The registry URL could not be parsed.
    #[error("registry URL: {0}")]
    RegistryUrl(#[from] ParseUriError),

    /// The registry URL is not an absolute http(s) URL.
    #[error("registry URL must be an absolute http or https URL: {0}")]
    RegistryScheme(Uri),

    /// The concurrency limit is zero.
    #[error("concurrency must be at least 1")]
    Concurrency,

    /// A timeout is zero.
    #[error("{0} must be greater than zero")]
    Timeout(&'static str),
}

/// Configuration for the registry UI service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the registry.
    #[serde(with = "api_client::uri::serde")]
    pub registry_url: Uri,

    /// Address the HTTP API listens on.
    pub bind: SocketAddr,

    /// Timeout for single registry calls, in seconds.
    #[serde(with = "seconds")]
    pub timeout: Duration,

    /// Timeout for registry calls made while aggregating, in seconds.
    #[serde(with = "seconds")]
    pub aggregate_timeout: Duration,

    /// Registry calls allowed in flight per aggregation request.
    pub concurrency: usize,

    /// Allow cross-origin requests from any origin.
    pub cors: bool,

    /// Emit logs as JSON.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            registry_url: Uri::from_static(DEFAULT_REGISTRY_URL),
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            timeout: Duration::from_secs(5),
            aggregate_timeout: Duration::from_secs(30),
            concurrency: DEFAULT_CONCURRENCY,
            cors: true,
            log_json: false,
        }
    }
}

/// Values which replace whatever the defaults or the config file provide.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Registry base URL.
    pub registry_url: Option<String>,
    /// Listen address.
    pub bind: Option<SocketAddr>,
    /// Single-call timeout.
    pub timeout: Option<Duration>,
    /// Aggregation timeout.
    pub aggregate_timeout: Option<Duration>,
    /// Aggregation concurrency.
    pub concurrency: Option<usize>,
    /// CORS toggle.
    pub cors: Option<bool>,
    /// JSON logging toggle.
    pub log_json: Option<bool>,
}

impl Config {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        let config: Config = toml_edit::de::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_path(path: &Utf8Path) -> Result<Self, ConfigError> {
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml(&document)
    }

    /// Load configuration from an optional file, then apply `overrides`.
    pub fn load(path: Option<&Utf8Path>, overrides: Overrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => Config::default(),
        };
        config.apply(overrides)?;
        Ok(config)
    }

    /// Replace configured values with any that are set in `overrides`.
    pub fn apply(&mut self, overrides: Overrides) -> Result<(), ConfigError> {
        if let Some(url) = overrides.registry_url {
            self.registry_url = url.as_str().into_uri()?;
        }
        if let Some(bind) = overrides.bind {
            self.bind = bind;
        }
        if let Some(timeout) = overrides.timeout {
            self.timeout = timeout;
        }
        if let Some(timeout) = overrides.aggregate_timeout {
            self.aggregate_timeout = timeout;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(cors) = overrides.cors {
            self.cors = cors;
        }
        if let Some(log_json) = overrides.log_json {
            self.log_json = log_json;
        }

        self.validate()
    }

    /// Check values that parse but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheme = self.registry_url.scheme_str();
        if !matches!(scheme, Some("http" | "https")) || self.registry_url.authority().is_none() {
            return Err(ConfigError::RegistryScheme(self.registry_url.clone()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Concurrency);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Timeout("timeout"));
        }
        if self.aggregate_timeout.is_zero() {
            return Err(ConfigError::Timeout("aggregate_timeout"));
        }
        Ok(())
    }

    /// Registry URL as displayed to API callers, without a trailing slash.
    pub fn registry_url_display(&self) -> String {
        self.registry_url
            .to_string()
            .trim_end_matches('/')
            .to_owned()
    }
}

/// Durations written as (possibly fractional) seconds.
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize as _, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds).map_err(de::Error::custom)
    }
}
