//! Endpoint configuration.
//!
//! Provides the timing knobs shared by producers, consumers and adapters,
//! with defaults, validation and environment overrides.
//!
//! # Environment Variables
//!
//! | variable                      | field              | default |
//! |-------------------------------|--------------------|---------|
//! | `SYNCBRIDGE_TIMEOUT_MS`       | `timeout_ms`       | 5000    |
//! | `SYNCBRIDGE_POLL_INTERVAL_MS` | `poll_interval_ms` | 100     |
//! | `SYNCBRIDGE_BUFFER_TTL_MS`    | `buffer_ttl_ms`    | unset   |
//!
//! # Example
//!
//! ```
//! use syncbridge_runtime::config::EndpointConfig;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EndpointConfig::new("orders")
//!     .with_timeout_ms(250)
//!     .with_buffer_ttl_ms(60_000);
//! config.validate()?;
//!
//! assert_eq!(config.timeout(), Duration::from_millis(250));
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default reply timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default reply channel poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Environment variable overriding [`EndpointConfig::timeout_ms`].
pub const ENV_TIMEOUT_MS: &str = "SYNCBRIDGE_TIMEOUT_MS";

/// Environment variable overriding [`EndpointConfig::poll_interval_ms`].
pub const ENV_POLL_INTERVAL_MS: &str = "SYNCBRIDGE_POLL_INTERVAL_MS";

/// Environment variable setting [`EndpointConfig::buffer_ttl_ms`].
pub const ENV_BUFFER_TTL_MS: &str = "SYNCBRIDGE_BUFFER_TTL_MS";

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Failed to parse an environment value
    #[error("Failed to parse {var}='{value}': {reason}")]
    ParseError {
        /// Variable name
        var: String,
        /// Raw value
        value: String,
        /// Parser message
        reason: String,
    },
}

/// Configuration of one synchronous endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint name, used for correlation key aliases and logs
    pub name: String,
    /// Reply timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Reply channel poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Eviction age for unconsumed replies; `None` keeps them until consumed
    #[serde(default)]
    pub buffer_ttl_ms: Option<u64>,
}

const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl EndpointConfig {
    /// Default configuration for endpoint `name`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            buffer_ttl_ms: None,
        }
    }

    /// Configuration for `name` with environment overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] if a variable is not a valid
    /// integer, or [`ConfigError::ValidationError`] if the result is invalid.
    pub fn from_env(name: impl Into<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new(name);

        if let Some(timeout_ms) = read_env_ms(ENV_TIMEOUT_MS)? {
            config.timeout_ms = timeout_ms;
        }
        if let Some(poll_interval_ms) = read_env_ms(ENV_POLL_INTERVAL_MS)? {
            config.poll_interval_ms = poll_interval_ms;
        }
        if let Some(buffer_ttl_ms) = read_env_ms(ENV_BUFFER_TTL_MS)? {
            config.buffer_ttl_ms = Some(buffer_ttl_ms);
        }

        config.validate()?;
        tracing::debug!(?config, "Loaded endpoint configuration from environment");
        Ok(config)
    }

    /// Set the reply timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Evict unconsumed replies after `buffer_ttl_ms`
    #[must_use]
    pub const fn with_buffer_ttl_ms(mut self, buffer_ttl_ms: u64) -> Self {
        self.buffer_ttl_ms = Some(buffer_ttl_ms);
        self
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty or a duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError("name cannot be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ValidationError("timeout_ms must be > 0".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.buffer_ttl_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "buffer_ttl_ms must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Reply timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Buffer TTL as Duration
    #[must_use]
    pub fn buffer_ttl(&self) -> Option<Duration> {
        self.buffer_ttl_ms.map(Duration::from_millis)
    }
}

fn read_env_ms(var: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: std::num::ParseIntError| ConfigError::ParseError {
                var: var.to_string(),
                value,
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
