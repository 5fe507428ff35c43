//! Governance configuration.
//!
//! Selects which registered strategy backs each resilience concern and how
//! long keyed limiter and breaker state is retained. Loaded from camelCase
//! JSON; every field has a default.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::route::RoutingMode;

/// Default sweep interval for keyed resilience state, in milliseconds
pub const DEFAULT_CLEAN_INTERVAL_MS: u64 = 30_000;

/// Default idle age after which keyed resilience state is evicted, in milliseconds
pub const DEFAULT_EXPIRE_TIME_MS: u64 = 60_000;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config {path}: {message}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying error
        message: String,
    },

    /// Document could not be parsed
    #[error("Config parse error: {0}")]
    Parse(String),

    /// A field holds an unusable value
    #[error("Invalid config field {field}: {reason}")]
    Invalid {
        /// Offending field
        field: String,
        /// What is wrong
        reason: String,
    },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Retry strategy selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Registered retrier factory type
    #[serde(rename = "type")]
    pub retry_type: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_type: "exponential".to_string(),
        }
    }
}

/// Rate limiter strategy selection and state retention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimiterConfig {
    /// Registered limiter factory type
    #[serde(rename = "type")]
    pub limiter_type: String,
    /// How often expired limiter state is swept, in milliseconds
    pub clean_interval: u64,
    /// Idle age after which limiter state is evicted, in milliseconds
    pub expire_time: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            limiter_type: "tokenBucket".to_string(),
            clean_interval: DEFAULT_CLEAN_INTERVAL_MS,
            expire_time: DEFAULT_EXPIRE_TIME_MS,
        }
    }
}

/// Circuit breaker strategy selection and state retention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerConfig {
    /// Registered breaker factory type
    #[serde(rename = "type")]
    pub breaker_type: String,
    /// How often expired breaker state is swept, in milliseconds
    pub clean_interval: u64,
    /// Idle age after which breaker state is evicted, in milliseconds
    pub expire_time: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            breaker_type: "count".to_string(),
            clean_interval: DEFAULT_CLEAN_INTERVAL_MS,
            expire_time: DEFAULT_EXPIRE_TIME_MS,
        }
    }
}

/// Routing defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingConfig {
    /// Candidate reuse rule when a policy does not set one
    pub mode: RoutingMode,
}

/// Top-level governance configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GovernanceConfig {
    /// Cluster invoker used when a policy does not name one
    pub invoker: String,
    /// Retry strategy
    pub retry: RetryConfig,
    /// Rate limiter strategy
    pub rate_limiter: RateLimiterConfig,
    /// Circuit breaker strategy
    pub circuit_breaker: CircuitBreakerConfig,
    /// Routing defaults
    pub routing: RoutingConfig,
}

impl GovernanceConfig {
    /// Parse and validate a JSON document
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or invalid
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is invalid
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loading governance config");
        Self::from_json_str(&json)
    }

    /// Set the default invoker
    #[must_use]
    pub fn with_invoker(mut self, invoker: &str) -> Self {
        self.invoker = invoker.to_string();
        self
    }

    /// Set rate limiter retention
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiterConfig) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Set circuit breaker retention
    #[must_use]
    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Set the default routing mode
    #[must_use]
    pub fn with_routing_mode(mut self, mode: RoutingMode) -> Self {
        self.routing.mode = mode;
        self
    }

    /// Check every field is usable
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        };
        if self.invoker.is_empty() {
            return Err(invalid("invoker", "must not be empty"));
        }
        if self.retry.retry_type.is_empty() {
            return Err(invalid("retry.type", "must not be empty"));
        }
        if self.rate_limiter.limiter_type.is_empty() {
            return Err(invalid("rateLimiter.type", "must not be empty"));
        }
        if self.rate_limiter.clean_interval == 0 {
            return Err(invalid("rateLimiter.cleanInterval", "must be positive"));
        }
        if self.rate_limiter.expire_time == 0 {
            return Err(invalid("rateLimiter.expireTime", "must be positive"));
        }
        if self.circuit_breaker.breaker_type.is_empty() {
            return Err(invalid("circuitBreaker.type", "must not be empty"));
        }
        if self.circuit_breaker.clean_interval == 0 {
            return Err(invalid("circuitBreaker.cleanInterval", "must be positive"));
        }
        if self.circuit_breaker.expire_time == 0 {
            return Err(invalid("circuitBreaker.expireTime", "must be positive"));
        }
        Ok(())
    }
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            invoker: "failfast".to_string(),
            retry: RetryConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}
