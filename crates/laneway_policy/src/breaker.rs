//! Circuit breaker policy.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Circuit breaker thresholds for one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerPolicy {
    /// Breaker strategy; falls back to the configured default when absent
    #[serde(rename = "type")]
    pub breaker_type: Option<String>,
    /// Failure percentage (0-100) at which the breaker opens
    pub failure_rate_threshold: f64,
    /// Number of most recent calls considered
    pub sliding_window_size: u32,
    /// Calls required in the window before the rate is evaluated
    pub minimum_calls: u32,
    /// How long the breaker stays open, in milliseconds
    pub wait_in_open_ms: u64,
    /// Trial calls admitted while half-open
    pub permitted_calls_in_half_open: u32,
}

impl CircuitBreakerPolicy {
    /// Set the failure threshold and window
    #[must_use]
    pub fn with_threshold(mut self, failure_rate: f64, window: u32, minimum_calls: u32) -> Self {
        self.failure_rate_threshold = failure_rate;
        self.sliding_window_size = window;
        self.minimum_calls = minimum_calls;
        self
    }

    /// Set the open duration
    #[must_use]
    pub fn with_wait_in_open(mut self, wait_ms: u64) -> Self {
        self.wait_in_open_ms = wait_ms;
        self
    }

    /// Set the half-open trial count
    #[must_use]
    pub fn with_half_open_calls(mut self, calls: u32) -> Self {
        self.permitted_calls_in_half_open = calls;
        self
    }

    /// Check the thresholds are usable
    ///
    /// # Errors
    ///
    /// Returns error if a threshold is out of range
    pub fn validate(&self, service: &str) -> Result<(), PolicyError> {
        let invalid = |reason: &str| PolicyError::Invalid {
            service: service.to_string(),
            reason: reason.to_string(),
        };
        if !(0.0..=100.0).contains(&self.failure_rate_threshold) {
            return Err(invalid("circuit breaker failureRateThreshold must be within 0-100"));
        }
        if self.sliding_window_size == 0 {
            return Err(invalid("circuit breaker slidingWindowSize must be positive"));
        }
        if self.permitted_calls_in_half_open == 0 {
            return Err(invalid("circuit breaker permittedCallsInHalfOpen must be positive"));
        }
        Ok(())
    }
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self {
            breaker_type: None,
            failure_rate_threshold: 50.0,
            sliding_window_size: 100,
            minimum_calls: 10,
            wait_in_open_ms: 5_000,
            permitted_calls_in_half_open: 3,
        }
    }
}
