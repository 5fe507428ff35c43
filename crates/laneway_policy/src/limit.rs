//! Rate limit policy.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Admission budget for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitPolicy {
    /// Limiter strategy; falls back to the configured default when absent
    #[serde(rename = "type")]
    pub limiter_type: Option<String>,
    /// Permits granted per window
    pub permits: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RateLimitPolicy {
    /// `permits` calls per `window_ms`
    #[must_use]
    pub fn new(permits: u64, window_ms: u64) -> Self {
        Self {
            limiter_type: None,
            permits,
            window_ms,
        }
    }

    /// Pin a limiter strategy
    #[must_use]
    pub fn with_type(mut self, limiter_type: &str) -> Self {
        self.limiter_type = Some(limiter_type.to_string());
        self
    }

    /// Check the budget is usable
    ///
    /// # Errors
    ///
    /// Returns error if the window is empty
    pub fn validate(&self, service: &str) -> Result<(), PolicyError> {
        if self.window_ms == 0 {
            return Err(PolicyError::Invalid {
                service: service.to_string(),
                reason: "rate limit windowMs must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(100, 1_000)
    }
}
