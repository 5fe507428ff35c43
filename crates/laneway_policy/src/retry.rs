//! Retry policy.
//!
//! Decides how many attempts a call gets, how long to back off between
//! them, and which failures are worth another attempt.

use laneway_core::{DispatchKind, Failure, FailureKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::PolicyError;

/// Retry policy for one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub interval_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    pub max_interval_ms: u64,
    /// Growth factor applied per retry
    pub multiplier: f64,
    /// Failure codes that are retryable regardless of kind
    pub retryable_codes: BTreeSet<String>,
    /// Failure kinds that are retryable
    pub retryable_kinds: BTreeSet<FailureKind>,
    /// Only retry requests marked idempotent
    pub idempotent_only: bool,
}

impl RetryPolicy {
    /// Policy with `max_attempts` attempts and default backoff
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Set backoff parameters
    #[must_use]
    pub fn with_backoff(mut self, interval_ms: u64, max_interval_ms: u64, multiplier: f64) -> Self {
        self.interval_ms = interval_ms;
        self.max_interval_ms = max_interval_ms;
        self.multiplier = multiplier;
        self
    }

    /// Mark a failure kind retryable
    #[must_use]
    pub fn with_retryable_kind(mut self, kind: FailureKind) -> Self {
        self.retryable_kinds.insert(kind);
        self
    }

    /// Mark a failure code retryable
    #[must_use]
    pub fn with_retryable_code(mut self, code: &str) -> Self {
        self.retryable_codes.insert(code.to_string());
        self
    }

    /// Restrict retries to idempotent requests
    #[must_use]
    pub fn idempotent_only(mut self) -> Self {
        self.idempotent_only = true;
        self
    }

    /// Delay before retry number `retry` (1-indexed), exponential and capped
    ///
    /// Returns `None` once the attempt budget is spent.
    #[must_use]
    pub fn delay_for_attempt(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry >= self.max_attempts {
            return None;
        }
        let exponent = (retry - 1) as f64;
        let delay_ms = self.interval_ms as f64 * self.multiplier.powf(exponent);
        let capped = delay_ms.min(self.max_interval_ms as f64).max(0.0);
        Some(Duration::from_millis(capped as u64))
    }

    /// Whether another attempt may follow this failure
    ///
    /// Readiness and routing failures are never retryable: a new attempt would
    /// observe the same state.
    #[must_use]
    pub fn is_retryable(&self, failure: &Failure, idempotent: bool) -> bool {
        match failure.kind {
            FailureKind::Unready | FailureKind::NoProvider => return false,
            _ => {}
        }
        if self.idempotent_only && !idempotent {
            return false;
        }
        if let Some(code) = &failure.code {
            if self.retryable_codes.contains(code) {
                return true;
            }
        }
        self.retryable_kinds.contains(&failure.kind)
    }

    /// Check the policy is usable
    ///
    /// # Errors
    ///
    /// Returns error if the attempt budget or backoff is invalid
    pub fn validate(&self, service: &str) -> Result<(), PolicyError> {
        let invalid = |reason: &str| PolicyError::Invalid {
            service: service.to_string(),
            reason: reason.to_string(),
        };
        if self.max_attempts == 0 {
            return Err(invalid("retry maxAttempts must be at least 1"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(invalid("retry multiplier must be >= 1.0"));
        }
        if self.interval_ms > self.max_interval_ms {
            return Err(invalid("retry intervalMs exceeds maxIntervalMs"));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval_ms: 100,
            max_interval_ms: 2_000,
            multiplier: 2.0,
            retryable_codes: BTreeSet::new(),
            retryable_kinds: [
                FailureKind::Dispatch(DispatchKind::Connect),
                FailureKind::Dispatch(DispatchKind::Timeout),
                FailureKind::Dispatch(DispatchKind::Transport),
            ]
            .into_iter()
            .collect(),
            idempotent_only: false,
        }
    }
}
