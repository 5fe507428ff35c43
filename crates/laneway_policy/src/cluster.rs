//! Cluster policy.

use serde::{Deserialize, Serialize};

use crate::breaker::CircuitBreakerPolicy;
use crate::error::PolicyError;
use crate::limit::RateLimitPolicy;
use crate::retry::RetryPolicy;
use crate::route::RoutingMetadata;

/// Immutable governance policy for one service
///
/// Policies are never edited in place. The policy store replaces them
/// wholesale, so a reader holding one sees a consistent set of rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPolicy {
    /// Service this policy governs
    pub service: String,
    /// Monotonic policy version
    #[serde(default)]
    pub version: u64,
    /// Cluster invoker type (`failfast`, `failover`, ...)
    #[serde(default)]
    pub invoker: Option<String>,
    /// Retry rules
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    /// Circuit breaker rules
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerPolicy>,
    /// Admission rules
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,
    /// Unit, cell and lane preferences
    #[serde(default)]
    pub routing: RoutingMetadata,
}

impl ClusterPolicy {
    /// Empty policy for a service
    #[must_use]
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            version: 0,
            invoker: None,
            retry: None,
            circuit_breaker: None,
            rate_limit: None,
            routing: RoutingMetadata::default(),
        }
    }

    /// Set the version
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Select the cluster invoker
    #[must_use]
    pub fn with_invoker(mut self, invoker: &str) -> Self {
        self.invoker = Some(invoker.to_string());
        self
    }

    /// Attach retry rules
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Attach circuit breaker rules
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreakerPolicy) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Attach admission rules
    #[must_use]
    pub fn with_rate_limit(mut self, limit: RateLimitPolicy) -> Self {
        self.rate_limit = Some(limit);
        self
    }

    /// Attach routing preferences
    #[must_use]
    pub fn with_routing(mut self, routing: RoutingMetadata) -> Self {
        self.routing = routing;
        self
    }

    /// Validate every attached rule
    ///
    /// # Errors
    ///
    /// Returns the first invalid rule found
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.service.is_empty() {
            return Err(PolicyError::Invalid {
                service: String::new(),
                reason: "service name must not be empty".to_string(),
            });
        }
        if let Some(retry) = &self.retry {
            retry.validate(&self.service)?;
        }
        if let Some(breaker) = &self.circuit_breaker {
            breaker.validate(&self.service)?;
        }
        if let Some(limit) = &self.rate_limit {
            limit.validate(&self.service)?;
        }
        Ok(())
    }
}
