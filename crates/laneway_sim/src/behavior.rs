//! How a simulated endpoint answers.

use laneway_cluster::{Endpoint, OutboundResponse, Reply};
use laneway_core::{DispatchKind, Failure, FailureKind};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Failure probability, latency and failure shape of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointBehavior {
    /// Probability in `[0, 1]` that a dispatch fails
    pub failure_rate: f64,
    /// Simulated dispatch latency, in milliseconds
    pub latency_ms: u64,
    /// Kind of every simulated failure: a dispatch kind or `Application`
    pub failure_kind: FailureKind,
    /// Code attached to simulated failures
    pub failure_code: Option<String>,
}

impl EndpointBehavior {
    /// Never fails
    #[must_use]
    pub fn healthy() -> Self {
        Self::default()
    }

    /// Fails with probability `rate`
    #[must_use]
    pub fn failing(rate: f64) -> Self {
        Self {
            failure_rate: rate,
            ..Self::default()
        }
    }

    /// Delay every dispatch
    #[must_use]
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Shape of simulated failures
    #[must_use]
    pub fn with_failure(mut self, kind: FailureKind, code: Option<&str>) -> Self {
        self.failure_kind = kind;
        self.failure_code = code.map(str::to_string);
        self
    }

    /// Check the behavior can be simulated for `endpoint`
    ///
    /// # Errors
    ///
    /// Returns error if the rate is outside `[0, 1]` or the failure kind is
    /// not something a dispatch can produce
    pub fn validate(&self, endpoint: &str) -> Result<(), SimError> {
        let invalid = |reason: &str| SimError::InvalidBehavior {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(invalid("failureRate must be within [0, 1]"));
        }
        match self.failure_kind {
            FailureKind::Dispatch(_) | FailureKind::Application => Ok(()),
            _ => Err(invalid("failureKind must be a dispatch or application failure")),
        }
    }

    /// Draw one dispatch outcome
    ///
    /// Dispatch failures come back as `Err`, application failures as a
    /// completed response carrying the failure.
    pub fn outcome(
        &self,
        rng: &mut ChaCha8Rng,
        endpoint: &Endpoint,
    ) -> Result<OutboundResponse, Failure> {
        let failed = self.failure_rate > 0.0 && rng.r#gen::<f64>() < self.failure_rate;
        if !failed {
            let reply = Reply::new(&endpoint.id, Vec::new()).with_code("200");
            return Ok(OutboundResponse::Success(reply));
        }
        let mut failure = Failure::new(
            self.failure_kind,
            format!("simulated {} at {}", self.failure_kind, endpoint),
        );
        failure.code = self.failure_code.clone();
        match self.failure_kind {
            FailureKind::Application => Ok(OutboundResponse::Failure(failure)),
            _ => Err(failure),
        }
    }
}

impl Default for EndpointBehavior {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            latency_ms: 0,
            failure_kind: FailureKind::Dispatch(DispatchKind::Connect),
            failure_code: None,
        }
    }
}
