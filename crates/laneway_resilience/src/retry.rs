//! Retriers.
//!
//! A retrier re-runs a unit of work under one [`RetryPolicy`]. The work
//! reports each attempt as `Ok` or a classified [`Failure`]; it keeps its
//! own last response, so the retry and non-retry paths look the same to
//! whoever reads the response afterwards.

use async_trait::async_trait;
use laneway_core::Failure;
use laneway_policy::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

use crate::registry::FactoryRegistry;

/// Unit of work driven by a retrier
#[async_trait]
pub trait RetryWork: Send {
    /// Run attempt number `attempt` (1-indexed)
    async fn attempt(&mut self, attempt: u32) -> Result<(), Failure>;

    /// Whether repeating the work is safe
    fn idempotent(&self) -> bool {
        true
    }
}

/// What a retrier observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Attempts made, including the first
    pub attempts: u32,
    /// Result of the last attempt
    pub result: Result<(), Failure>,
}

impl RetryOutcome {
    /// Whether the last attempt succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Retry strategy bound to one policy
#[async_trait]
pub trait Retrier: Send + Sync {
    /// Bound policy
    fn policy(&self) -> &RetryPolicy;

    /// Run `work` until it succeeds, fails with a non-retryable failure, or
    /// the attempt budget is spent
    ///
    /// Implementations call `work.attempt` at least once.
    async fn execute(&self, work: &mut dyn RetryWork) -> RetryOutcome;
}

/// Builds retriers for policies
pub trait RetrierFactory: Send + Sync {
    /// Retrier for `policy`; `None` when there is no policy to apply
    fn get(&self, policy: Option<&RetryPolicy>) -> Option<Arc<dyn Retrier>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    Exponential,
    Fixed,
}

/// Retrier sleeping between attempts
#[derive(Debug, Clone)]
pub struct BackoffRetrier {
    policy: RetryPolicy,
    schedule: Schedule,
}

impl BackoffRetrier {
    /// Exponential backoff as configured by the policy
    #[must_use]
    pub fn exponential(policy: RetryPolicy) -> Self {
        Self {
            policy,
            schedule: Schedule::Exponential,
        }
    }

    /// Constant `interval_ms` between attempts
    #[must_use]
    pub fn fixed(policy: RetryPolicy) -> Self {
        Self {
            policy,
            schedule: Schedule::Fixed,
        }
    }

    /// Delay after attempt `attempt` fails, or `None` when no attempt follows
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        match self.schedule {
            Schedule::Exponential => self.policy.delay_for_attempt(attempt),
            Schedule::Fixed => (attempt >= 1 && attempt < self.policy.max_attempts)
                .then(|| Duration::from_millis(self.policy.interval_ms)),
        }
    }
}

#[async_trait]
impl Retrier for BackoffRetrier {
    fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn execute(&self, work: &mut dyn RetryWork) -> RetryOutcome {
        let mut attempt = 1;
        loop {
            let result = work.attempt(attempt).await;
            let failure = match result {
                Ok(()) => {
                    return RetryOutcome {
                        attempts: attempt,
                        result: Ok(()),
                    };
                }
                Err(failure) => failure,
            };

            if !self.policy.is_retryable(&failure, work.idempotent()) {
                tracing::debug!(attempt, kind = %failure.kind, "failure not retryable");
                return RetryOutcome {
                    attempts: attempt,
                    result: Err(failure),
                };
            }

            let Some(delay) = self.delay_after(attempt) else {
                tracing::warn!(
                    attempts = attempt,
                    kind = %failure.kind,
                    "retries exhausted"
                );
                return RetryOutcome {
                    attempts: attempt,
                    result: Err(failure),
                };
            };

            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                kind = %failure.kind,
                "retrying after failure"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }
}

/// Factory for `exponential` retriers
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialRetrierFactory;

impl RetrierFactory for ExponentialRetrierFactory {
    fn get(&self, policy: Option<&RetryPolicy>) -> Option<Arc<dyn Retrier>> {
        policy.map(|p| Arc::new(BackoffRetrier::exponential(p.clone())) as Arc<dyn Retrier>)
    }
}

/// Factory for `fixed` retriers
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRetrierFactory;

impl RetrierFactory for FixedRetrierFactory {
    fn get(&self, policy: Option<&RetryPolicy>) -> Option<Arc<dyn Retrier>> {
        policy.map(|p| Arc::new(BackoffRetrier::fixed(p.clone())) as Arc<dyn Retrier>)
    }
}

/// Registry holding the built-in retrier factories
#[must_use]
pub fn retrier_registry() -> FactoryRegistry<dyn RetrierFactory> {
    let mut registry: FactoryRegistry<dyn RetrierFactory> = FactoryRegistry::new();
    registry.replace("exponential", Arc::new(ExponentialRetrierFactory));
    registry.replace("fixed", Arc::new(FixedRetrierFactory));
    registry
}
