//! laneway resilience
//!
//! Strategies the cluster invoker drives around a dispatch: retriers,
//! rate limiters and circuit breakers. Each strategy is a factory
//! registered under a type string and selected by policy at call time.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod breaker;
pub mod cache;
pub mod limit;
pub mod registry;
pub mod retry;

pub use breaker::{
    CircuitBreaker, CircuitBreakerBank, CircuitBreakerFactory, CircuitState, CountBreaker,
    CountBreakerFactory, breaker_registry,
};
pub use cache::ExpiringMap;
pub use limit::{
    FixedWindowLimiter, FixedWindowLimiterFactory, RateLimiter, RateLimiterBank,
    RateLimiterFactory, TokenBucketLimiter, TokenBucketLimiterFactory, limiter_registry,
};
pub use registry::{FactoryRegistry, RegistryError};
pub use retry::{
    BackoffRetrier, ExponentialRetrierFactory, FixedRetrierFactory, Retrier, RetrierFactory,
    RetryOutcome, RetryWork, retrier_registry,
};
