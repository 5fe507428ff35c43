//! laneway policy
//!
//! Immutable per-service cluster policies, the governance configuration
//! that selects resilience strategies, and the store that publishes policy
//! snapshots to concurrent readers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod breaker;
pub mod cluster;
pub mod config;
pub mod error;
pub mod limit;
pub mod retry;
pub mod route;
pub mod store;

pub use breaker::CircuitBreakerPolicy;
pub use cluster::ClusterPolicy;
pub use config::{
    CircuitBreakerConfig, ConfigError, GovernanceConfig, RateLimiterConfig, RetryConfig,
    RoutingConfig,
};
pub use error::PolicyError;
pub use limit::RateLimitPolicy;
pub use retry::RetryPolicy;
pub use route::{RoutingMetadata, RoutingMode};
pub use store::{PolicySnapshot, PolicyStore};
