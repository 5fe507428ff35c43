//! laneway cluster
//!
//! The cluster invocation engine. An outbound call becomes an
//! [`OutboundInvocation`]; an [`InvocationEngine`] picks a
//! [`ClusterInvoker`] for it, checks the readiness gate, routes through the
//! [`LiveCluster`], lets the [`InvocationContext`] apply admission, live
//! routing and load balancing, dispatches, and completes with exactly one
//! [`OutboundResponse`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod balance;
pub mod cluster;
pub mod context;
pub mod endpoint;
pub mod engine;
pub mod failfast;
pub mod failover;
pub mod invocation;
pub mod invoker;
pub mod request;
pub mod response;

#[cfg(test)]
mod testing;

// Re-exports
pub use balance::{LoadBalancer, RandomBalancer, RoundRobinBalancer};
pub use cluster::LiveCluster;
pub use context::{GovernanceContext, InvocationContext, RouteError, breaker_key};
pub use endpoint::{Endpoint, EndpointState};
pub use engine::InvocationEngine;
pub use failfast::FailfastInvoker;
pub use failover::FailoverInvoker;
pub use invocation::{InvocationListener, OutboundInvocation};
pub use invoker::{ClusterInvoker, InvokerRegistry, invoker_registry};
pub use request::OutboundRequest;
pub use response::{OutboundResponse, Reply};
