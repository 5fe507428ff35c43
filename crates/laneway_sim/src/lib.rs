//! laneway simulation
//!
//! Seeded, in-process clusters for driving the invocation engine without a
//! network. Every run is reproducible from its seed.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod behavior;
pub mod cluster;
pub mod error;
pub mod harness;
pub mod seed;

pub use behavior::EndpointBehavior;
pub use cluster::{EndpointStats, SimCluster, SimEvent, SimHook};
pub use error::SimError;
pub use harness::{SimConfig, SimHarness, SimSummary};
pub use seed::{SeedSource, SimSeed};
