//! Runs a batch of governed calls against a simulated cluster.

use futures::StreamExt;
use futures::stream;
use laneway_cluster::{InvocationEngine, OutboundInvocation, OutboundRequest};
use laneway_core::FailureKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cluster::{EndpointStats, SimCluster};
use crate::seed::SimSeed;

/// Run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of calls
    pub calls: u64,
    /// Request path
    pub path: String,
    /// Whether calls are marked idempotent
    pub idempotent: bool,
    /// Calls in flight at once
    pub concurrency: usize,
}

impl SimConfig {
    /// `calls` idempotent calls to `/`
    #[must_use]
    pub fn new(calls: u64) -> Self {
        Self {
            calls,
            path: "/".to_string(),
            idempotent: true,
            concurrency: 1,
        }
    }

    /// Set the request path
    #[must_use]
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// Mark calls non-idempotent
    #[must_use]
    pub fn non_idempotent(mut self) -> Self {
        self.idempotent = false;
        self
    }

    /// Keep up to `concurrency` calls in flight; at least one
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimSummary {
    /// Simulated service
    pub service: String,
    /// Cluster seed
    pub seed: SimSeed,
    /// Calls made
    pub calls: u64,
    /// Calls that completed with a reply
    pub successes: u64,
    /// Failed calls by failure kind
    pub failures: BTreeMap<String, u64>,
    /// Attempts across all calls
    pub attempts: u64,
    /// Dispatch counters per endpoint
    pub endpoints: BTreeMap<String, EndpointStats>,
}

impl SimSummary {
    /// Calls that completed with a failure
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failures.values().sum()
    }

    /// Pretty JSON rendering
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Drives calls through an engine, `concurrency` at a time
pub struct SimHarness {
    config: SimConfig,
}

impl SimHarness {
    /// Harness for a configuration
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    /// Make every call and summarize
    pub async fn run(&self, engine: &InvocationEngine, cluster: &SimCluster) -> SimSummary {
        let mut summary = SimSummary {
            service: cluster.service().to_string(),
            seed: cluster.seed().clone(),
            calls: self.config.calls,
            successes: 0,
            failures: BTreeMap::new(),
            attempts: 0,
            endpoints: BTreeMap::new(),
        };

        let outcomes: Vec<(u32, Option<FailureKind>)> = stream::iter(0..self.config.calls)
            .map(|_| self.call(engine, cluster))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        for (attempts, failure) in outcomes {
            summary.attempts += u64::from(attempts);
            match failure {
                None => summary.successes += 1,
                Some(kind) => *summary.failures.entry(kind.to_string()).or_default() += 1,
            }
        }

        summary.endpoints = cluster.stats();
        tracing::info!(
            service = %summary.service,
            calls = summary.calls,
            successes = summary.successes,
            attempts = summary.attempts,
            "simulation finished"
        );
        summary
    }

    async fn call(
        &self,
        engine: &InvocationEngine,
        cluster: &SimCluster,
    ) -> (u32, Option<FailureKind>) {
        let mut request = OutboundRequest::new(cluster.service(), &self.config.path);
        if !self.config.idempotent {
            request = request.non_idempotent();
        }
        let mut invocation = OutboundInvocation::new(request);
        let response = engine.execute(cluster, &mut invocation).await;
        (invocation.attempts(), response.failure().map(|f| f.kind))
    }
}
