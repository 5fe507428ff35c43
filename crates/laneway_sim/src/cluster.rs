//! Simulated cluster.
//!
//! Each endpoint answers according to its [`EndpointBehavior`], drawing from
//! its own RNG derived from the cluster seed, so one endpoint's outcomes do
//! not depend on how traffic was spread over the others.

use async_trait::async_trait;
use laneway_cluster::{Endpoint, LiveCluster, OutboundRequest, OutboundResponse};
use laneway_core::{DispatchKind, Failure, FailureKind};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::behavior::EndpointBehavior;
use crate::error::SimError;
use crate::seed::SimSeed;

/// Per-endpoint dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointStats {
    /// Dispatches received
    pub invocations: u64,
    /// Dispatches answered successfully
    pub successes: u64,
    /// Dispatches that failed
    pub failures: u64,
}

/// Cluster hook observed during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SimHook {
    /// `on_start`
    Start,
    /// `route`
    Route,
    /// `on_start_request`
    StartRequest,
    /// `on_success`
    Success,
    /// `on_error`
    Error,
}

/// One recorded hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimEvent {
    /// Hook that fired
    pub hook: SimHook,
    /// Request the hook fired for
    pub request: String,
    /// Endpoint involved, if any
    pub endpoint: Option<String>,
    /// Failure kind, for `Error`
    pub failure: Option<FailureKind>,
}

struct SimNode {
    behavior: EndpointBehavior,
    rng: Mutex<ChaCha8Rng>,
    stats: Mutex<EndpointStats>,
}

/// In-process cluster for one service
pub struct SimCluster {
    service: String,
    seed: SimSeed,
    endpoints: Vec<Endpoint>,
    nodes: HashMap<String, SimNode>,
    events: Mutex<Vec<SimEvent>>,
    record_events: bool,
}

impl SimCluster {
    /// Empty cluster for `service`
    #[must_use]
    pub fn new(service: &str, seed: SimSeed) -> Self {
        Self {
            service: service.to_string(),
            seed,
            endpoints: Vec::new(),
            nodes: HashMap::new(),
            events: Mutex::new(Vec::new()),
            record_events: true,
        }
    }

    /// Cluster of `count` endpoints sharing one behavior
    ///
    /// Endpoints are named `<service>-<n>`.
    ///
    /// # Errors
    ///
    /// Returns error if the behavior is invalid
    pub fn uniform(
        service: &str,
        count: u16,
        behavior: &EndpointBehavior,
        seed: SimSeed,
    ) -> Result<Self, SimError> {
        let mut cluster = Self::new(service, seed);
        for n in 0..count {
            let endpoint = Endpoint::new(
                &format!("{}-{}", service, n),
                &format!("10.0.{}.{}", n / 256, n % 256),
                8080,
            );
            cluster.add_endpoint(endpoint, behavior.clone())?;
        }
        Ok(cluster)
    }

    /// Stop recording hook events
    #[must_use]
    pub fn without_events(mut self) -> Self {
        self.record_events = false;
        self
    }

    /// Add an endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the behavior is invalid or the id is taken
    pub fn add_endpoint(
        &mut self,
        endpoint: Endpoint,
        behavior: EndpointBehavior,
    ) -> Result<(), SimError> {
        behavior.validate(&endpoint.id)?;
        if self.nodes.contains_key(&endpoint.id) {
            return Err(SimError::DuplicateEndpoint(endpoint.id));
        }
        let node = SimNode {
            behavior,
            rng: Mutex::new(self.seed.derive(&endpoint.id).rng()),
            stats: Mutex::default(),
        };
        self.nodes.insert(endpoint.id.clone(), node);
        self.endpoints.push(endpoint);
        Ok(())
    }

    /// Simulated service
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Seed the cluster was built with
    #[must_use]
    pub fn seed(&self) -> &SimSeed {
        &self.seed
    }

    /// Endpoints in registration order
    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Counters per endpoint id
    #[must_use]
    pub fn stats(&self) -> BTreeMap<String, EndpointStats> {
        self.nodes
            .iter()
            .map(|(id, node)| {
                let stats = *node.stats.lock().unwrap_or_else(PoisonError::into_inner);
                (id.clone(), stats)
            })
            .collect()
    }

    /// Dispatches across all endpoints
    #[must_use]
    pub fn invocations(&self) -> u64 {
        self.stats().values().map(|s| s.invocations).sum()
    }

    /// Recorded hooks, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<SimEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(
        &self,
        hook: SimHook,
        request: &OutboundRequest,
        endpoint: Option<&Endpoint>,
        failure: Option<FailureKind>,
    ) {
        if !self.record_events {
            return;
        }
        let event = SimEvent {
            hook,
            request: request.id.to_string(),
            endpoint: endpoint.map(|e| e.id.clone()),
            failure,
        };
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[async_trait]
impl LiveCluster for SimCluster {
    fn on_start(&self, request: &OutboundRequest) {
        self.record(SimHook::Start, request, None, None);
    }

    async fn route(&self, request: &OutboundRequest) -> Result<Vec<Endpoint>, Failure> {
        self.record(SimHook::Route, request, None, None);
        if request.service != self.service {
            return Ok(Vec::new());
        }
        Ok(self.endpoints.clone())
    }

    async fn invoke(
        &self,
        request: &OutboundRequest,
        endpoint: &Endpoint,
    ) -> Result<OutboundResponse, Failure> {
        let Some(node) = self.nodes.get(&endpoint.id) else {
            return Err(Failure::dispatch(
                DispatchKind::Connect,
                format!("unknown endpoint {}", endpoint),
            ));
        };
        if node.behavior.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(node.behavior.latency_ms)).await;
        }

        let outcome = {
            let mut rng = node.rng.lock().unwrap_or_else(PoisonError::into_inner);
            node.behavior.outcome(&mut rng, endpoint)
        };
        let failed = !matches!(outcome, Ok(OutboundResponse::Success(_)));
        {
            let mut stats = node.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.invocations += 1;
            if failed {
                stats.failures += 1;
            } else {
                stats.successes += 1;
            }
        }
        tracing::trace!(
            request = %request.id,
            endpoint = %endpoint,
            failed,
            "simulated dispatch"
        );
        outcome
    }

    fn on_start_request(&self, request: &OutboundRequest, endpoint: &Endpoint) {
        self.record(SimHook::StartRequest, request, Some(endpoint), None);
    }

    fn on_success(
        &self,
        _response: &OutboundResponse,
        request: &OutboundRequest,
        endpoint: &Endpoint,
    ) {
        self.record(SimHook::Success, request, Some(endpoint), None);
    }

    fn on_error(
        &self,
        failure: &Failure,
        request: &OutboundRequest,
        endpoint: Option<&Endpoint>,
    ) {
        self.record(SimHook::Error, request, endpoint, Some(failure.kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laneway_cluster::{ClusterInvoker, FailfastInvoker, GovernanceContext, OutboundInvocation};
    use laneway_core::{AppState, SystemClock};
    use laneway_policy::GovernanceConfig;
    use std::sync::Arc;

    fn context() -> GovernanceContext {
        GovernanceContext::new(
            Arc::new(AppState::dynamic()),
            &GovernanceConfig::default(),
            Arc::new(SystemClock),
        )
        .unwrap()
    }

    #[test]
    fn test_uniform_endpoints() {
        let cluster =
            SimCluster::uniform("order", 3, &EndpointBehavior::healthy(), SimSeed::default())
                .unwrap();
        let ids: Vec<&str> = cluster.endpoints().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["order-0", "order-1", "order-2"]);
        assert_eq!(cluster.service(), "order");
    }

    #[test]
    fn test_duplicate_endpoint_rejected() {
        let mut cluster = SimCluster::new("order", SimSeed::default());
        let endpoint = Endpoint::new("a", "h", 1);
        cluster
            .add_endpoint(endpoint.clone(), EndpointBehavior::healthy())
            .unwrap();
        assert_eq!(
            cluster.add_endpoint(endpoint, EndpointBehavior::healthy()),
            Err(SimError::DuplicateEndpoint("a".to_string()))
        );
    }

    #[tokio::test]
    async fn test_route_unknown_service_is_empty() {
        let cluster =
            SimCluster::uniform("order", 2, &EndpointBehavior::healthy(), SimSeed::default())
                .unwrap();
        let routed = cluster.route(&OutboundRequest::new("stock", "/")).await.unwrap();
        assert!(routed.is_empty());
    }

    #[tokio::test]
    async fn test_same_seed_same_outcomes() {
        let run = |seed| async move {
            let behavior = EndpointBehavior::failing(0.4);
            let cluster =
                SimCluster::uniform("order", 3, &behavior, SimSeed::from_literal(seed)).unwrap();
            let request = OutboundRequest::new("order", "/");
            let mut outcomes = Vec::new();
            for n in 0..30 {
                let endpoint = &cluster.endpoints()[n % 3];
                outcomes.push(cluster.invoke(&request, endpoint).await.is_ok());
            }
            (outcomes, cluster.stats())
        };
        assert_eq!(run(11).await, run(11).await);
    }

    #[tokio::test]
    async fn test_stats_counted() {
        let mut cluster = SimCluster::new("order", SimSeed::default());
        cluster
            .add_endpoint(Endpoint::new("ok", "h", 1), EndpointBehavior::healthy())
            .unwrap();
        cluster
            .add_endpoint(Endpoint::new("bad", "h", 2), EndpointBehavior::failing(1.0))
            .unwrap();
        let request = OutboundRequest::new("order", "/");
        for endpoint in cluster.endpoints().to_vec() {
            let _ = cluster.invoke(&request, &endpoint).await;
        }
        let stats = cluster.stats();
        assert_eq!(stats["ok"].successes, 1);
        assert_eq!(stats["bad"].failures, 1);
        assert_eq!(cluster.invocations(), 2);
    }

    #[tokio::test]
    async fn test_hooks_recorded_through_invoker() {
        let cluster =
            SimCluster::uniform("order", 1, &EndpointBehavior::failing(1.0), SimSeed::default())
                .unwrap();
        let mut invocation = OutboundInvocation::new(OutboundRequest::new("order", "/"));
        let response = FailfastInvoker
            .execute(&cluster, &context(), &mut invocation, None)
            .await;
        assert!(!response.is_success());

        let hooks: Vec<SimHook> = cluster.events().iter().map(|e| e.hook).collect();
        assert_eq!(
            hooks,
            vec![SimHook::Start, SimHook::Route, SimHook::StartRequest, SimHook::Error]
        );
        let error = cluster.events().pop().unwrap();
        assert_eq!(error.endpoint.as_deref(), Some("order-0"));
        assert_eq!(error.failure, Some(FailureKind::Dispatch(DispatchKind::Connect)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_simulated() {
        let behavior = EndpointBehavior::healthy().with_latency(250);
        let cluster = SimCluster::uniform("order", 1, &behavior, SimSeed::default()).unwrap();
        let started = tokio::time::Instant::now();
        cluster
            .invoke(&OutboundRequest::new("order", "/"), &cluster.endpoints()[0])
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
