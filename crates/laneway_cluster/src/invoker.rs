//! Cluster invokers.
//!
//! An invoker drives one invocation against a cluster. Every invoker shares
//! the same gate and the same single-attempt routine:
//!
//! 1. `on_start`, then the readiness gate
//! 2. candidates: reuse a pinned list or route through the cluster
//! 3. endpoint selection through the context
//! 4. `on_forward`, `on_start_request`, dispatch
//! 5. success or failure hooks, in a fixed order
//!
//! Invokers never fail: whatever happens, the caller gets a response.

use async_trait::async_trait;
use laneway_core::Failure;
use laneway_policy::{ClusterPolicy, RoutingMode};
use laneway_resilience::{FactoryRegistry, RetrierFactory};
use std::sync::Arc;

use crate::cluster::LiveCluster;
use crate::context::{InvocationContext, RouteError};
use crate::endpoint::Endpoint;
use crate::failfast::FailfastInvoker;
use crate::failover::FailoverInvoker;
use crate::invocation::OutboundInvocation;
use crate::response::OutboundResponse;

/// Invocation strategy
#[async_trait]
pub trait ClusterInvoker: Send + Sync {
    /// Registered type name
    fn name(&self) -> &str;

    /// Run `invocation` against `cluster`
    ///
    /// `default_policy` applies when the invocation carries no policy of its
    /// own. The returned response carries either a reply or a failure.
    async fn execute(
        &self,
        cluster: &dyn LiveCluster,
        context: &dyn InvocationContext,
        invocation: &mut OutboundInvocation,
        default_policy: Option<Arc<ClusterPolicy>>,
    ) -> OutboundResponse;
}

/// Invokers keyed by type name
pub type InvokerRegistry = FactoryRegistry<dyn ClusterInvoker>;

/// Registry with `failfast` and `failover`, the latter retrying through `retriers`
#[must_use]
pub fn invoker_registry(retriers: Arc<dyn RetrierFactory>) -> InvokerRegistry {
    let mut registry = InvokerRegistry::new();
    registry.replace("failfast", Arc::new(FailfastInvoker));
    registry.replace("failover", Arc::new(FailoverInvoker::new(retriers)));
    registry
}

/// Outcome of one attempt
pub(crate) struct AttemptOutcome {
    /// Response to hand back if this is the last attempt
    pub response: OutboundResponse,
    /// Failure carried by the response, as normalized by the cluster
    pub failure: Option<Failure>,
}

/// Attach the default policy, fire `on_start` and apply the readiness gate
///
/// Returns the response to complete with when the gate refuses the call.
pub(crate) fn start(
    cluster: &dyn LiveCluster,
    context: &dyn InvocationContext,
    invocation: &mut OutboundInvocation,
    default_policy: Option<Arc<ClusterPolicy>>,
) -> Option<OutboundResponse> {
    invocation.set_default_policy(default_policy);
    let request = invocation.request();
    cluster.on_start(request);

    let status = context.app_status();
    if status.outbound() {
        return None;
    }
    let failure = cluster.create_unready_failure(status, request)?;
    tracing::warn!(
        service = %request.service,
        status = %status.status,
        "outbound call refused, application not ready"
    );
    Some(cluster.create_response(failure, request, None))
}

/// Run one routed, selected and dispatched attempt
pub(crate) async fn run_attempt(
    cluster: &dyn LiveCluster,
    context: &dyn InvocationContext,
    invocation: &mut OutboundInvocation,
) -> AttemptOutcome {
    let attempt = invocation.begin_attempt();

    let reuse = context.routing_mode(invocation) == RoutingMode::Reuse
        && !invocation.instances().is_empty();
    let candidates = if reuse {
        invocation.instances().to_vec()
    } else {
        match cluster.route(invocation.request()).await {
            Ok(candidates) => {
                invocation.set_instances(candidates.clone());
                candidates
            }
            Err(failure) => return fail(cluster, invocation, None, failure),
        }
    };
    if candidates.is_empty() {
        let failure = cluster.create_no_provider_failure(invocation.request());
        return fail(cluster, invocation, None, failure);
    }

    let untried: Vec<Endpoint> = invocation
        .untried(&candidates)
        .into_iter()
        .cloned()
        .collect();
    let endpoint = match context.route(invocation, &untried) {
        Ok(endpoint) => endpoint,
        Err(RouteError::Rejected(rejection)) => {
            tracing::warn!(
                service = %invocation.request().service,
                reason = %rejection,
                "outbound call rejected"
            );
            let failure = cluster.create_reject_failure(rejection, invocation.request());
            return fail(cluster, invocation, None, failure);
        }
        Err(RouteError::NoProvider { .. }) => {
            let failure = cluster.create_no_provider_failure(invocation.request());
            return fail(cluster, invocation, None, failure);
        }
        Err(RouteError::Failed(failure)) => return fail(cluster, invocation, None, failure),
    };

    tracing::debug!(
        service = %invocation.request().service,
        endpoint = %endpoint,
        attempt,
        "dispatching"
    );
    invocation.on_forward(&endpoint);
    cluster.on_start_request(invocation.request(), &endpoint);

    match cluster.invoke(invocation.request(), &endpoint).await {
        Ok(OutboundResponse::Success(reply)) => {
            succeed(cluster, invocation, &endpoint, OutboundResponse::Success(reply))
        }
        Ok(OutboundResponse::Failure(failure)) | Err(failure) => {
            fail(cluster, invocation, Some(&endpoint), failure)
        }
    }
}

fn succeed(
    cluster: &dyn LiveCluster,
    invocation: &mut OutboundInvocation,
    endpoint: &Endpoint,
    response: OutboundResponse,
) -> AttemptOutcome {
    invocation.on_success(endpoint, &response);
    cluster.on_success(&response, invocation.request(), endpoint);
    AttemptOutcome {
        response,
        failure: None,
    }
}

fn fail(
    cluster: &dyn LiveCluster,
    invocation: &mut OutboundInvocation,
    endpoint: Option<&Endpoint>,
    failure: Failure,
) -> AttemptOutcome {
    tracing::debug!(
        service = %invocation.request().service,
        kind = %failure.kind,
        message = %failure.message,
        "attempt failed"
    );
    invocation.on_failure(endpoint, &failure);
    let response = cluster.create_response(failure, invocation.request(), endpoint);
    let failure = response.failure().cloned();
    if let Some(failure) = &failure {
        cluster.on_error(failure, invocation.request(), endpoint);
    }
    AttemptOutcome { response, failure }
}
