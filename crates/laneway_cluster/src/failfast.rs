//! Fail-fast invoker: one attempt, no retry.

use async_trait::async_trait;
use laneway_policy::ClusterPolicy;
use std::sync::Arc;

use crate::cluster::LiveCluster;
use crate::context::InvocationContext;
use crate::invocation::OutboundInvocation;
use crate::invoker::{ClusterInvoker, run_attempt, start};
use crate::response::OutboundResponse;

/// Makes exactly one attempt and completes with its outcome
#[derive(Debug, Clone, Copy, Default)]
pub struct FailfastInvoker;

#[async_trait]
impl ClusterInvoker for FailfastInvoker {
    fn name(&self) -> &str {
        "failfast"
    }

    async fn execute(
        &self,
        cluster: &dyn LiveCluster,
        context: &dyn InvocationContext,
        invocation: &mut OutboundInvocation,
        default_policy: Option<Arc<ClusterPolicy>>,
    ) -> OutboundResponse {
        if let Some(response) = start(cluster, context, invocation, default_policy) {
            return response;
        }
        run_attempt(cluster, context, invocation).await.response
    }
}
