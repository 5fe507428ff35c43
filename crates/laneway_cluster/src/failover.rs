//! Failover invoker.
//!
//! Retries failed attempts under the invocation's retry policy. Each retry
//! reuses the routed candidate list and prefers endpoints that have not
//! failed yet. Once the budget is spent the invocation completes with the
//! last observed response.

use async_trait::async_trait;
use laneway_core::{Failure, FailureKind, RejectKind};
use laneway_policy::ClusterPolicy;
use laneway_resilience::{RetrierFactory, RetryWork};
use std::sync::Arc;

use crate::cluster::LiveCluster;
use crate::context::InvocationContext;
use crate::invocation::OutboundInvocation;
use crate::invoker::{ClusterInvoker, run_attempt, start};
use crate::response::OutboundResponse;

/// Retries attempts on other endpoints
pub struct FailoverInvoker {
    retriers: Arc<dyn RetrierFactory>,
}

impl FailoverInvoker {
    /// Invoker retrying through `retriers`
    #[must_use]
    pub fn new(retriers: Arc<dyn RetrierFactory>) -> Self {
        Self { retriers }
    }
}

struct FailoverWork<'a> {
    cluster: &'a dyn LiveCluster,
    context: &'a dyn InvocationContext,
    invocation: &'a mut OutboundInvocation,
    last: Option<OutboundResponse>,
}

#[async_trait]
impl<'a> RetryWork for FailoverWork<'a> {
    async fn attempt(&mut self, _attempt: u32) -> Result<(), Failure> {
        let outcome = run_attempt(self.cluster, self.context, self.invocation).await;
        self.last = Some(outcome.response);
        match outcome.failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn idempotent(&self) -> bool {
        self.invocation.request().idempotent
    }
}

#[async_trait]
impl ClusterInvoker for FailoverInvoker {
    fn name(&self) -> &str {
        "failover"
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

        let retrier = self
            .retriers
            .get(invocation.policy().and_then(|p| p.retry.as_ref()));
        let Some(retrier) = retrier else {
            return run_attempt(cluster, context, invocation).await.response;
        };

        let mut work = FailoverWork {
            cluster,
            context,
            invocation,
            last: None,
        };
        let outcome = retrier.execute(&mut work).await;
        let FailoverWork {
            invocation, last, ..
        } = work;
        tracing::debug!(
            service = %invocation.request().service,
            attempts = outcome.attempts,
            success = outcome.is_success(),
            "failover finished"
        );
        match last {
            Some(response) => response,
            None => {
                let request = invocation.request();
                tracing::warn!(service = %request.service, "retrier made no attempt");
                let failure = outcome.result.err().unwrap_or_else(|| {
                    Failure::new(
                        FailureKind::Rejected(RejectKind::Other),
                        format!("retrier made no attempt for {}", request.service),
                    )
                });
                cluster.create_response(failure, request, None)
            }
        }
    }
}
