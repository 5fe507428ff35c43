//! Invocation engine.
//!
//! Entry point for governed outbound calls: looks up the service policy in
//! the store, picks the invoker it names (or the configured default), and
//! runs the invocation through the shared context.

use laneway_core::{AppState, Clock};
use laneway_policy::{ClusterPolicy, GovernanceConfig, PolicyStore};
use laneway_resilience::{RegistryError, retrier_registry};
use std::sync::Arc;

use crate::cluster::LiveCluster;
use crate::context::{GovernanceContext, InvocationContext};
use crate::invocation::OutboundInvocation;
use crate::invoker::{ClusterInvoker, InvokerRegistry, invoker_registry};
use crate::request::OutboundRequest;
use crate::response::OutboundResponse;

/// Runs governed invocations
pub struct InvocationEngine {
    invokers: InvokerRegistry,
    default_invoker: Arc<dyn ClusterInvoker>,
    policies: Arc<PolicyStore>,
    context: Arc<dyn InvocationContext>,
}

impl InvocationEngine {
    /// Engine with a [`GovernanceContext`] built from `config`
    ///
    /// # Errors
    ///
    /// Returns error if `config` names an unregistered invoker, retrier,
    /// limiter or breaker type
    pub fn new(
        config: &GovernanceConfig,
        app: Arc<AppState>,
        policies: Arc<PolicyStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RegistryError> {
        let context = GovernanceContext::new(app, config, clock)?;
        Self::with_context(config, policies, Arc::new(context))
    }

    /// Engine with a caller-supplied context
    ///
    /// # Errors
    ///
    /// Returns error if `config` names an unregistered invoker or retrier type
    pub fn with_context(
        config: &GovernanceConfig,
        policies: Arc<PolicyStore>,
        context: Arc<dyn InvocationContext>,
    ) -> Result<Self, RegistryError> {
        let retriers = retrier_registry().require(&config.retry.retry_type)?;
        let invokers = invoker_registry(retriers);
        let default_invoker = invokers.require(&config.invoker)?;
        tracing::info!(
            invoker = %config.invoker,
            retry = %config.retry.retry_type,
            "invocation engine ready"
        );
        Ok(Self {
            invokers,
            default_invoker,
            policies,
            context,
        })
    }

    /// Policy store consulted for every call
    #[must_use]
    pub fn policies(&self) -> &Arc<PolicyStore> {
        &self.policies
    }

    /// Invoker for a policy
    ///
    /// Unknown invoker names fall back to the default.
    #[must_use]
    pub fn invoker_for(&self, policy: Option<&ClusterPolicy>) -> Arc<dyn ClusterInvoker> {
        let Some(name) = policy.and_then(|p| p.invoker.as_deref()) else {
            return Arc::clone(&self.default_invoker);
        };
        self.invokers.get(name).unwrap_or_else(|| {
            tracing::warn!(
                invoker = name,
                fallback = self.default_invoker.name(),
                "unknown invoker, using default"
            );
            Arc::clone(&self.default_invoker)
        })
    }

    /// Run a request as a fresh invocation
    pub async fn call(
        &self,
        cluster: &dyn LiveCluster,
        request: OutboundRequest,
    ) -> OutboundResponse {
        let mut invocation = OutboundInvocation::new(request);
        self.execute(cluster, &mut invocation).await
    }

    /// Run a prepared invocation
    ///
    /// The stored policy for the request's service applies when the
    /// invocation carries none.
    pub async fn execute(
        &self,
        cluster: &dyn LiveCluster,
        invocation: &mut OutboundInvocation,
    ) -> OutboundResponse {
        let default_policy = self.policies.get(&invocation.request().service);
        let invoker = {
            let policy = invocation.policy().or(default_policy.as_ref());
            self.invoker_for(policy.map(Arc::as_ref))
        };
        invoker
            .execute(cluster, self.context.as_ref(), invocation, default_policy)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laneway_core::{DispatchKind, Failure, FailureKind, ManualClock, RejectKind};
    use laneway_policy::{RateLimitPolicy, RetryPolicy};

    use crate::testing::{RecordingCluster, ScriptedContext, endpoints};

    fn engine(config: &GovernanceConfig, policies: Vec<ClusterPolicy>) -> InvocationEngine {
        let store = Arc::new(PolicyStore::new());
        for policy in policies {
            store.update_service(policy).unwrap();
        }
        InvocationEngine::with_context(config, store, Arc::new(ScriptedContext::ready())).unwrap()
    }

    fn refused() -> Failure {
        Failure::dispatch(DispatchKind::Connect, "refused")
    }

    #[tokio::test]
    async fn test_default_invoker_from_config() {
        let engine = engine(&GovernanceConfig::default().with_invoker("failfast"), Vec::new());
        assert_eq!(engine.invoker_for(None).name(), "failfast");

        let cluster = RecordingCluster::new(endpoints(2)).with_script(vec![Err(refused())]);
        let response = engine.call(&cluster, cluster.request()).await;
        assert_eq!(response.failure(), Some(&refused()));
        assert_eq!(cluster.invokes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_selects_invoker_and_retry() {
        let policy = ClusterPolicy::new("order")
            .with_invoker("failover")
            .with_retry(RetryPolicy::with_max_attempts(2));
        let engine = engine(&GovernanceConfig::default().with_invoker("failfast"), vec![policy]);

        let cluster = RecordingCluster::new(endpoints(2)).with_script(vec![Err(refused())]);
        let response = engine.call(&cluster, cluster.request()).await;
        assert!(response.is_success());
        assert_eq!(cluster.invokes(), 2);
    }

    #[tokio::test]
    async fn test_unknown_policy_invoker_falls_back() {
        let engine = engine(&GovernanceConfig::default().with_invoker("failfast"), Vec::new());
        let policy = ClusterPolicy::new("order").with_invoker("broadcast");
        assert_eq!(engine.invoker_for(Some(&policy)).name(), "failfast");
    }

    #[test]
    fn test_unknown_config_invoker_rejected() {
        let result = InvocationEngine::with_context(
            &GovernanceConfig::default().with_invoker("broadcast"),
            Arc::new(PolicyStore::new()),
            Arc::new(ScriptedContext::ready()),
        );
        assert!(matches!(result, Err(RegistryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_invocation_policy_wins_over_store() {
        let stored = ClusterPolicy::new("order").with_invoker("failover");
        let engine = engine(&GovernanceConfig::default(), vec![stored]);
        let cluster = RecordingCluster::new(endpoints(1));
        let explicit = Arc::new(ClusterPolicy::new("order").with_version(42));
        let mut invocation = cluster.invocation().with_policy(explicit);

        engine.execute(&cluster, &mut invocation).await;
        assert_eq!(invocation.policy().map(|p| p.version), Some(42));
    }

    #[tokio::test]
    async fn test_governed_rate_limit_rejects_through_cluster() {
        let app = Arc::new(AppState::dynamic());
        app.on_policy_ready();
        let store = Arc::new(PolicyStore::new());
        store
            .update_service(
                ClusterPolicy::new("order").with_rate_limit(RateLimitPolicy::new(1, 60_000)),
            )
            .unwrap();
        let engine = InvocationEngine::new(
            &GovernanceConfig::default().with_invoker("failfast"),
            app,
            store,
            Arc::new(ManualClock::new(0)),
        )
        .unwrap();
        let cluster = RecordingCluster::new(endpoints(1));

        assert!(engine.call(&cluster, cluster.request()).await.is_success());
        let response = engine.call(&cluster, cluster.request()).await;
        assert_eq!(
            response.failure().map(|f| f.kind),
            Some(FailureKind::Rejected(RejectKind::RateLimited))
        );
        assert_eq!(cluster.invokes(), 1);
        assert!(
            cluster
                .events()
                .contains(&"cluster.createRejectFailure".to_string())
        );
    }

    #[tokio::test]
    async fn test_ungoverned_app_ignores_stored_policy() {
        let app = Arc::new(AppState::dynamic());
        let store = Arc::new(PolicyStore::new());
        store
            .update_service(
                ClusterPolicy::new("order").with_rate_limit(RateLimitPolicy::new(1, 60_000)),
            )
            .unwrap();
        let engine = InvocationEngine::new(
            &GovernanceConfig::default(),
            app,
            store,
            Arc::new(ManualClock::new(0)),
        )
        .unwrap();
        let cluster = RecordingCluster::new(endpoints(1));

        for _ in 0..3 {
            assert!(engine.call(&cluster, cluster.request()).await.is_success());
        }
    }

    #[tokio::test]
    async fn test_static_app_refuses_until_started() {
        let app = Arc::new(AppState::r#static());
        let engine = InvocationEngine::new(
            &GovernanceConfig::default(),
            Arc::clone(&app),
            Arc::new(PolicyStore::new()),
            Arc::new(ManualClock::new(0)),
        )
        .unwrap();
        let cluster = RecordingCluster::new(endpoints(1));

        let response = engine.call(&cluster, cluster.request()).await;
        assert_eq!(response.failure().map(|f| f.kind), Some(FailureKind::Unready));

        app.on_started().unwrap();
        assert!(engine.call(&cluster, cluster.request()).await.is_success());
    }
}
