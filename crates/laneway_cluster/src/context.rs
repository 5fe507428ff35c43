//! Invocation context.
//!
//! The context is the engine-facing half of an invocation: it reports the
//! readiness gate and picks exactly one endpoint from the candidates. The
//! governance context applies admission, live routing, load balancing and
//! circuit breaking while policies are enforced, and plain load balancing
//! otherwise.

use laneway_core::{AppState, AppStatusView, Clock, Failure, FailureKind, RejectKind, Rejection};
use laneway_policy::{
    CircuitBreakerPolicy, ClusterPolicy, GovernanceConfig, RoutingMetadata, RoutingMode,
};
use laneway_resilience::{CircuitBreaker, CircuitBreakerBank, RateLimiterBank, RegistryError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;

use crate::balance::{LoadBalancer, RoundRobinBalancer};
use crate::endpoint::Endpoint;
use crate::invocation::{InvocationListener, OutboundInvocation};
use crate::request::OutboundRequest;
use crate::response::OutboundResponse;

/// Why endpoint selection produced no endpoint
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// Admission denied before dispatch
    #[error("Rejected: {0}")]
    Rejected(Rejection),

    /// No candidate survived selection
    #[error("No provider available for {service}")]
    NoProvider {
        /// Target service
        service: String,
    },

    /// Selection failed for another reason
    #[error("Routing failed: {0}")]
    Failed(Failure),
}

/// Readiness and endpoint selection for invocations
pub trait InvocationContext: Send + Sync {
    /// Current readiness gate
    fn app_status(&self) -> AppStatusView;

    /// Whether a pinned candidate list is reused or routing runs again
    fn routing_mode(&self, invocation: &OutboundInvocation) -> RoutingMode {
        invocation
            .policy()
            .and_then(|p| p.routing.mode)
            .unwrap_or_default()
    }

    /// Pick exactly one endpoint from `candidates`
    ///
    /// # Errors
    ///
    /// Returns error if the call is rejected or no candidate qualifies
    fn route(
        &self,
        invocation: &mut OutboundInvocation,
        candidates: &[Endpoint],
    ) -> Result<Endpoint, RouteError>;
}

/// Key under which a breaker is kept for one endpoint of a service
#[must_use]
pub fn breaker_key(request: &OutboundRequest, endpoint: &Endpoint) -> String {
    format!("{}@{}", request.service, endpoint.id)
}

/// Reports one admitted attempt back to its breaker
///
/// Exactly one of `on_success`, `on_error` or `release` reaches the breaker.
/// An attempt dropped before it reports releases its admission.
struct BreakerListener {
    breaker: Arc<dyn CircuitBreaker>,
    settled: AtomicBool,
}

impl BreakerListener {
    fn new(breaker: Arc<dyn CircuitBreaker>) -> Self {
        Self {
            breaker,
            settled: AtomicBool::new(false),
        }
    }

    fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::AcqRel)
    }
}

impl InvocationListener for BreakerListener {
    fn on_success(&self, _: &OutboundRequest, _: &Endpoint, _: &OutboundResponse) {
        if self.settle() {
            self.breaker.on_success();
        }
    }

    fn on_failure(&self, _: &OutboundRequest, _: Option<&Endpoint>, failure: &Failure) {
        if !self.settle() {
            return;
        }
        if failure.is_dispatch() || failure.kind == FailureKind::Application {
            self.breaker.on_error();
        } else {
            self.breaker.release();
        }
    }
}

impl Drop for BreakerListener {
    fn drop(&mut self) {
        if self.settle() {
            self.breaker.release();
        }
    }
}

/// Policy-driven context
pub struct GovernanceContext {
    app: Arc<AppState>,
    routing_mode: RoutingMode,
    limiters: RateLimiterBank,
    breakers: CircuitBreakerBank,
    balancer: Arc<dyn LoadBalancer>,
}

impl GovernanceContext {
    /// Context with the built-in limiters and breakers and round-robin balancing
    ///
    /// # Errors
    ///
    /// Returns error if the configured limiter or breaker type is unknown
    pub fn new(
        app: Arc<AppState>,
        config: &GovernanceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            app,
            routing_mode: config.routing.mode,
            limiters: RateLimiterBank::with_defaults(&config.rate_limiter, Arc::clone(&clock))?,
            breakers: CircuitBreakerBank::with_defaults(&config.circuit_breaker, clock)?,
            balancer: Arc::new(RoundRobinBalancer::new()),
        })
    }

    /// Replace the load balancer
    #[must_use]
    pub fn with_balancer(mut self, balancer: Arc<dyn LoadBalancer>) -> Self {
        self.balancer = balancer;
        self
    }

    /// Keyed rate limiter state
    #[must_use]
    pub fn limiters(&self) -> &RateLimiterBank {
        &self.limiters
    }

    /// Keyed circuit breaker state
    #[must_use]
    pub fn breakers(&self) -> &CircuitBreakerBank {
        &self.breakers
    }

    /// Start background sweeps of idle limiter and breaker state
    ///
    /// Without them, idle state is still evicted lazily on access.
    pub fn spawn_sweepers(&self) -> Vec<JoinHandle<()>> {
        vec![self.limiters.spawn_sweeper(), self.breakers.spawn_sweeper()]
    }

    fn admit(
        &self,
        invocation: &OutboundInvocation,
        policy: &ClusterPolicy,
        breaker_policy: &CircuitBreakerPolicy,
        mut remaining: Vec<&Endpoint>,
    ) -> Result<(Endpoint, BreakerListener), RouteError> {
        while let Some(endpoint) = self.balancer.select(invocation.request(), &remaining) {
            let key = breaker_key(invocation.request(), endpoint);
            let breaker = self.breakers.breaker(&key, breaker_policy, policy.version);
            if breaker.try_acquire() {
                return Ok((endpoint.clone(), BreakerListener::new(breaker)));
            }
            tracing::debug!(endpoint = %endpoint, "circuit open, skipping endpoint");
            remaining.retain(|e| e.id != endpoint.id);
        }
        Err(RouteError::Rejected(Rejection::new(
            RejectKind::CircuitOpen,
            format!("circuit open for every endpoint of {}", policy.service),
        )))
    }
}

impl InvocationContext for GovernanceContext {
    fn app_status(&self) -> AppStatusView {
        self.app.view()
    }

    fn routing_mode(&self, invocation: &OutboundInvocation) -> RoutingMode {
        invocation
            .policy()
            .and_then(|p| p.routing.mode)
            .unwrap_or(self.routing_mode)
    }

    fn route(
        &self,
        invocation: &mut OutboundInvocation,
        candidates: &[Endpoint],
    ) -> Result<Endpoint, RouteError> {
        let no_provider = |invocation: &OutboundInvocation| RouteError::NoProvider {
            service: invocation.request().service.clone(),
        };
        let accessible: Vec<&Endpoint> = candidates.iter().filter(|e| e.is_accessible()).collect();
        if accessible.is_empty() {
            return Err(no_provider(invocation));
        }

        // Ungoverned traffic only needs an endpoint.
        let policy = match invocation.policy() {
            Some(policy) if self.app.view().governed() => Arc::clone(policy),
            _ => {
                return self
                    .balancer
                    .select(invocation.request(), &accessible)
                    .cloned()
                    .ok_or_else(|| no_provider(invocation));
            }
        };

        let located =
            locate(&policy.routing, accessible).ok_or_else(|| no_provider(invocation))?;

        let (endpoint, listener) = match &policy.circuit_breaker {
            Some(breaker_policy) => {
                let (endpoint, listener) =
                    self.admit(invocation, &policy, breaker_policy, located)?;
                (endpoint, Some(listener))
            }
            None => {
                let endpoint = self
                    .balancer
                    .select(invocation.request(), &located)
                    .cloned()
                    .ok_or_else(|| no_provider(invocation))?;
                (endpoint, None)
            }
        };

        // Permits are spent only on calls that can be dispatched. A rejected
        // call drops the listener, which releases the breaker admission.
        if let Some(limit) = &policy.rate_limit {
            let key = invocation.request().limit_key();
            self.limiters
                .try_acquire(&key, limit, policy.version)
                .map_err(RouteError::Rejected)?;
        }

        if let Some(listener) = listener {
            invocation.add_attempt_listener(Arc::new(listener));
        }
        Ok(endpoint)
    }
}

/// Narrow candidates to the preferred unit, then cell, then lane
fn locate<'a>(
    routing: &RoutingMetadata,
    candidates: Vec<&'a Endpoint>,
) -> Option<Vec<&'a Endpoint>> {
    let candidates = narrow(candidates, routing.unit.as_deref(), Endpoint::unit, routing.fallback)?;
    let candidates = narrow(candidates, routing.cell.as_deref(), Endpoint::cell, routing.fallback)?;
    narrow(candidates, routing.lane.as_deref(), Endpoint::lane, routing.fallback)
}

fn narrow<'a>(
    candidates: Vec<&'a Endpoint>,
    wanted: Option<&str>,
    label: fn(&Endpoint) -> Option<&str>,
    fallback: bool,
) -> Option<Vec<&'a Endpoint>> {
    let Some(wanted) = wanted else {
        return Some(candidates);
    };
    let matched: Vec<&Endpoint> = candidates
        .iter()
        .copied()
        .filter(|e| label(e) == Some(wanted))
        .collect();
    if !matched.is_empty() {
        Some(matched)
    } else if fallback {
        Some(candidates)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laneway_core::labels::{LABEL_CELL, LABEL_LANE, LABEL_UNIT};
    use laneway_core::{DispatchKind, ManualClock};
    use laneway_policy::{CircuitBreakerConfig, RateLimitPolicy};
    use laneway_resilience::CircuitState;

    use crate::endpoint::EndpointState;
    use crate::response::Reply;

    fn governed_app() -> Arc<AppState> {
        let app = AppState::dynamic();
        app.on_policy_ready();
        Arc::new(app)
    }

    fn context(app: Arc<AppState>) -> GovernanceContext {
        GovernanceContext::new(
            app,
            &GovernanceConfig::default(),
            Arc::new(ManualClock::new(0)),
        )
        .unwrap()
    }

    fn clocked(app: Arc<AppState>) -> (GovernanceContext, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let context = GovernanceContext::new(
            app,
            &GovernanceConfig::default(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap();
        (context, clock)
    }

    fn single_trial() -> CircuitBreakerPolicy {
        CircuitBreakerPolicy::default()
            .with_threshold(50.0, 2, 2)
            .with_wait_in_open(1_000)
            .with_half_open_calls(1)
    }

    fn trip(context: &GovernanceContext, breaker_policy: &CircuitBreakerPolicy, id: &str) {
        let request = OutboundRequest::new("order", "/create");
        let breaker = context.breakers().breaker(
            &breaker_key(&request, &Endpoint::new(id, "h", 1)),
            breaker_policy,
            0,
        );
        breaker.on_error();
        breaker.on_error();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    fn endpoints() -> Vec<Endpoint> {
        vec![
            Endpoint::new("a", "h", 1)
                .with_label(LABEL_UNIT, "u1")
                .with_label(LABEL_CELL, "c1")
                .with_label(LABEL_LANE, "base"),
            Endpoint::new("b", "h", 2)
                .with_label(LABEL_UNIT, "u2")
                .with_label(LABEL_CELL, "c2")
                .with_label(LABEL_LANE, "beta"),
        ]
    }

    fn call_with(policy: ClusterPolicy) -> OutboundInvocation {
        OutboundInvocation::new(OutboundRequest::new("order", "/create")).with_policy(Arc::new(policy))
    }

    #[test]
    fn test_ungoverned_ignores_policy() {
        let context = context(Arc::new(AppState::dynamic()));
        let policy = ClusterPolicy::new("order").with_rate_limit(RateLimitPolicy::new(0, 1_000));
        let mut invocation = call_with(policy);
        assert!(context.route(&mut invocation, &endpoints()).is_ok());
        assert!(context.limiters().is_empty());
    }

    #[test]
    fn test_rate_limit_rejects() {
        let context = context(governed_app());
        let policy = ClusterPolicy::new("order").with_rate_limit(RateLimitPolicy::new(1, 1_000));
        let mut invocation = call_with(policy);
        assert!(context.route(&mut invocation, &endpoints()).is_ok());
        let err = context.route(&mut invocation, &endpoints()).unwrap_err();
        assert!(matches!(
            err,
            RouteError::Rejected(Rejection {
                kind: RejectKind::RateLimited,
                ..
            })
        ));
    }

    #[test]
    fn test_live_routing_prefers_lane() {
        let context = context(governed_app());
        let policy =
            ClusterPolicy::new("order").with_routing(RoutingMetadata::default().with_lane("beta"));
        let mut invocation = call_with(policy);
        for _ in 0..4 {
            assert_eq!(context.route(&mut invocation, &endpoints()).unwrap().id, "b");
        }
    }

    #[test]
    fn test_live_routing_fallback_and_strict() {
        let context = context(governed_app());
        let routing = RoutingMetadata::default().with_unit("u9");

        let mut invocation = call_with(ClusterPolicy::new("order").with_routing(routing.clone()));
        assert!(context.route(&mut invocation, &endpoints()).is_ok());

        let mut invocation = call_with(ClusterPolicy::new("order").with_routing(routing.strict()));
        let err = context.route(&mut invocation, &endpoints()).unwrap_err();
        assert_eq!(
            err,
            RouteError::NoProvider {
                service: "order".to_string()
            }
        );
    }

    #[test]
    fn test_unit_then_cell_narrowing() {
        let context = context(governed_app());
        let routing = RoutingMetadata::default().with_unit("u1").with_cell("c2");
        let mut invocation = call_with(ClusterPolicy::new("order").with_routing(routing));
        // cell c2 is not in unit u1, so the cell preference falls back
        assert_eq!(context.route(&mut invocation, &endpoints()).unwrap().id, "a");
    }

    #[test]
    fn test_inaccessible_endpoints_skipped() {
        let context = context(Arc::new(AppState::dynamic()));
        let mut invocation = call_with(ClusterPolicy::new("order"));
        let mut candidates = endpoints();
        candidates[0].state = EndpointState::Suspended;
        for _ in 0..3 {
            assert_eq!(context.route(&mut invocation, &candidates).unwrap().id, "b");
        }
        candidates[1].state = EndpointState::Closing;
        assert!(matches!(
            context.route(&mut invocation, &candidates),
            Err(RouteError::NoProvider { .. })
        ));
    }

    #[test]
    fn test_open_breaker_skips_endpoint() {
        let context = context(governed_app());
        let breaker_policy = CircuitBreakerPolicy::default().with_threshold(50.0, 2, 2);
        let policy = ClusterPolicy::new("order").with_circuit_breaker(breaker_policy.clone());
        let candidates = endpoints();

        let request = OutboundRequest::new("order", "/create");
        let breaker = context
            .breakers()
            .breaker(&breaker_key(&request, &candidates[0]), &breaker_policy, 0);
        breaker.on_error();
        breaker.on_error();

        let mut invocation = call_with(policy);
        for _ in 0..3 {
            assert_eq!(context.route(&mut invocation, &candidates).unwrap().id, "b");
        }

        let other = context
            .breakers()
            .breaker(&breaker_key(&request, &candidates[1]), &breaker_policy, 0);
        other.on_error();
        other.on_error();
        let err = context.route(&mut invocation, &candidates).unwrap_err();
        assert!(matches!(
            err,
            RouteError::Rejected(Rejection {
                kind: RejectKind::CircuitOpen,
                ..
            })
        ));
    }

    #[test]
    fn test_breaker_listener_feeds_outcomes() {
        let context = context(governed_app());
        let breaker_policy = CircuitBreakerPolicy::default().with_threshold(50.0, 2, 2);
        let policy = ClusterPolicy::new("order").with_circuit_breaker(breaker_policy.clone());
        let candidates = vec![Endpoint::new("a", "h", 1)];
        let mut invocation = call_with(policy);
        let failure = Failure::dispatch(DispatchKind::Connect, "refused");

        for _ in 0..2 {
            let endpoint = context.route(&mut invocation, &candidates).unwrap();
            invocation.on_failure(Some(&endpoint), &failure);
        }
        let err = context.route(&mut invocation, &candidates).unwrap_err();
        assert!(matches!(err, RouteError::Rejected(_)));
    }

    #[test]
    fn test_routing_mode_resolution() {
        let app = governed_app();
        let config = GovernanceConfig::default().with_routing_mode(RoutingMode::Reroute);
        let context = GovernanceContext::new(app, &config, Arc::new(ManualClock::new(0))).unwrap();

        let plain = call_with(ClusterPolicy::new("order"));
        assert_eq!(context.routing_mode(&plain), RoutingMode::Reroute);

        let pinned = call_with(
            ClusterPolicy::new("order")
                .with_routing(RoutingMetadata::default().with_mode(RoutingMode::Reuse)),
        );
        assert_eq!(context.routing_mode(&pinned), RoutingMode::Reuse);
    }

    #[test]
    fn test_uncounted_failures_return_half_open_trial() {
        let (context, clock) = clocked(governed_app());
        let breaker_policy = single_trial();
        let candidates = vec![Endpoint::new("a", "h", 1)];
        let mut invocation =
            call_with(ClusterPolicy::new("order").with_circuit_breaker(breaker_policy.clone()));
        trip(&context, &breaker_policy, "a");
        clock.advance(1_000);

        // a downstream 429 says nothing about the endpoint's health
        let throttled: Failure = Rejection::new(RejectKind::RateLimited, "429").into();
        for _ in 0..360 {
            let endpoint = context.route(&mut invocation, &candidates).unwrap();
            invocation.on_failure(Some(&endpoint), &throttled);
            clock.advance(10_000);
        }

        let endpoint = context.route(&mut invocation, &candidates).unwrap();
        invocation.on_success(&endpoint, &OutboundResponse::Success(Reply::new("a", Vec::new())));
        let key = breaker_key(invocation.request(), &candidates[0]);
        let breaker = context.breakers().breaker(&key, &breaker_policy, 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_abandoned_attempt_returns_half_open_trial() {
        let (context, clock) = clocked(governed_app());
        let breaker_policy = single_trial();
        let policy = ClusterPolicy::new("order").with_circuit_breaker(breaker_policy.clone());
        let candidates = vec![Endpoint::new("a", "h", 1)];
        trip(&context, &breaker_policy, "a");
        clock.advance(1_000);

        let mut abandoned = call_with(policy.clone());
        assert!(context.route(&mut abandoned, &candidates).is_ok());
        let mut waiting = call_with(policy.clone());
        assert!(context.route(&mut waiting, &candidates).is_err());
        drop(abandoned);

        let mut invocation = call_with(policy);
        assert_eq!(context.route(&mut invocation, &candidates).unwrap().id, "a");
    }

    #[test]
    fn test_rate_limited_call_returns_half_open_trial() {
        let (context, clock) = clocked(governed_app());
        let breaker_policy = single_trial();
        let policy = ClusterPolicy::new("order")
            .with_circuit_breaker(breaker_policy.clone())
            .with_rate_limit(RateLimitPolicy::new(1, 60_000));
        let candidates = vec![Endpoint::new("a", "h", 1)];
        trip(&context, &breaker_policy, "a");
        clock.advance(1_000);

        let mut first = call_with(policy.clone());
        let endpoint = context.route(&mut first, &candidates).unwrap();
        let throttled: Failure = Rejection::new(RejectKind::RateLimited, "429").into();
        first.on_failure(Some(&endpoint), &throttled);

        // the permit for /create is spent, so this call is refused by the limiter
        let err = context.route(&mut first, &candidates).unwrap_err();
        assert!(matches!(
            err,
            RouteError::Rejected(Rejection {
                kind: RejectKind::RateLimited,
                ..
            })
        ));

        // a different limit key still finds the trial available
        let mut other = OutboundInvocation::new(OutboundRequest::new("order", "/list"))
            .with_policy(Arc::new(policy));
        assert_eq!(context.route(&mut other, &candidates).unwrap().id, "a");
    }

    #[test]
    fn test_open_circuits_spend_no_permits() {
        let context = context(governed_app());
        let breaker_policy = single_trial();
        let limit = RateLimitPolicy::new(1, 60_000);
        let policy = ClusterPolicy::new("order")
            .with_circuit_breaker(breaker_policy.clone())
            .with_rate_limit(limit.clone());
        trip(&context, &breaker_policy, "a");
        trip(&context, &breaker_policy, "b");

        let mut invocation = call_with(policy);
        let err = context.route(&mut invocation, &endpoints()).unwrap_err();
        assert!(matches!(
            err,
            RouteError::Rejected(Rejection {
                kind: RejectKind::CircuitOpen,
                ..
            })
        ));
        let key = invocation.request().limit_key();
        assert!(context.limiters().try_acquire(&key, &limit, 0).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweepers_drop_idle_state() {
        let clock = Arc::new(ManualClock::new(0));
        let config = GovernanceConfig {
            circuit_breaker: CircuitBreakerConfig {
                clean_interval: 1_000,
                expire_time: 2_000,
                ..CircuitBreakerConfig::default()
            },
            ..GovernanceConfig::default()
        };
        let context =
            GovernanceContext::new(governed_app(), &config, Arc::clone(&clock) as Arc<dyn Clock>)
                .unwrap();
        trip(&context, &single_trial(), "a");
        let sweepers = context.spawn_sweepers();
        assert_eq!(sweepers.len(), 2);

        clock.advance(5_000);
        tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
        assert!(context.breakers().is_empty());
        for sweeper in sweepers {
            sweeper.abort();
        }
    }
}
