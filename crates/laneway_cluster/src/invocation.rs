//! One logical outbound call.
//!
//! The invocation outlives individual attempts: it keeps the routed
//! candidate list so retries do not route again, remembers which endpoints
//! already failed, and fans lifecycle hooks out to listeners.

use laneway_core::Failure;
use laneway_policy::ClusterPolicy;
use std::sync::Arc;

use crate::endpoint::Endpoint;
use crate::request::OutboundRequest;
use crate::response::OutboundResponse;

/// Observer of invocation lifecycle hooks
///
/// All methods default to no-ops.
pub trait InvocationListener: Send + Sync {
    /// About to dispatch to `endpoint`
    fn on_forward(&self, _request: &OutboundRequest, _endpoint: &Endpoint) {}

    /// Attempt completed successfully
    fn on_success(
        &self,
        _request: &OutboundRequest,
        _endpoint: &Endpoint,
        _response: &OutboundResponse,
    ) {
    }

    /// Attempt failed, before or during dispatch
    fn on_failure(
        &self,
        _request: &OutboundRequest,
        _endpoint: Option<&Endpoint>,
        _failure: &Failure,
    ) {
    }
}

/// One logical call across all of its attempts
pub struct OutboundInvocation {
    request: OutboundRequest,
    instances: Vec<Endpoint>,
    policy: Option<Arc<ClusterPolicy>>,
    listeners: Vec<Arc<dyn InvocationListener>>,
    attempt_listeners: Vec<Arc<dyn InvocationListener>>,
    failed: Vec<String>,
    attempts: u32,
}

impl OutboundInvocation {
    /// Invocation for a request
    #[must_use]
    pub fn new(request: OutboundRequest) -> Self {
        Self {
            request,
            instances: Vec::new(),
            policy: None,
            listeners: Vec::new(),
            attempt_listeners: Vec::new(),
            failed: Vec::new(),
            attempts: 0,
        }
    }

    /// Pin the candidate list up front
    #[must_use]
    pub fn with_instances(mut self, instances: Vec<Endpoint>) -> Self {
        self.instances = instances;
        self
    }

    /// Attach a policy
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<ClusterPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Add a listener kept for the whole invocation
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn InvocationListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// The request
    #[must_use]
    pub fn request(&self) -> &OutboundRequest {
        &self.request
    }

    /// Candidate endpoints, empty until routed or pinned
    #[must_use]
    pub fn instances(&self) -> &[Endpoint] {
        &self.instances
    }

    /// Record routed candidates
    ///
    /// A non-empty list is only ever set once; later calls are ignored and
    /// return `false`.
    pub fn set_instances(&mut self, instances: Vec<Endpoint>) -> bool {
        if !self.instances.is_empty() {
            return false;
        }
        self.instances = instances;
        true
    }

    /// Attached policy
    #[must_use]
    pub fn policy(&self) -> Option<&Arc<ClusterPolicy>> {
        self.policy.as_ref()
    }

    /// Attach a policy when none is attached yet
    pub fn set_default_policy(&mut self, policy: Option<Arc<ClusterPolicy>>) {
        if self.policy.is_none() {
            self.policy = policy;
        }
    }

    /// Add a listener that only sees the outcome of the current attempt
    pub fn add_attempt_listener(&mut self, listener: Arc<dyn InvocationListener>) {
        self.attempt_listeners.push(listener);
    }

    /// Attempts started so far
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Endpoints that failed in earlier attempts
    #[must_use]
    pub fn failed_endpoints(&self) -> &[String] {
        &self.failed
    }

    /// Candidates minus endpoints that already failed, or all candidates
    /// when every one of them has failed
    #[must_use]
    pub fn untried<'a>(&self, candidates: &'a [Endpoint]) -> Vec<&'a Endpoint> {
        let fresh: Vec<&Endpoint> = candidates
            .iter()
            .filter(|e| !self.failed.contains(&e.id))
            .collect();
        if fresh.is_empty() {
            candidates.iter().collect()
        } else {
            fresh
        }
    }

    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempt_listeners.clear();
        self.attempts
    }

    /// Hook: about to dispatch
    pub fn on_forward(&self, endpoint: &Endpoint) {
        for listener in self.listeners.iter().chain(&self.attempt_listeners) {
            listener.on_forward(&self.request, endpoint);
        }
    }

    /// Hook: attempt succeeded
    pub fn on_success(&mut self, endpoint: &Endpoint, response: &OutboundResponse) {
        for listener in self.listeners.iter().chain(&self.attempt_listeners) {
            listener.on_success(&self.request, endpoint, response);
        }
        self.attempt_listeners.clear();
    }

    /// Hook: attempt failed
    pub fn on_failure(&mut self, endpoint: Option<&Endpoint>, failure: &Failure) {
        if let Some(endpoint) = endpoint {
            if !self.failed.contains(&endpoint.id) {
                self.failed.push(endpoint.id.clone());
            }
        }
        for listener in self.listeners.iter().chain(&self.attempt_listeners) {
            listener.on_failure(&self.request, endpoint, failure);
        }
        self.attempt_listeners.clear();
    }
}
