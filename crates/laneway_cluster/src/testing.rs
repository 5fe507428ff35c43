//! Test doubles: a cluster and a context that record every hook.

use async_trait::async_trait;
use laneway_core::{AppStatus, AppStatusView, Failure, PolicyState, Rejection};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::cluster::LiveCluster;
use crate::context::{InvocationContext, RouteError};
use crate::endpoint::Endpoint;
use crate::invocation::{InvocationListener, OutboundInvocation};
use crate::request::OutboundRequest;
use crate::response::{OutboundResponse, Reply};

type Events = Arc<Mutex<Vec<String>>>;

/// `count` healthy endpoints named `e0`, `e1`, ...
pub(crate) fn endpoints(count: u16) -> Vec<Endpoint> {
    (0..count)
        .map(|i| Endpoint::new(&format!("e{}", i), "10.0.0.1", 8000 + i))
        .collect()
}

/// Cluster answering from a script and recording hooks in call order
pub(crate) struct RecordingCluster {
    endpoints: Vec<Endpoint>,
    events: Events,
    script: Mutex<VecDeque<Result<OutboundResponse, Failure>>>,
    route_failure: Option<Failure>,
    decline_unready: bool,
    invokes: AtomicUsize,
}

impl RecordingCluster {
    pub(crate) fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            events: Arc::default(),
            script: Mutex::default(),
            route_failure: None,
            decline_unready: false,
            invokes: AtomicUsize::new(0),
        }
    }

    /// Outcomes for the first dispatches; later dispatches succeed
    pub(crate) fn with_script(self, outcomes: Vec<Result<OutboundResponse, Failure>>) -> Self {
        *self.script.lock().unwrap() = outcomes.into();
        self
    }

    pub(crate) fn with_route_failure(mut self, failure: Failure) -> Self {
        self.route_failure = Some(failure);
        self
    }

    pub(crate) fn declining_unready(mut self) -> Self {
        self.decline_unready = true;
        self
    }

    pub(crate) fn request(&self) -> OutboundRequest {
        OutboundRequest::new("order", "/orders")
    }

    /// Invocation with a listener feeding the same event log
    pub(crate) fn invocation(&self) -> OutboundInvocation {
        self.invocation_for(self.request())
    }

    pub(crate) fn invocation_for(&self, request: OutboundRequest) -> OutboundInvocation {
        OutboundInvocation::new(request).with_listener(Arc::new(RecordingListener {
            events: Arc::clone(&self.events),
        }))
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn invokes(&self) -> usize {
        self.invokes.load(Ordering::SeqCst)
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl LiveCluster for RecordingCluster {
    fn on_start(&self, _request: &OutboundRequest) {
        self.record("cluster.onStart".to_string());
    }

    async fn route(&self, _request: &OutboundRequest) -> Result<Vec<Endpoint>, Failure> {
        self.record("cluster.route".to_string());
        match &self.route_failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(self.endpoints.clone()),
        }
    }

    async fn invoke(
        &self,
        _request: &OutboundRequest,
        endpoint: &Endpoint,
    ) -> Result<OutboundResponse, Failure> {
        self.record(format!("cluster.invoke:{}", endpoint.id));
        self.invokes.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(OutboundResponse::Success(Reply::new(&endpoint.id, b"ok".to_vec())))
        })
    }

    fn on_start_request(&self, _request: &OutboundRequest, endpoint: &Endpoint) {
        self.record(format!("cluster.onStartRequest:{}", endpoint.id));
    }

    fn on_success(&self, _: &OutboundResponse, _: &OutboundRequest, endpoint: &Endpoint) {
        self.record(format!("cluster.onSuccess:{}", endpoint.id));
    }

    fn on_error(&self, failure: &Failure, _: &OutboundRequest, _: Option<&Endpoint>) {
        self.record(format!("cluster.onError:{}", failure.kind));
    }

    fn create_response(
        &self,
        failure: Failure,
        _request: &OutboundRequest,
        _endpoint: Option<&Endpoint>,
    ) -> OutboundResponse {
        self.record("cluster.createResponse".to_string());
        OutboundResponse::Failure(failure)
    }

    fn create_reject_failure(&self, rejection: Rejection, _request: &OutboundRequest) -> Failure {
        self.record("cluster.createRejectFailure".to_string());
        rejection.into()
    }

    fn create_unready_failure(
        &self,
        status: AppStatusView,
        _request: &OutboundRequest,
    ) -> Option<Failure> {
        (!self.decline_unready).then(|| Failure::unready(status.message()))
    }
}

struct RecordingListener {
    events: Events,
}

impl InvocationListener for RecordingListener {
    fn on_forward(&self, _: &OutboundRequest, endpoint: &Endpoint) {
        let event = format!("invocation.onForward:{}", endpoint.id);
        self.events.lock().unwrap().push(event);
    }

    fn on_success(&self, _: &OutboundRequest, endpoint: &Endpoint, _: &OutboundResponse) {
        let event = format!("invocation.onSuccess:{}", endpoint.id);
        self.events.lock().unwrap().push(event);
    }

    fn on_failure(&self, _: &OutboundRequest, endpoint: Option<&Endpoint>, _: &Failure) {
        let id = endpoint.map_or("-", |e| e.id.as_str());
        self.events.lock().unwrap().push(format!("invocation.onFailure:{}", id));
    }
}

/// Context with a fixed status that picks the first candidate
pub(crate) struct ScriptedContext {
    status: AppStatusView,
    rejection: Option<Rejection>,
}

impl ScriptedContext {
    fn with_status(status: AppStatus, policy: PolicyState) -> Self {
        Self {
            status: AppStatusView { status, policy },
            rejection: None,
        }
    }

    pub(crate) fn ready() -> Self {
        Self::with_status(AppStatus::Ready, PolicyState::PolicyReady)
    }

    pub(crate) fn starting() -> Self {
        Self::with_status(AppStatus::Starting, PolicyState::Initial)
    }

    pub(crate) fn started_ungoverned() -> Self {
        Self::with_status(AppStatus::Started, PolicyState::Initial)
    }

    pub(crate) fn rejecting(mut self, rejection: Rejection) -> Self {
        self.rejection = Some(rejection);
        self
    }
}

impl InvocationContext for ScriptedContext {
    fn app_status(&self) -> AppStatusView {
        self.status
    }

    fn route(
        &self,
        invocation: &mut OutboundInvocation,
        candidates: &[Endpoint],
    ) -> Result<Endpoint, RouteError> {
        if let Some(rejection) = &self.rejection {
            return Err(RouteError::Rejected(rejection.clone()));
        }
        candidates
            .first()
            .cloned()
            .ok_or_else(|| RouteError::NoProvider {
                service: invocation.request().service.clone(),
            })
    }
}
