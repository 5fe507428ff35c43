//! Cluster abstraction.
//!
//! A cluster is the transport-facing half of an invocation: it resolves
//! candidate endpoints, dispatches a request to one of them, and turns
//! failures into responses its callers understand. The invokers drive it;
//! transports implement it.

use async_trait::async_trait;
use laneway_core::{AppStatusView, Failure, Rejection};

use crate::endpoint::Endpoint;
use crate::request::OutboundRequest;
use crate::response::OutboundResponse;

/// A set of remote endpoints for one logical service
///
/// Only [`route`](Self::route) and [`invoke`](Self::invoke) are required;
/// hooks default to no-ops and the factory methods to the plain failure
/// taxonomy.
#[async_trait]
pub trait LiveCluster: Send + Sync {
    /// First hook of every invocation
    fn on_start(&self, _request: &OutboundRequest) {}

    /// Resolve candidate endpoints
    async fn route(&self, request: &OutboundRequest) -> Result<Vec<Endpoint>, Failure>;

    /// Dispatch to one endpoint
    ///
    /// `Err` is a transport failure; `Ok` may still carry an application
    /// failure inside the response.
    async fn invoke(
        &self,
        request: &OutboundRequest,
        endpoint: &Endpoint,
    ) -> Result<OutboundResponse, Failure>;

    /// Dispatch is about to start
    fn on_start_request(&self, _request: &OutboundRequest, _endpoint: &Endpoint) {}

    /// Attempt succeeded
    fn on_success(
        &self,
        _response: &OutboundResponse,
        _request: &OutboundRequest,
        _endpoint: &Endpoint,
    ) {
    }

    /// Attempt failed; receives the failure carried by the response from
    /// [`create_response`](Self::create_response)
    fn on_error(
        &self,
        _failure: &Failure,
        _request: &OutboundRequest,
        _endpoint: Option<&Endpoint>,
    ) {
    }

    /// Materialize a response carrying `failure`
    fn create_response(
        &self,
        failure: Failure,
        _request: &OutboundRequest,
        _endpoint: Option<&Endpoint>,
    ) -> OutboundResponse {
        OutboundResponse::Failure(failure)
    }

    /// Translate a pre-dispatch rejection
    fn create_reject_failure(&self, rejection: Rejection, _request: &OutboundRequest) -> Failure {
        rejection.into()
    }

    /// Failure for a call refused by the readiness gate
    ///
    /// Returning `None` lets the call through regardless of status.
    fn create_unready_failure(
        &self,
        status: AppStatusView,
        _request: &OutboundRequest,
    ) -> Option<Failure> {
        Some(Failure::unready(status.message()))
    }

    /// Failure for a call with no candidate endpoint
    fn create_no_provider_failure(&self, request: &OutboundRequest) -> Failure {
        Failure::no_provider(&request.service)
    }
}
