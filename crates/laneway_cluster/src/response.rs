//! Normalized outbound response.

use laneway_core::Failure;
use serde::{Deserialize, Serialize};

/// Successful reply from an endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Endpoint that produced the reply
    pub endpoint: String,
    /// Opaque body
    pub payload: Vec<u8>,
    /// Transport status code, when the transport has one
    pub code: Option<String>,
}

impl Reply {
    /// Reply from an endpoint
    #[must_use]
    pub fn new(endpoint: &str, payload: Vec<u8>) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            payload,
            code: None,
        }
    }

    /// Attach a status code
    #[must_use]
    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }
}

/// Result of a governed call: a reply or a classified failure, never both
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutboundResponse {
    /// The call succeeded
    Success(Reply),
    /// The call failed
    Failure(Failure),
}

impl OutboundResponse {
    /// Whether the call succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Carried failure, if any
    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            Self::Success(_) => None,
        }
    }

    /// Carried reply, if any
    #[must_use]
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            Self::Success(reply) => Some(reply),
            Self::Failure(_) => None,
        }
    }

    /// Convert into a `Result`
    ///
    /// # Errors
    ///
    /// Returns the carried failure
    pub fn into_result(self) -> Result<Reply, Failure> {
        match self {
            Self::Success(reply) => Ok(reply),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl From<Failure> for OutboundResponse {
    fn from(failure: Failure) -> Self {
        Self::Failure(failure)
    }
}

impl From<Reply> for OutboundResponse {
    fn from(reply: Reply) -> Self {
        Self::Success(reply)
    }
}
