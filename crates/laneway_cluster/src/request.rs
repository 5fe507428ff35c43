//! Normalized outbound request.

use laneway_core::RequestId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transport-neutral call envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRequest {
    /// Request identifier
    pub id: RequestId,
    /// Target service
    pub service: String,
    /// Method or path within the service
    pub path: String,
    /// Attributes used for routing and admission (headers, tags)
    pub attributes: BTreeMap<String, String>,
    /// Opaque body
    pub payload: Vec<u8>,
    /// Whether repeating the call is safe
    pub idempotent: bool,
}

impl OutboundRequest {
    /// Idempotent request with an empty body
    #[must_use]
    pub fn new(service: &str, path: &str) -> Self {
        Self {
            id: RequestId::new(),
            service: service.to_string(),
            path: path.to_string(),
            attributes: BTreeMap::new(),
            payload: Vec::new(),
            idempotent: true,
        }
    }

    /// Set the body
    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Mark the request unsafe to repeat
    #[must_use]
    pub fn non_idempotent(mut self) -> Self {
        self.idempotent = false;
        self
    }

    /// Attribute value
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Key under which admission state is kept
    #[must_use]
    pub fn limit_key(&self) -> String {
        format!("{}:{}", self.service, self.path)
    }
}
