//! Remote endpoints.

use laneway_core::labels;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Health of an endpoint as reported by discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndpointState {
    /// Serving normally
    #[default]
    Healthy,
    /// Serving while warming up
    Warmup,
    /// Temporarily taken out of rotation
    Suspended,
    /// Shutting down
    Closing,
}

impl EndpointState {
    /// Whether calls may be sent to an endpoint in this state
    #[must_use]
    pub const fn accessible(&self) -> bool {
        matches!(self, Self::Healthy | Self::Warmup)
    }
}

/// One addressable instance of a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Stable identifier
    pub id: String,
    /// Host name or address
    pub host: String,
    /// Port
    pub port: u16,
    /// Relative load-balancing weight
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Health state
    #[serde(default)]
    pub state: EndpointState,
    /// Metadata labels (zone, unit, cell, lane, version, ...)
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_weight() -> u32 {
    100
}

impl Endpoint {
    /// Healthy endpoint with default weight
    #[must_use]
    pub fn new(id: &str, host: &str, port: u16) -> Self {
        Self {
            id: id.to_string(),
            host: host.to_string(),
            port,
            weight: default_weight(),
            state: EndpointState::Healthy,
            labels: BTreeMap::new(),
        }
    }

    /// Set the weight
    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Set the health state
    #[must_use]
    pub fn with_state(mut self, state: EndpointState) -> Self {
        self.state = state;
        self
    }

    /// Add a label
    #[must_use]
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Label value
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// `host:port`
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether calls may be sent here
    #[must_use]
    pub fn is_accessible(&self) -> bool {
        self.state.accessible()
    }

    /// Zone label
    #[must_use]
    pub fn zone(&self) -> Option<&str> {
        self.label(labels::LABEL_ZONE)
    }

    /// Unit label
    #[must_use]
    pub fn unit(&self) -> Option<&str> {
        self.label(labels::LABEL_UNIT)
    }

    /// Cell label
    #[must_use]
    pub fn cell(&self) -> Option<&str> {
        self.label(labels::LABEL_CELL)
    }

    /// Lane label
    #[must_use]
    pub fn lane(&self) -> Option<&str> {
        self.label(labels::LABEL_LANE)
    }

    /// Version label
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.label(labels::LABEL_VERSION)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}
