//! Live routing metadata.

use serde::{Deserialize, Serialize};

/// How an invocation that already carries candidates is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoutingMode {
    /// Reuse a non-empty candidate list pinned on the invocation
    #[default]
    Reuse,
    /// Always ask the cluster for fresh candidates
    Reroute,
}

/// Preferred unit, cell and lane for a service's traffic
///
/// Values left unset do not constrain routing. With `fallback` set, a
/// preference that matches no endpoint is dropped instead of emptying the
/// candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingMetadata {
    /// Preferred unit
    pub unit: Option<String>,
    /// Preferred cell
    pub cell: Option<String>,
    /// Preferred lane
    pub lane: Option<String>,
    /// Drop unmatched preferences rather than fail routing
    pub fallback: bool,
    /// Candidate reuse rule, overriding the configured default
    pub mode: Option<RoutingMode>,
}

impl RoutingMetadata {
    /// Prefer a unit
    #[must_use]
    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    /// Prefer a cell
    #[must_use]
    pub fn with_cell(mut self, cell: &str) -> Self {
        self.cell = Some(cell.to_string());
        self
    }

    /// Prefer a lane
    #[must_use]
    pub fn with_lane(mut self, lane: &str) -> Self {
        self.lane = Some(lane.to_string());
        self
    }

    /// Fail routing when a preference matches nothing
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.fallback = false;
        self
    }

    /// Override the candidate reuse rule
    #[must_use]
    pub fn with_mode(mut self, mode: RoutingMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Whether any preference is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unit.is_none() && self.cell.is_none() && self.lane.is_none()
    }
}

impl Default for RoutingMetadata {
    fn default() -> Self {
        Self {
            unit: None,
            cell: None,
            lane: None,
            fallback: true,
            mode: None,
        }
    }
}
