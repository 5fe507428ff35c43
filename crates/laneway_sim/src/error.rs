//! Simulation errors.

/// Errors building a simulated cluster
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// Endpoint behavior cannot be simulated
    #[error("Invalid behavior for endpoint {endpoint}: {reason}")]
    InvalidBehavior {
        /// Endpoint id
        endpoint: String,
        /// What is wrong
        reason: String,
    },

    /// Endpoint id registered twice
    #[error("Duplicate endpoint: {0}")]
    DuplicateEndpoint(String),
}
