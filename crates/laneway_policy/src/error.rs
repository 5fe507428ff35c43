//! Policy errors.

/// Policy errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// A policy field holds an unusable value
    #[error("Invalid policy for {service}: {reason}")]
    Invalid {
        /// Service the policy belongs to
        service: String,
        /// What is wrong
        reason: String,
    },

    /// Snapshot version does not move forward
    #[error("Stale policy snapshot: offered version {offered}, current {current}")]
    StaleVersion {
        /// Version currently published
        current: u64,
        /// Version offered
        offered: u64,
    },

    /// Policy document could not be parsed
    #[error("Policy parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
