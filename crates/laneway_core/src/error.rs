//! Core error types for laneway.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by core types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Input could not be decoded
    InvalidEncoding {
        /// Decoder message
        message: String,
    },

    /// Identifier did not parse
    InvalidId {
        /// What was wrong with it
        reason: String,
    },

    /// Lifecycle status cannot move from `from` to `to`
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEncoding { message } => write!(f, "invalid encoding: {}", message),
            Self::InvalidId { reason } => write!(f, "invalid id: {}", reason),
            Self::InvalidTransition { from, to } => {
                write!(f, "status cannot move from {} to {}", from, to)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEncoding {
            message: err.to_string(),
        }
    }
}
