//! Classified failures.
//!
//! Every governed call ends in either a reply or a [`Failure`]. Failures are
//! plain values: they travel inside responses rather than through a
//! separate error channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a call was rejected before dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectKind {
    /// Admission denied by a rate limiter
    RateLimited,
    /// Circuit breaker is open for the target
    CircuitOpen,
    /// Caller is not authorized to reach the target
    Unauthorized,
    /// Any other governance rejection
    Other,
}

impl fmt::Display for RejectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::CircuitOpen => write!(f, "circuit open"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Other => write!(f, "rejected"),
        }
    }
}

/// Transport-level failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchKind {
    /// Connection could not be established
    Connect,
    /// Call exceeded its deadline
    Timeout,
    /// Any other transport error
    Transport,
}

impl fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport"),
        }
    }
}

/// Failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// Application is not accepting outbound traffic yet
    Unready,
    /// Routing produced no candidate endpoint
    NoProvider,
    /// Admission denied before dispatch
    Rejected(RejectKind),
    /// Transport or remote error during dispatch
    Dispatch(DispatchKind),
    /// Remote call completed but the reply encodes an error
    Application,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unready => write!(f, "unready"),
            Self::NoProvider => write!(f, "no provider"),
            Self::Rejected(kind) => write!(f, "rejected ({})", kind),
            Self::Dispatch(kind) => write!(f, "dispatch ({})", kind),
            Self::Application => write!(f, "application"),
        }
    }
}

/// A classified failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    /// Failure class
    pub kind: FailureKind,
    /// Human readable description
    pub message: String,
    /// Transport or application specific code (e.g. an HTTP status)
    pub code: Option<String>,
}

impl Failure {
    /// Create a failure of the given kind
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    /// Application is not ready for outbound traffic
    #[must_use]
    pub fn unready(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unready, message)
    }

    /// No endpoint available for the service
    #[must_use]
    pub fn no_provider(service: &str) -> Self {
        Self::new(
            FailureKind::NoProvider,
            format!("no provider available for {}", service),
        )
    }

    /// Dispatch failure
    #[must_use]
    pub fn dispatch(kind: DispatchKind, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Dispatch(kind), message)
    }

    /// Application level failure carried by a completed reply
    #[must_use]
    pub fn application(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Application, message).with_code(code)
    }

    /// Attach a code
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Whether the call was rejected before dispatch
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self.kind, FailureKind::Rejected(_))
    }

    /// Whether the failure happened during dispatch
    #[must_use]
    pub fn is_dispatch(&self) -> bool {
        matches!(self.kind, FailureKind::Dispatch(_))
    }
}

impl From<Rejection> for Failure {
    fn from(rejection: Rejection) -> Self {
        Self::new(FailureKind::Rejected(rejection.kind), rejection.message)
    }
}

/// Rejection raised while selecting an endpoint, before dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Rejection {
    /// Rejection class
    pub kind: RejectKind,
    /// Description
    pub message: String,
}

impl Rejection {
    /// Create a rejection
    #[must_use]
    pub fn new(kind: RejectKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
