//! Application readiness gate.
//!
//! Two orthogonal axes are tracked: the lifecycle [`AppStatus`] of the host
//! process and the [`PolicyState`] of governance. Both are packed into a
//! single atomic byte so every reader observes a consistent pair.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{CoreError, CoreResult};

const STATUS_MASK: u8 = 0b0011;
const POLICY_READY_BIT: u8 = 0b0100;

/// Lifecycle status of the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    /// Process is booting
    Starting,
    /// Host framework finished starting
    Started,
    /// Fully ready for traffic
    Ready,
    /// Shutting down, terminal
    Stopped,
}

impl AppStatus {
    const fn bits(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Started => 1,
            Self::Ready => 2,
            Self::Stopped => 3,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        match bits & STATUS_MASK {
            0 => Self::Starting,
            1 => Self::Started,
            2 => Self::Ready,
            _ => Self::Stopped,
        }
    }

    /// Whether outbound calls are permitted
    #[must_use]
    pub const fn outbound(&self) -> bool {
        matches!(self, Self::Started | Self::Ready)
    }

    /// Whether inbound calls are accepted
    #[must_use]
    pub const fn inbound(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Message used when a call is refused because of this status
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Starting => "application is starting",
            Self::Started => "application is started",
            Self::Ready => "application is ready",
            Self::Stopped => "application is stopped",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "STARTING"),
            Self::Started => write!(f, "STARTED"),
            Self::Ready => write!(f, "READY"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Governance policy readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyState {
    /// No policy has been loaded
    Initial,
    /// Policies are loaded and enforced
    PolicyReady,
}

/// How the engine was installed into the host process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InjectionMode {
    /// Installed at process start; waits for the host to start
    Static,
    /// Attached to a running process; ready at once, ungoverned until policies arrive
    Dynamic,
}

/// Consistent snapshot of both readiness axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppStatusView {
    /// Lifecycle status
    pub status: AppStatus,
    /// Policy readiness
    pub policy: PolicyState,
}

impl AppStatusView {
    /// Whether outbound traffic is permitted
    #[must_use]
    pub const fn outbound(&self) -> bool {
        self.status.outbound()
    }

    /// Whether governance policies are enforced
    #[must_use]
    pub const fn governed(&self) -> bool {
        matches!(self.policy, PolicyState::PolicyReady)
    }

    /// Refusal message
    #[must_use]
    pub const fn message(&self) -> &'static str {
        self.status.message()
    }

    fn pack(self) -> u8 {
        let policy = if self.governed() { POLICY_READY_BIT } else { 0 };
        self.status.bits() | policy
    }

    fn unpack(bits: u8) -> Self {
        Self {
            status: AppStatus::from_bits(bits),
            policy: if bits & POLICY_READY_BIT != 0 {
                PolicyState::PolicyReady
            } else {
                PolicyState::Initial
            },
        }
    }
}

/// Process-wide readiness gate
///
/// Reads are a single atomic load; every transition is a single atomic
/// publication, so concurrent readers never see a torn pair.
#[derive(Debug)]
pub struct AppState {
    bits: AtomicU8,
    mode: InjectionMode,
}

impl AppState {
    /// Create the gate for an injection mode
    #[must_use]
    pub fn new(mode: InjectionMode) -> Self {
        let initial = match mode {
            InjectionMode::Static => AppStatusView {
                status: AppStatus::Starting,
                policy: PolicyState::Initial,
            },
            InjectionMode::Dynamic => AppStatusView {
                status: AppStatus::Ready,
                policy: PolicyState::Initial,
            },
        };
        Self {
            bits: AtomicU8::new(initial.pack()),
            mode,
        }
    }

    /// Gate for a statically installed engine
    #[must_use]
    pub fn r#static() -> Self {
        Self::new(InjectionMode::Static)
    }

    /// Gate for a dynamically attached engine
    #[must_use]
    pub fn dynamic() -> Self {
        Self::new(InjectionMode::Dynamic)
    }

    /// Injection mode
    #[must_use]
    pub const fn mode(&self) -> InjectionMode {
        self.mode
    }

    /// Current snapshot
    #[must_use]
    pub fn view(&self) -> AppStatusView {
        AppStatusView::unpack(self.bits.load(Ordering::Acquire))
    }

    /// Current lifecycle status
    #[must_use]
    pub fn status(&self) -> AppStatus {
        self.view().status
    }

    /// Move the lifecycle status forward
    ///
    /// Status never moves backwards and `Stopped` is terminal. Re-entering the
    /// current status is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the transition would move backwards
    pub fn transition(&self, to: AppStatus) -> CoreResult<AppStatusView> {
        let result = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let current = AppStatusView::unpack(bits);
                if to < current.status {
                    return None;
                }
                Some(
                    AppStatusView {
                        status: to,
                        policy: current.policy,
                    }
                    .pack(),
                )
            });
        match result {
            Ok(previous) => Ok(AppStatusView {
                status: to,
                policy: AppStatusView::unpack(previous).policy,
            }),
            Err(bits) => Err(CoreError::InvalidTransition {
                from: AppStatus::from_bits(bits).to_string(),
                to: to.to_string(),
            }),
        }
    }

    /// Host framework started
    ///
    /// # Errors
    ///
    /// Returns error if the application already moved past `Started`
    pub fn on_started(&self) -> CoreResult<AppStatusView> {
        self.transition(AppStatus::Started)
    }

    /// Application ready for traffic
    ///
    /// # Errors
    ///
    /// Returns error if the application is stopped
    pub fn on_ready(&self) -> CoreResult<AppStatusView> {
        self.transition(AppStatus::Ready)
    }

    /// Application stopping
    ///
    /// # Errors
    ///
    /// Never fails; `Stopped` is reachable from every status
    pub fn on_stopped(&self) -> CoreResult<AppStatusView> {
        self.transition(AppStatus::Stopped)
    }

    /// Governance policies have been loaded
    pub fn on_policy_ready(&self) -> AppStatusView {
        let previous = self.bits.fetch_or(POLICY_READY_BIT, Ordering::AcqRel);
        AppStatusView::unpack(previous | POLICY_READY_BIT)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::r#static()
    }
}
